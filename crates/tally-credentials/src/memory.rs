use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CredentialError, Result};
use crate::store::TokenStore;
use crate::types::TokenRecord;

/// In-process [`TokenStore`]; state is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: Mutex<BTreeMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, TokenRecord>>> {
        self.records
            .lock()
            .map_err(|_| CredentialError::Store("token map lock poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, company_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.records()?.get(company_id).cloned())
    }

    fn put(&self, record: &TokenRecord) -> Result<()> {
        self.records()?
            .insert(record.company_id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, company_id: &str) -> Result<bool> {
        Ok(self.records()?.remove(company_id).is_some())
    }

    fn list(&self) -> Result<Vec<TokenRecord>> {
        Ok(self.records()?.values().cloned().collect())
    }
}
