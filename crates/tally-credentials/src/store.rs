use crate::error::Result;
use crate::types::TokenRecord;

/// Persistence for [`TokenRecord`]s, keyed by company id.
///
/// Writes replace the whole record; readers never observe a partially
/// updated row. Implementations: [`crate::db::SqliteTokenStore`] and
/// [`crate::memory::MemoryTokenStore`].
pub trait TokenStore: Send + Sync {
    fn get(&self, company_id: &str) -> Result<Option<TokenRecord>>;

    /// Insert or overwrite the record for `record.company_id`.
    fn put(&self, record: &TokenRecord) -> Result<()>;

    /// Remove a record. Returns `false` if nothing was stored for the company.
    fn delete(&self, company_id: &str) -> Result<bool>;

    /// All records ordered by company id.
    fn list(&self) -> Result<Vec<TokenRecord>>;
}
