use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{CredentialError, Result};
use crate::store::TokenStore;
use crate::types::TokenRecord;

/// Initialise the credential schema in `conn`.
///
/// Creates the `tokens` table (idempotent). One row per connected company.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tokens (
            company_id            TEXT NOT NULL PRIMARY KEY,
            access_token          TEXT NOT NULL,
            refresh_token         TEXT NOT NULL,
            token_type            TEXT NOT NULL DEFAULT 'bearer',
            access_token_expiry   TEXT NOT NULL,   -- RFC 3339, UTC
            refresh_token_expiry  TEXT NOT NULL,   -- RFC 3339, UTC
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        ) STRICT;
        ",
    )
}

const TOKEN_SELECT_SQL: &str = "SELECT company_id, access_token, refresh_token, token_type,
        access_token_expiry, refresh_token_expiry, created_at, updated_at
 FROM tokens";

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Map a SELECT row (column order from TOKEN_SELECT_SQL) to a TokenRecord.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRecord> {
    Ok(TokenRecord {
        company_id: row.get(0)?,
        access_token: row.get(1)?,
        refresh_token: row.get(2)?,
        token_type: row.get(3)?,
        access_token_expiry: parse_ts(4, row.get(4)?)?,
        refresh_token_expiry: parse_ts(5, row.get(5)?)?,
        created_at: parse_ts(6, row.get(6)?)?,
        updated_at: parse_ts(7, row.get(7)?)?,
    })
}

/// SQLite-backed [`TokenStore`].
///
/// Owns its own `Connection`; the gateway opens one per store so the setup
/// server and the batch runner never share a handle.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CredentialError::Store("token connection lock poisoned".into()))
    }
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, company_id: &str) -> Result<Option<TokenRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("{TOKEN_SELECT_SQL} WHERE company_id = ?1"),
                [company_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn put(&self, record: &TokenRecord) -> Result<()> {
        let conn = self.conn()?;
        // Single statement, so the row is replaced atomically.
        conn.execute(
            "INSERT INTO tokens
             (company_id, access_token, refresh_token, token_type,
              access_token_expiry, refresh_token_expiry, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(company_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                access_token_expiry = excluded.access_token_expiry,
                refresh_token_expiry = excluded.refresh_token_expiry,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                record.company_id,
                record.access_token,
                record.refresh_token,
                record.token_type,
                record.access_token_expiry.to_rfc3339(),
                record.refresh_token_expiry.to_rfc3339(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        debug!(company_id = %record.company_id, "token record written");
        Ok(())
    }

    fn delete(&self, company_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM tokens WHERE company_id = ?1", [company_id])?;
        Ok(n > 0)
    }

    fn list(&self) -> Result<Vec<TokenRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{TOKEN_SELECT_SQL} ORDER BY company_id"))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenGrant;
    use chrono::TimeZone;

    fn record(company_id: &str, access: &str) -> TokenRecord {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let grant = TokenGrant {
            access_token: access.into(),
            refresh_token: Some("rt".into()),
            token_type: Some("bearer".into()),
            expires_in: 3600,
            refresh_expires_in: Some(8_726_400),
        };
        TokenRecord::from_grant(company_id, &grant, now).unwrap()
    }

    fn store() -> SqliteTokenStore {
        SqliteTokenStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store();
        let rec = record("123", "at-1");
        store.put(&rec).unwrap();
        assert_eq!(store.get("123").unwrap(), Some(rec));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn put_overwrites_whole_record() {
        let store = store();
        store.put(&record("123", "at-1")).unwrap();
        let newer = record("123", "at-2");
        store.put(&newer).unwrap();
        assert_eq!(store.get("123").unwrap(), Some(newer));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_whether_a_row_existed() {
        let store = store();
        store.put(&record("123", "at-1")).unwrap();
        assert!(store.delete("123").unwrap());
        assert!(!store.delete("123").unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn list_is_ordered_by_company() {
        let store = store();
        store.put(&record("b", "x")).unwrap();
        store.put(&record("a", "y")).unwrap();
        let ids: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.company_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
