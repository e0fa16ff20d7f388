// ==============================================================================
// store.rs - Document Store Contract and SQLite Backend
// ==============================================================================
// Description: Upsert/find/index contract consumed by the loader, on SQLite
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2025-11-21
// Version: 1.1.0
// ==============================================================================
// Contract:
//   - upsert is atomic per document and idempotent per (collection, id)
//   - no ordering or visibility guarantee across documents
//   - queries are field equality over the stored JSON body
// SQLite layout:
//   documents(collection TEXT, id TEXT, body TEXT, PRIMARY KEY(collection, id))
//   indexes are expression indexes over json_extract(body, '$.field')
// ==============================================================================

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl StoreError {
    /// Lock contention that a retry can resolve
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

/// Field equality conditions, all of which must hold
pub type Query<'q> = [(&'q str, Value)];

/// Storage contract for loaded entities
pub trait Store {
    /// Insert or replace one document
    fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<(), StoreError>;

    /// Insert or replace several documents of one collection
    fn upsert_many(&mut self, collection: &str, documents: &[(String, Value)]) -> Result<(), StoreError> {
        for (id, document) in documents {
            self.upsert(collection, id, document)?;
        }
        Ok(())
    }

    fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError>;

    /// All matching documents, in id order
    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Create an index over the given fields if it does not exist yet
    fn create_index(&mut self, collection: &str, fields: &[&str]) -> Result<(), StoreError>;

    fn count(&self, collection: &str, query: &Query) -> Result<usize, StoreError>;

    fn delete_many(&mut self, collection: &str, query: &Query) -> Result<usize, StoreError>;
}

/// Store backed by a single SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;  -- readers never see a half-written document
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl Store for SqliteStore {
    fn upsert(&mut self, collection: &str, id: &str, document: &Value) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, serde_json::to_string(document)?],
        )?;
        Ok(())
    }

    fn upsert_many(&mut self, collection: &str, documents: &[(String, Value)]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            )?;
            for (id, document) in documents {
                stmt.execute(params![collection, id, serde_json::to_string(document)?])?;
            }
        }
        tx.commit()?;
        debug!("Upserted {} documents into {}", documents.len(), collection);
        Ok(())
    }

    fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Value>, StoreError> {
        let (condition, values) = where_clause(collection, query)?;
        let sql = format!("SELECT body FROM documents WHERE {} LIMIT 1", condition);

        let body: Option<String> = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .optional()?;

        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let (condition, values) = where_clause(collection, query)?;
        let sql = format!("SELECT body FROM documents WHERE {} ORDER BY id", condition);

        let mut stmt = self.conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    fn create_index(&mut self, collection: &str, fields: &[&str]) -> Result<(), StoreError> {
        check_name(collection)?;
        let mut expressions = Vec::with_capacity(fields.len());
        for field in fields {
            check_name(field)?;
            expressions.push(field_expression(field));
        }

        let name = format!("idx_{}_{}", collection, fields.join("_")).replace('.', "_");
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON documents (collection, {})",
            name,
            expressions.join(", ")
        );
        self.conn.execute(&sql, [])?;
        debug!("Ensured index {}", name);
        Ok(())
    }

    fn count(&self, collection: &str, query: &Query) -> Result<usize, StoreError> {
        let (condition, values) = where_clause(collection, query)?;
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {}", condition);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_many(&mut self, collection: &str, query: &Query) -> Result<usize, StoreError> {
        let (condition, values) = where_clause(collection, query)?;
        let sql = format!("DELETE FROM documents WHERE {}", condition);
        Ok(self.conn.execute(&sql, params_from_iter(values.iter()))?)
    }
}

/// Field names are interpolated into SQL, so only plain paths are accepted
fn check_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("invalid field name '{}'", name)))
    }
}

/// Must stay textually identical between indexes and queries
fn field_expression(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field)
}

fn where_clause(collection: &str, query: &Query) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut conditions = vec!["collection = ?1".to_string()];
    let mut values = vec![SqlValue::Text(collection.to_string())];

    for (field, value) in query {
        check_name(field)?;
        let expression = field_expression(field);
        let sql_value = match value {
            Value::Null => {
                conditions.push(format!("{} IS NULL", expression));
                continue;
            }
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::Array(_) | Value::Object(_) => {
                return Err(StoreError::InvalidQuery(format!(
                    "field '{}' must be compared to a scalar",
                    field
                )))
            }
        };
        values.push(sql_value);
        conditions.push(format!("{} = ?{}", expression, values.len()));
    }

    Ok((conditions.join(" AND "), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let doc = json!({"case_id": "cust000-643594", "rank_score": 7.5});

        store.upsert("variant", "abc", &doc).unwrap();
        store.upsert("variant", "abc", &doc).unwrap();
        assert_eq!(store.count("variant", &[]).unwrap(), 1);

        let updated = json!({"case_id": "cust000-643594", "rank_score": 12.0});
        store.upsert("variant", "abc", &updated).unwrap();
        let found = store.find_one("variant", &[("case_id", json!("cust000-643594"))]).unwrap();
        assert_eq!(found, Some(updated));
    }

    #[test]
    fn test_collections_are_separate() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.upsert("case", "x", &json!({"a": 1})).unwrap();
        store.upsert("variant", "x", &json!({"a": 2})).unwrap();

        assert_eq!(store.count("case", &[]).unwrap(), 1);
        let found = store.find_one("variant", &[("a", json!(2))]).unwrap();
        assert!(found.is_some());
        assert!(store.find_one("case", &[("a", json!(2))]).unwrap().is_none());
    }

    #[test]
    fn test_upsert_many_query_and_delete() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_index("hgnc_gene", &["build", "symbol"]).unwrap();

        let docs: Vec<(String, Value)> = vec![
            ("hgnc:5:37".to_string(), json!({"build": "37", "symbol": "A1BG", "incomplete_penetrance": false})),
            ("hgnc:5:38".to_string(), json!({"build": "38", "symbol": "A1BG", "incomplete_penetrance": true})),
            ("hgnc:7:37".to_string(), json!({"build": "37", "symbol": "A2M", "incomplete_penetrance": false})),
        ];
        store.upsert_many("hgnc_gene", &docs).unwrap();

        let gene = store
            .find_one("hgnc_gene", &[("build", json!("38")), ("symbol", json!("A1BG"))])
            .unwrap()
            .unwrap();
        assert_eq!(gene["incomplete_penetrance"], json!(true));

        assert_eq!(store.count("hgnc_gene", &[("build", json!("37"))]).unwrap(), 2);
        let symbols: Vec<Value> = store
            .find("hgnc_gene", &[("build", json!("37"))])
            .unwrap()
            .into_iter()
            .map(|doc| doc["symbol"].clone())
            .collect();
        assert_eq!(symbols, vec![json!("A1BG"), json!("A2M")]);
        assert_eq!(store.count("hgnc_gene", &[("incomplete_penetrance", json!(true))]).unwrap(), 1);

        let deleted = store.delete_many("hgnc_gene", &[("build", json!("37"))]).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count("hgnc_gene", &[]).unwrap(), 1);
    }

    #[test]
    fn test_rejects_unsafe_field_names() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.create_index("variant", &["case_id'); DROP TABLE documents; --"]),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(store.count("variant", &[("a b", json!(1))]).is_err());
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.upsert("case", "cust000-643594", &json!({"owner": "cust000"})).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count("case", &[("owner", json!("cust000"))]).unwrap(), 1);
    }

    #[test]
    fn test_transient_errors() {
        let busy = StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());
        assert!(!StoreError::InvalidQuery("x".to_string()).is_transient());
    }
}
