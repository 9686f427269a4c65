use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    timestamp, Document, DocumentStore, Filter, StoreError, StoreResult, CREATED_AT_KEY, ID_KEY,
    UPDATED_AT_KEY,
};

const STORE_DB: &str = "store.db";

/// Document store backed by SQLite, one JSON body per row.
///
/// Unique fields are enforced with partial expression indexes over
/// `json_extract(body, ...)`, so a duplicate is rejected by SQLite itself.
pub struct SqliteStore {
    inner: Mutex<Inner>,
}

struct Inner {
    conn: Connection,
    // (index name, field) for mapping constraint failures back to a field
    unique: Vec<(String, String)>,
}

impl SqliteStore {
    /// Open or create the store database in the data directory
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(STORE_DB))?;
        Self::with_connection(conn)
    }

    /// A throwaway in-memory database
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                unique: Vec::new(),
            }),
        })
    }
}

/// Initialize the database schema
fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_order ON documents(collection, created_at, id)",
        [],
    )?;

    // Named counters, e.g. the note ticket sequence
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sequences (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Collection and field names end up in index DDL, so keep them to identifiers
fn check_identifier(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::Rejected(format!("invalid name '{}'", name)));
    }
    Ok(())
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn parse_body(body: &str) -> StoreResult<Document> {
    Ok(serde_json::from_str(body)?)
}

impl Inner {
    fn read(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(parse_body).transpose()
    }

    fn query(&self, collection: &str, filter: Option<&Filter>, limit: Option<usize>) -> StoreResult<Vec<Document>> {
        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?1");
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(collection.to_string())];

        for (field, value) in filter.map(Filter::conditions).unwrap_or_default() {
            args.push(SqlValue::Text(json_path(field)));
            let path_arg = args.len();
            match value {
                Value::Null => {
                    sql.push_str(&format!(" AND json_extract(body, ?{}) IS NULL", path_arg));
                    continue;
                }
                Value::Bool(b) => args.push(SqlValue::Integer(i64::from(*b))),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => args.push(SqlValue::Integer(i)),
                    None => args.push(SqlValue::Real(n.as_f64().unwrap_or_default())),
                },
                Value::String(s) => args.push(SqlValue::Text(s.clone())),
                Value::Array(_) | Value::Object(_) => args.push(SqlValue::Text(value.to_string())),
            }
            sql.push_str(&format!(
                " AND json_extract(body, ?{}) = ?{}",
                path_arg,
                args.len()
            ));
        }

        sql.push_str(" ORDER BY created_at, id");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies.iter().map(|body| parse_body(body)).collect()
    }

    /// Translate a declared unique index failure into the field it guards.
    /// Any other failure, including a primary key clash, stays a SQLite error.
    fn map_write_error(&self, collection: &str, err: rusqlite::Error) -> StoreError {
        if let rusqlite::Error::SqliteFailure(ref failure, Some(ref message)) = err {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                let field = self
                    .unique
                    .iter()
                    .find(|(index, _)| message.contains(index.as_str()))
                    .map(|(_, field)| field.clone());
                if let Some(field) = field {
                    return StoreError::UniqueViolation {
                        collection: collection.to_string(),
                        field,
                    };
                }
            }
        }
        StoreError::Sqlite(err)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, collection: &str, doc: Document) -> StoreResult<String> {
        check_identifier(collection)?;
        let inner = self.inner.lock().await;

        let id = Uuid::new_v4().to_string();
        let now = timestamp();

        let mut doc = doc;
        doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
        doc.insert(CREATED_AT_KEY.to_string(), Value::String(now.clone()));
        doc.insert(UPDATED_AT_KEY.to_string(), Value::String(now.clone()));
        let body = serde_json::to_string(&doc)?;

        inner
            .conn
            .execute(
                "INSERT INTO documents (collection, id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![collection, id, body, now],
            )
            .map_err(|e| inner.map_write_error(collection, e))?;

        tracing::debug!(collection, id = %id, "document created");
        Ok(id)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        inner.read(collection, id)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner.query(collection, Some(filter), Some(1))?.into_iter().next())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock().await;
        inner.query(collection, filter, None)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document> {
        check_identifier(collection)?;
        let inner = self.inner.lock().await;

        let mut doc = inner
            .read(collection, id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        for (key, value) in patch {
            if key == ID_KEY || key == CREATED_AT_KEY {
                continue;
            }
            if value.is_null() {
                doc.remove(&key);
            } else {
                doc.insert(key, value);
            }
        }
        doc.insert(UPDATED_AT_KEY.to_string(), Value::String(timestamp()));
        let body = serde_json::to_string(&doc)?;

        inner
            .conn
            .execute(
                "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
                params![collection, id, body],
            )
            .map_err(|e| inner.map_write_error(collection, e))?;

        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let inner = self.inner.lock().await;

        let existing = inner
            .read(collection, id)?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        inner.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;

        tracing::debug!(collection, id, "document deleted");
        Ok(existing)
    }

    async fn next_sequence(&self, name: &str, start: i64) -> StoreResult<i64> {
        let inner = self.inner.lock().await;
        let next = inner.conn.query_row(
            "INSERT INTO sequences (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            params![name, start],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        check_identifier(collection)?;
        check_identifier(field)?;
        let mut inner = self.inner.lock().await;

        let index = format!("uq_{}_{}", collection, field);
        if inner.unique.iter().any(|(name, _)| *name == index) {
            return Ok(());
        }

        let ddl = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON documents(json_extract(body, '$.{field}'))
             WHERE collection = '{collection}'",
            index = index,
            field = field,
            collection = collection,
        );
        inner
            .conn
            .execute(&ddl, [])
            .map_err(|e| inner.map_write_error(collection, e))?;

        inner.unique.push((index, field.to_string()));
        Ok(())
    }
}
