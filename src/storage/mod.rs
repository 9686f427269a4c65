//! Document storage abstraction and its backends.
//!
//! Services talk to a [`DocumentStore`]: a generic, per-document atomic
//! store of JSON objects grouped into named collections. The store owns the
//! `id`, `createdAt` and `updatedAt` keys of every document it returns.

mod loro_store;
mod sqlite_store;

pub use loro_store::LoroStore;
pub use sqlite_store::SqliteStore;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{Result, TechNotesError};

/// Directory holding all project state, relative to the project root.
pub const DATA_DIR: &str = ".technotes";

/// Keys maintained by the store on every document.
pub const ID_KEY: &str = "id";
pub const CREATED_AT_KEY: &str = "createdAt";
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Duplicate value for unique field {collection}.{field}")]
    UniqueViolation { collection: String, field: String },

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Failed to decode document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Loro error: {0}")]
    Loro(#[from] loro::LoroError),

    #[error("Loro encode error: {0}")]
    LoroEncode(#[from] loro::LoroEncodeError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Conjunction of field equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching documents whose `field` equals `value`.
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// Generic document persistence used by the services.
///
/// Every method is atomic for the single document it touches; there are no
/// cross-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return the identifier assigned to it.
    async fn create(&self, collection: &str, doc: Document) -> StoreResult<String>;

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// First document matching `filter`, in store order.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// All documents of a collection, or only those matching `filter`.
    async fn find_many(&self, collection: &str, filter: Option<&Filter>)
        -> StoreResult<Vec<Document>>;

    /// Merge `patch` into an existing document and return the result.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document>;

    /// Remove a document and return it as it was before removal.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<Document>;

    /// Atomically advance the named counter. The first call returns `start`.
    async fn next_sequence(&self, name: &str, start: i64) -> StoreResult<i64>;

    /// Declare `field` unique within `collection`; later writes that would
    /// duplicate a value fail with [`StoreError::UniqueViolation`].
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()>;
}

/// Selectable storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Loro,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Loro => write!(f, "loro"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Backend {
    type Err = TechNotesError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loro" => Ok(Backend::Loro),
            "sqlite" => Ok(Backend::Sqlite),
            _ => Err(TechNotesError::InvalidBackend(s.to_string())),
        }
    }
}

/// Open the store of an initialized project with the chosen backend.
pub fn open_store(root: &Path, backend: Backend) -> Result<Arc<dyn DocumentStore>> {
    let data_dir = root.join(DATA_DIR);
    if !data_dir.exists() {
        return Err(TechNotesError::NotInitialized);
    }

    let store: Arc<dyn DocumentStore> = match backend {
        Backend::Loro => Arc::new(LoroStore::open(&data_dir)?),
        Backend::Sqlite => Arc::new(SqliteStore::open(&data_dir)?),
    };
    Ok(store)
}

/// Serialize a value that must encode as a JSON object into a document.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Rejected(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Decode a stored document into a typed entity.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Current time in the format used for `createdAt` / `updatedAt`.
///
/// Strictly increasing within the process, so creation order is total.
pub(crate) fn timestamp() -> String {
    let now = chrono::Utc::now().timestamp_micros();
    let micros = match LAST_TIMESTAMP.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(last) | Err(last) => now.max(last + 1),
    };
    chrono::DateTime::from_timestamp_micros(micros)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Sort key giving creation order, with the id as a tiebreaker.
pub(crate) fn creation_order(doc: &Document) -> (String, String) {
    let field = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field(CREATED_AT_KEY), field(ID_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let d = doc(json!({"user": "u1", "title": "t1", "completed": false}));

        assert!(Filter::by("user", "u1").matches(&d));
        assert!(Filter::by("user", "u1").and("completed", false).matches(&d));
        assert!(!Filter::by("user", "u1").and("title", "t2").matches(&d));
        assert!(!Filter::by("missing", "x").matches(&d));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&Document::new()));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("loro".parse::<Backend>().unwrap(), Backend::Loro);
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert!(matches!(
            "mongo".parse::<Backend>(),
            Err(TechNotesError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let stamps: Vec<String> = (0..100).map(|_| timestamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stamps[0].ends_with('Z'));
    }

    #[test]
    fn test_creation_order_sorts_by_timestamp_then_id() {
        let a = doc(json!({"id": "b", "createdAt": "2024-01-01T00:00:00.000001Z"}));
        let b = doc(json!({"id": "a", "createdAt": "2024-01-01T00:00:00.000002Z"}));
        assert!(creation_order(&a) < creation_order(&b));
    }
}
