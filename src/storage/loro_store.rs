use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use loro::{LoroDoc, LoroList, LoroMap, LoroValue, ValueOrContainer};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    creation_order, timestamp, Document, DocumentStore, Filter, StoreError, StoreResult,
    CREATED_AT_KEY, ID_KEY, UPDATED_AT_KEY,
};

const LORO_DB: &str = "loro.db";
const LORO_TMP: &str = "loro.db.tmp";
const LORO_LOCK: &str = "loro.lock";
const META_MAP: &str = "_meta";
const SEQUENCES: &str = "sequences";

/// Document store backed by a single Loro CRDT document.
///
/// Each collection is a root map keyed by document id, each document a
/// nested map. Counters live under `_meta.sequences`.
///
/// On disk, every operation holds an exclusive lock on `loro.lock` and
/// works on a fresh import of `loro.db`, so several processes can share
/// one data directory. Writes replace the snapshot through a rename and
/// only after the whole operation succeeded; a failed operation leaves
/// nothing behind.
pub struct LoroStore {
    inner: Mutex<Inner>,
}

struct Inner {
    backing: Backing,
    unique: Vec<(String, String)>,
}

/// Where the snapshot lives between operations
enum Backing {
    File {
        path: PathBuf,
        tmp_path: PathBuf,
        lock_path: PathBuf,
    },
    Memory(Vec<u8>),
}

/// The document loaded for a single operation
struct View<'a> {
    doc: LoroDoc,
    unique: &'a [(String, String)],
}

impl LoroStore {
    /// Create an empty store file in the data directory
    pub fn init(data_dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(data_dir)?;

        let mut inner = Inner::on_disk(data_dir);
        inner.write(|_| Ok(()))?;

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Open the store in the data directory, starting empty if no file exists yet
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let inner = Inner::on_disk(data_dir);
        // Fail early on a corrupt snapshot
        inner.read(|_| Ok(()))?;

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                backing: Backing::Memory(Vec::new()),
                unique: Vec::new(),
            }),
        }
    }
}

impl Backing {
    /// Take the cross-process lock, held until the returned file is dropped
    fn lock(&self) -> StoreResult<Option<File>> {
        match self {
            Backing::File { lock_path, .. } => {
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(lock_path)?;
                FileExt::lock_exclusive(&file)?;
                Ok(Some(file))
            }
            Backing::Memory(_) => Ok(None),
        }
    }

    fn load(&self) -> StoreResult<LoroDoc> {
        let doc = LoroDoc::new();
        match self {
            Backing::File { path, .. } => {
                if path.exists() {
                    let bytes = fs::read(path)?;
                    if !bytes.is_empty() {
                        doc.import(&bytes)?;
                    }
                }
            }
            Backing::Memory(bytes) => {
                if !bytes.is_empty() {
                    doc.import(bytes)?;
                }
            }
        }
        Ok(doc)
    }

    fn store(&mut self, bytes: Vec<u8>) -> StoreResult<()> {
        match self {
            Backing::File { path, tmp_path, .. } => {
                fs::write(&*tmp_path, &bytes)?;
                fs::rename(&*tmp_path, &*path)?;
            }
            Backing::Memory(current) => *current = bytes,
        }
        Ok(())
    }
}

impl Inner {
    fn on_disk(data_dir: &Path) -> Self {
        Self {
            backing: Backing::File {
                path: data_dir.join(LORO_DB),
                tmp_path: data_dir.join(LORO_TMP),
                lock_path: data_dir.join(LORO_LOCK),
            },
            unique: Vec::new(),
        }
    }

    /// Run a read-only operation against the current snapshot
    fn read<T>(&self, op: impl FnOnce(&View<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let _lock = self.backing.lock()?;
        let view = View {
            doc: self.backing.load()?,
            unique: &self.unique,
        };
        op(&view)
    }

    /// Run an operation and persist its changes if it succeeds
    fn write<T>(&mut self, op: impl FnOnce(&View<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let _lock = self.backing.lock()?;
        let view = View {
            doc: self.backing.load()?,
            unique: &self.unique,
        };
        let value = op(&view)?;

        view.doc.commit();
        let bytes = view.doc.export(loro::ExportMode::Snapshot)?;
        self.backing.store(bytes)?;
        Ok(value)
    }
}

impl View<'_> {
    fn entity_map(&self, collection: &str, id: &str) -> Option<LoroMap> {
        match self.doc.get_map(collection).get(id) {
            Some(ValueOrContainer::Container(loro::Container::Map(map))) => Some(map),
            _ => None,
        }
    }

    fn entity(&self, collection: &str, id: &str) -> Option<Document> {
        self.entity_map(collection, id)
            .and_then(|map| match map.get_deep_value() {
                LoroValue::Map(entity) => Some(map_to_doc(&entity)),
                _ => None,
            })
    }

    fn list(&self, collection: &str) -> Vec<Document> {
        let mut docs = Vec::new();

        let json = self.doc.get_map(collection).get_deep_value();
        if let LoroValue::Map(map) = json {
            for (_, entity_value) in map.iter() {
                if let LoroValue::Map(entity_map) = entity_value {
                    docs.push(map_to_doc(entity_map));
                }
            }
        }

        docs.sort_by_key(creation_order);
        docs
    }

    /// Fail if `doc` would duplicate a unique field of another document
    fn check_unique(&self, collection: &str, doc: &Document, own_id: Option<&str>) -> StoreResult<()> {
        for (unique_collection, field) in self.unique {
            if unique_collection != collection {
                continue;
            }
            let value = match doc.get(field) {
                Some(Value::Null) | None => continue,
                Some(v) => v,
            };

            let clash = self.list(collection).into_iter().any(|other| {
                other.get(field) == Some(value)
                    && other.get(ID_KEY).and_then(Value::as_str) != own_id
            });
            if clash {
                return Err(StoreError::UniqueViolation {
                    collection: collection.to_string(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_collection(collection: &str) -> StoreResult<()> {
    if collection.is_empty() || collection.starts_with('_') {
        return Err(StoreError::Rejected(format!(
            "invalid collection name '{}'",
            collection
        )));
    }
    Ok(())
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for LoroStore {
    async fn create(&self, collection: &str, doc: Document) -> StoreResult<String> {
        check_collection(collection)?;
        let mut inner = self.inner.lock().await;

        let id = inner.write(|view| {
            view.check_unique(collection, &doc, None)?;

            let id = Uuid::new_v4().to_string();
            let now = timestamp();

            let mut doc = doc;
            doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
            doc.insert(CREATED_AT_KEY.to_string(), Value::String(now.clone()));
            doc.insert(UPDATED_AT_KEY.to_string(), Value::String(now));

            let entity_map = view
                .doc
                .get_map(collection)
                .get_or_create_container(&id, LoroMap::new())?;
            write_fields(&entity_map, &doc)?;
            Ok(id)
        })?;

        tracing::debug!(collection, id = %id, "document created");
        Ok(id)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        inner.read(|view| Ok(view.entity(collection, id)))
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let inner = self.inner.lock().await;
        inner.read(|view| {
            Ok(view
                .list(collection)
                .into_iter()
                .find(|doc| filter.matches(doc)))
        })
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock().await;
        let docs = inner.read(|view| Ok(view.list(collection)))?;
        Ok(match filter {
            Some(filter) => docs.into_iter().filter(|doc| filter.matches(doc)).collect(),
            None => docs,
        })
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document> {
        check_collection(collection)?;
        let mut inner = self.inner.lock().await;

        inner.write(|view| {
            let entity_map = view
                .entity_map(collection, id)
                .ok_or_else(|| not_found(collection, id))?;
            view.check_unique(collection, &patch, Some(id))?;

            let mut patch = patch;
            patch.remove(ID_KEY);
            patch.remove(CREATED_AT_KEY);
            patch.insert(UPDATED_AT_KEY.to_string(), Value::String(timestamp()));
            write_fields(&entity_map, &patch)?;

            match entity_map.get_deep_value() {
                LoroValue::Map(entity) => Ok(map_to_doc(&entity)),
                _ => Err(StoreError::Rejected(format!(
                    "document {}/{} is not a map",
                    collection, id
                ))),
            }
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let mut inner = self.inner.lock().await;

        let existing = inner.write(|view| {
            let existing = view
                .entity(collection, id)
                .ok_or_else(|| not_found(collection, id))?;
            view.doc.get_map(collection).delete(id)?;
            Ok(existing)
        })?;

        tracing::debug!(collection, id, "document deleted");
        Ok(existing)
    }

    async fn next_sequence(&self, name: &str, start: i64) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;

        inner.write(|view| {
            let meta = view.doc.get_map(META_MAP);
            let sequences = meta.get_or_create_container(SEQUENCES, LoroMap::new())?;

            let next = match sequences.get(name) {
                Some(ValueOrContainer::Value(LoroValue::I64(current))) => current + 1,
                _ => start,
            };
            sequences.insert(name, next)?;
            Ok(next)
        })
    }

    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        check_collection(collection)?;
        let mut inner = self.inner.lock().await;

        let key = (collection.to_string(), field.to_string());
        if inner.unique.contains(&key) {
            return Ok(());
        }

        // Existing data must already satisfy the constraint
        let docs = inner.read(|view| Ok(view.list(collection)))?;
        let mut seen = Vec::new();
        for doc in docs {
            if let Some(value) = doc.get(field).filter(|v| !v.is_null()) {
                if seen.contains(value) {
                    return Err(StoreError::UniqueViolation {
                        collection: key.0,
                        field: key.1,
                    });
                }
                seen.push(value.clone());
            }
        }

        inner.unique.push(key);
        Ok(())
    }
}

/// Write the fields of `doc` into a Loro map, replacing list contents
fn write_fields(entity_map: &LoroMap, doc: &Document) -> StoreResult<()> {
    for (key, value) in doc {
        match value {
            Value::Null => {
                if entity_map.get(key).is_some() {
                    entity_map.delete(key)?;
                }
            }
            Value::Array(items) => {
                let list = entity_map.get_or_create_container(key, LoroList::new())?;
                while !list.is_empty() {
                    list.delete(0, 1)?;
                }
                for item in items {
                    list.push(scalar(item))?;
                }
            }
            Value::Object(fields) => {
                let child = entity_map.get_or_create_container(key, LoroMap::new())?;
                write_fields(&child, fields)?;
            }
            _ => entity_map.insert(key, scalar(value))?,
        }
    }
    Ok(())
}

fn scalar(value: &Value) -> LoroValue {
    match value {
        Value::Null => LoroValue::Null,
        Value::Bool(b) => LoroValue::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LoroValue::from(i),
            None => LoroValue::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => LoroValue::from(s.as_str()),
        // Nested structures inside lists are kept as their JSON text
        Value::Array(_) | Value::Object(_) => LoroValue::from(value.to_string().as_str()),
    }
}

fn to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::I64(n) => Value::from(*n),
        LoroValue::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::List(list) => Value::Array(list.iter().map(to_json).collect()),
        LoroValue::Map(map) => Value::Object(map_to_doc(map)),
        _ => Value::Null,
    }
}

fn map_to_doc(map: &loro::LoroMapValue) -> Document {
    map.iter()
        .map(|(key, value)| (key.to_string(), to_json(value)))
        .collect()
}
