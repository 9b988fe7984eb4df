//! Persistent key-value capability backing the summary cache.
//!
//! Keys are arbitrary strings and values are JSON. [`JsonFileKvStore`] keeps
//! the whole map in one file and rewrites it atomically on every `set`
//! (serialize to a temp file, then rename into place), so a crash mid-write
//! leaves the previous contents intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use crate::StoreError;

/// Type alias to keep store signatures readable.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Durable string-keyed JSON storage.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;
    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()>;
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        let value = self
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }
}

/// Single-file JSON store.
#[derive(Debug)]
pub struct JsonFileKvStore {
    path: PathBuf,
    values: tokio::sync::Mutex<Map<String, Value>>,
}

impl JsonFileKvStore {
    /// Open (or lazily create) the store at `path`. A missing file is an
    /// empty store; the file and its parent directory are created on the
    /// first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => map,
                other => {
                    return Err(StoreError::Corrupt {
                        key: path.display().to_string(),
                        message: format!("expected a JSON object, found {}", type_name(&other)),
                    });
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("opened store {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: tokio::sync::Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    async fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

impl KvStore for JsonFileKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.values.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut values = self.values.lock().await;
            let previous = values.insert(key.to_string(), value);
            if let Err(e) = self.persist(&values).await {
                // Keep memory and disk in agreement.
                match previous {
                    Some(prev) => values.insert(key.to_string(), prev),
                    None => values.remove(key),
                };
                return Err(e);
            }
            Ok(())
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
