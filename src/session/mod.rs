//! Session module - task record persistence
//!
//! The agent core only consumes persistence through the [`SessionStore`]
//! capability: load a record, save a record, append an item to a record.
//! Two stores are provided:
//! - [`MemorySessionStore`] keeps records in memory (tests, one-shot runs)
//! - [`JsonFileSessionStore`] writes one JSON file per record
//!
//! # Example
//!
//! ```
//! use instantly::session::{MemorySessionStore, SessionStore, TaskRecord};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = MemorySessionStore::new();
//! let record = TaskRecord::with_id("task-1", "find the docs");
//! store.save(&record).await.unwrap();
//!
//! store.append("task-1", json!({"note": "started"})).await.unwrap();
//! let loaded = store.load("task-1").await.unwrap();
//! assert_eq!(loaded.items.len(), 1);
//! # });
//! ```

pub mod types;

pub use types::TaskRecord;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{InstantlyError, Result};

/// Persistence collaborator for task records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the record with `id`.
    ///
    /// # Errors
    /// `NotFound` if no such record exists.
    async fn load(&self, id: &str) -> Result<TaskRecord>;

    /// Insert or replace a record.
    async fn save(&self, record: &TaskRecord) -> Result<()>;

    /// Append `item` to an existing record.
    ///
    /// # Errors
    /// `NotFound` if no such record exists.
    async fn append(&self, id: &str, item: Value) -> Result<()>;
}

fn not_found(id: &str) -> InstantlyError {
    InstantlyError::NotFound(format!("Task record '{}'", id))
}

/// In-memory store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<TaskRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn save(&self, record: &TaskRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn append(&self, id: &str, item: Value) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_found(id))?;
        record.push_item(item);
        Ok(())
    }
}

/// Directory-backed store writing `<dir>/<sanitized id>.json`.
///
/// Appends are read-modify-write under a store-wide lock, so concurrent
/// appends through one store instance never lose items.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    dir: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileSessionStore {
    /// Store records under `~/.instantly/sessions`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_path(Config::dir().join("sessions"))
    }

    /// Store records under `dir`, creating it if needed.
    pub fn with_path(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }

    async fn read_record(&self, id: &str) -> Result<TaskRecord> {
        let path = self.file_path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(id)),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| {
            InstantlyError::Session(format!("Corrupt record {}: {}", path.display(), e))
        })
    }

    async fn write_record(&self, record: &TaskRecord) -> Result<()> {
        let path = self.file_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load(&self, id: &str) -> Result<TaskRecord> {
        self.read_record(id).await
    }

    async fn save(&self, record: &TaskRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_record(record).await
    }

    async fn append(&self, id: &str, item: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record(id).await?;
        record.push_item(item);
        self.write_record(&record).await
    }
}

/// Percent-encode characters that are unsafe in file names.
///
/// The mapping is one-to-one, so distinct ids never share a file.
fn sanitize_id(id: &str) -> String {
    let mut result = String::with_capacity(id.len() * 3);
    for c in id.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '%' => result.push_str("%25"),
            '.' if result.is_empty() => result.push_str("%2E"),
            c => result.push(c),
        }
    }
    result
}
