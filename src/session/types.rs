//! Session record types for Instantly
//!
//! A [`TaskRecord`] is the persisted form of one agent task: its scratch
//! state plus an append-only list of items (messages, tool results, notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted snapshot of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier for this record
    pub id: String,
    /// Task description the agent was given
    pub task: String,
    /// Keyed agent state at save time
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Appended items, oldest first
    #[serde(default)]
    pub items: Vec<Value>,
    /// When this record was created
    pub created_at: DateTime<Utc>,
    /// When this record was last modified
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create an empty record for `task` with a fresh UUID.
    ///
    /// # Example
    /// ```
    /// use instantly::session::TaskRecord;
    ///
    /// let record = TaskRecord::new("summarise the docs");
    /// assert!(record.items.is_empty());
    /// assert_eq!(record.created_at, record.updated_at);
    /// ```
    pub fn new(task: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), task)
    }

    /// Create an empty record with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task: task.into(),
            state: Map::new(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an item and bump `updated_at`.
    pub fn push_item(&mut self, item: Value) {
        self.items.push(item);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
