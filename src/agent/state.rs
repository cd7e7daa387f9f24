//! Agent scratch state and append-only step logs
//!
//! `AgentState` holds a keyed map of arbitrary JSON values plus five ordered
//! logs the step loop writes into. Only keyed mutations through [`AgentState::set`]
//! are published on the event bus; log appends are local records.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tracing::debug;

use crate::bus::{Event, EventBus, StateChangeEvent};
use crate::error::Result;

#[derive(Debug, Default)]
struct Logs {
    thoughts: Vec<String>,
    outputs: Vec<String>,
    actions: Vec<Value>,
    urls: Vec<String>,
    content: Vec<Value>,
}

/// Mutable key/value state owned by one agent.
///
/// # Example
/// ```
/// use instantly::agent::AgentState;
/// use instantly::bus::EventType;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let state = AgentState::default();
/// state.set("mode", json!("fast")).await.unwrap();
/// assert_eq!(state.get("mode"), Some(json!("fast")));
///
/// let events = state.event_bus().history(Some(EventType::StateChange));
/// assert_eq!(events.len(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct AgentState {
    bus: EventBus,
    values: RwLock<Map<String, Value>>,
    logs: RwLock<Logs>,
}

impl AgentState {
    /// Creates empty state publishing on `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            values: RwLock::new(Map::new()),
            logs: RwLock::new(Logs::default()),
        }
    }

    /// The bus state changes are published on.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Stores `value` under `key` and publishes a `StateChange` event.
    ///
    /// The previous value is captured before the write, so the event carries
    /// `old_value: None` for a key that was unset. The mutation stays applied
    /// even when a listener fails; the listener error is returned.
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let old_value = {
            let mut values = self.write_values();
            let old = values.get(&key).cloned();
            values.insert(key.clone(), value.clone());
            old
        };

        debug!(key = %key, "State key set");
        self.bus
            .dispatch(Event::state_change(StateChangeEvent::new(
                key, old_value, value,
            )))
            .await
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_values().get(key).cloned()
    }

    /// Returns the value under `key`, or `default` when unset.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Removes `key`. Missing keys are ignored.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.write_values().remove(key)
    }

    /// Snapshot of the keyed state.
    pub fn to_dict(&self) -> Map<String, Value> {
        self.read_values().clone()
    }

    /// Replaces the keyed state wholesale. No events are published.
    pub fn load_dict(&self, values: Map<String, Value>) {
        *self.write_values() = values;
    }

    pub fn record_thought(&self, thought: impl Into<String>) {
        self.write_logs().thoughts.push(thought.into());
    }

    pub fn record_output(&self, output: impl Into<String>) {
        self.write_logs().outputs.push(output.into());
    }

    pub fn record_action(&self, action: Value) {
        self.write_logs().actions.push(action);
    }

    pub fn record_url(&self, url: impl Into<String>) {
        self.write_logs().urls.push(url.into());
    }

    pub fn record_content(&self, content: Value) {
        self.write_logs().content.push(content);
    }

    pub fn thoughts(&self) -> Vec<String> {
        self.read_logs().thoughts.clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.read_logs().outputs.clone()
    }

    pub fn actions(&self) -> Vec<Value> {
        self.read_logs().actions.clone()
    }

    pub fn visited_urls(&self) -> Vec<String> {
        self.read_logs().urls.clone()
    }

    pub fn extracted_content(&self) -> Vec<Value> {
        self.read_logs().content.clone()
    }

    fn read_values(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.values.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_values(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.values.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read_logs(&self) -> RwLockReadGuard<'_, Logs> {
        self.logs.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_logs(&self) -> RwLockWriteGuard<'_, Logs> {
        self.logs.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new(EventBus::new())
    }
}
