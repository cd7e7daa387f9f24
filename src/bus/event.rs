//! Event types for the Instantly event bus
//!
//! Events form a closed set: every notification is either a tool execution
//! outcome or a change to the agent's keyed state. Subscriptions are keyed by
//! [`EventType`], the tag of the [`EventKind`] variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Tag identifying the concrete event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// A tool call finished (successfully or not)
    ToolExecution,
    /// A key in the agent's scratch state was set
    StateChange,
}

impl EventType {
    /// Return an array of all event tags.
    pub fn all() -> [EventType; 2] {
        [EventType::ToolExecution, EventType::StateChange]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolExecution => write!(f, "ToolExecutionEvent"),
            Self::StateChange => write!(f, "StateChangeEvent"),
        }
    }
}

/// An immutable notification published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: Uuid,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// The concrete payload
    pub kind: EventKind,
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    /// Terminal outcome of one tool invocation
    ToolExecution(ToolExecutionEvent),
    /// A keyed state mutation
    StateChange(StateChangeEvent),
}

impl Event {
    /// Creates a new event stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Creates a tool execution event.
    pub fn tool_execution(event: ToolExecutionEvent) -> Self {
        Self::new(EventKind::ToolExecution(event))
    }

    /// Creates a state change event.
    pub fn state_change(event: StateChangeEvent) -> Self {
        Self::new(EventKind::StateChange(event))
    }

    /// The tag used for subscription and history filtering.
    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::ToolExecution(_) => EventType::ToolExecution,
            EventKind::StateChange(_) => EventType::StateChange,
        }
    }

    /// Returns the tool execution payload, if this is one.
    pub fn as_tool_execution(&self) -> Option<&ToolExecutionEvent> {
        match &self.kind {
            EventKind::ToolExecution(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the state change payload, if this is one.
    pub fn as_state_change(&self) -> Option<&StateChangeEvent> {
        match &self.kind {
            EventKind::StateChange(e) => Some(e),
            _ => None,
        }
    }
}

/// How a tool invocation ended.
///
/// Tool events are only built once the sandboxed call has returned or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool returned a value
    Success(Value),
    /// The tool (or its lookup) failed with this message
    Failure(String),
}

/// Outcome of a single tool call.
///
/// # Example
/// ```
/// use instantly::bus::ToolExecutionEvent;
/// use serde_json::json;
///
/// let event = ToolExecutionEvent::success("echo", vec![json!("hi")], Default::default(), json!("hi"));
/// assert_eq!(event.result(), Some(&json!("hi")));
/// assert!(event.error().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionEvent {
    /// Registered name of the tool
    pub tool_name: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Terminal outcome
    pub outcome: ToolOutcome,
}

impl ToolExecutionEvent {
    /// Event for a call that returned `result`.
    pub fn success(
        tool_name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        result: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            kwargs,
            outcome: ToolOutcome::Success(result),
        }
    }

    /// Event for a call that failed with `error`.
    pub fn failure(
        tool_name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            kwargs,
            outcome: ToolOutcome::Failure(error.into()),
        }
    }

    /// The returned value, if the call succeeded.
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success(v) => Some(v),
            ToolOutcome::Failure(_) => None,
        }
    }

    /// The error message, if the call failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Success(_) => None,
            ToolOutcome::Failure(e) => Some(e),
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }
}

/// A keyed state mutation. `old_value` is `None` when the key was unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    /// The key that changed
    pub key: String,
    /// Value before the mutation
    pub old_value: Option<Value>,
    /// Value after the mutation
    pub new_value: Value,
}

impl StateChangeEvent {
    /// Creates a new state change record.
    pub fn new(key: impl Into<String>, old_value: Option<Value>, new_value: Value) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::ToolExecution.to_string(), "ToolExecutionEvent");
        assert_eq!(EventType::StateChange.to_string(), "StateChangeEvent");
    }

    #[test]
    fn test_event_tag_follows_payload() {
        let tool = Event::tool_execution(ToolExecutionEvent::success(
            "echo",
            vec![],
            Map::new(),
            json!(null),
        ));
        assert_eq!(tool.event_type(), EventType::ToolExecution);
        assert!(tool.as_tool_execution().is_some());
        assert!(tool.as_state_change().is_none());

        let state = Event::state_change(StateChangeEvent::new("k", None, json!(1)));
        assert_eq!(state.event_type(), EventType::StateChange);
        assert!(state.as_state_change().is_some());
    }

    #[test]
    fn test_tool_event_success_is_terminal() {
        let event = ToolExecutionEvent::success("echo", vec![json!("hi")], Map::new(), json!("hi"));
        assert!(event.is_success());
        assert_eq!(event.result(), Some(&json!("hi")));
        assert!(event.error().is_none());
    }

    #[test]
    fn test_tool_event_failure_is_terminal() {
        let event = ToolExecutionEvent::failure("fs", vec![], Map::new(), "bad op");
        assert!(!event.is_success());
        assert!(event.result().is_none());
        assert_eq!(event.error(), Some("bad op"));
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::state_change(StateChangeEvent::new("k", None, json!(1)));
        let b = Event::state_change(StateChangeEvent::new("k", None, json!(1)));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = Event::state_change(StateChangeEvent::new("mode", Some(json!("a")), json!("b")));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"]["event_type"], "state_change");
        assert_eq!(value["kind"]["old_value"], "a");
    }
}
