//! Event Bus Module
//!
//! This module provides the publish/subscribe hub the agent core uses to make
//! state changes and tool outcomes observable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  dispatch   ┌─────────────┐  fan-out   ┌─────────────┐
//! │ AgentState  │────────────>│  EventBus   │───────────>│  Listener A │
//! │ Agent loop  │             │  (history)  │───────────>│  Listener B │
//! └─────────────┘             └─────────────┘            └─────────────┘
//! ```
//!
//! Dispatch appends the event to history first, then runs every listener
//! subscribed to the event's [`EventType`] concurrently and waits for all of
//! them. Listener failures are collected and reported together once every
//! listener has finished.
//!
//! # Example
//!
//! ```
//! use instantly::bus::{Event, EventBus, EventType, FnListener, StateChangeEvent};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new();
//!     bus.subscribe(EventType::StateChange, FnListener::new(|event| {
//!         println!("state changed: {:?}", event.as_state_change());
//!         Ok(())
//!     }));
//!
//!     let event = Event::state_change(StateChangeEvent::new("mode", None, json!("fast")));
//!     bus.dispatch(event).await.unwrap();
//!     assert_eq!(bus.history(None).len(), 1);
//! }
//! ```

pub mod event;

pub use event::{Event, EventKind, EventType, StateChangeEvent, ToolExecutionEvent, ToolOutcome};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{InstantlyError, Result};

/// Something that reacts to dispatched events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event. Errors are collected by the bus, not swallowed.
    async fn on_event(&self, event: &Event) -> Result<()>;
}

/// Adapter turning a synchronous closure into an [`EventListener`].
pub struct FnListener<F> {
    func: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    async fn on_event(&self, event: &Event) -> Result<()> {
        (self.func)(event)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ListenerMap = HashMap<EventType, Vec<(SubscriptionId, Arc<dyn EventListener>)>>;

struct BusInner {
    listeners: RwLock<ListenerMap>,
    history: RwLock<Vec<Arc<Event>>>,
    next_id: AtomicU64,
}

/// The typed publish/subscribe hub.
///
/// Cloning an `EventBus` is cheap and yields a handle to the same listeners
/// and history, so the agent and its state can share one bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(HashMap::new()),
                history: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribes `listener` to events tagged `event_type`.
    pub fn subscribe<L>(&self, event_type: EventType, listener: L) -> SubscriptionId
    where
        L: EventListener + 'static,
    {
        self.subscribe_arc(event_type, Arc::new(listener))
    }

    /// Subscribes an already shared listener.
    pub fn subscribe_arc(
        &self,
        event_type: EventType,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.write_listeners()
            .entry(event_type)
            .or_default()
            .push((id, listener));
        debug!(event_type = %event_type, subscription = id.0, "Listener subscribed");
        id
    }

    /// Removes a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> bool {
        let mut listeners = self.write_listeners();
        let Some(list) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        before != list.len()
    }

    /// Number of listeners currently subscribed to `event_type`.
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.read_listeners()
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Records `event` and fans it out to every matching listener.
    ///
    /// The event is in history before any listener runs. All listeners are
    /// polled concurrently and the call completes once every one of them has
    /// finished.
    ///
    /// # Errors
    /// Returns `InstantlyError::Listener` naming every failed listener.
    pub async fn dispatch(&self, event: Event) -> Result<()> {
        let event = Arc::new(event);
        let event_type = event.event_type();

        self.write_history().push(Arc::clone(&event));

        // Snapshot so no lock is held while listeners run.
        let listeners: Vec<Arc<dyn EventListener>> = self
            .read_listeners()
            .get(&event_type)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        if listeners.is_empty() {
            return Ok(());
        }

        debug!(event_type = %event_type, listeners = listeners.len(), "Dispatching event");

        let results = join_all(listeners.iter().map(|l| l.on_event(&event))).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(event_type = %event_type, failed = failures.len(), "Event listeners failed");
            Err(InstantlyError::Listener {
                event_type,
                failures,
            })
        }
    }

    /// Dispatched events in dispatch order, optionally filtered by tag.
    pub fn history(&self, event_type: Option<EventType>) -> Vec<Arc<Event>> {
        let history = self.read_history();
        match event_type {
            Some(t) => history
                .iter()
                .filter(|e| e.event_type() == t)
                .cloned()
                .collect(),
            None => history.clone(),
        }
    }

    /// Drops all recorded history.
    pub fn clear_history(&self) {
        self.write_history().clear();
    }

    fn read_listeners(&self) -> RwLockReadGuard<'_, ListenerMap> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_listeners(&self) -> RwLockWriteGuard<'_, ListenerMap> {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_history(&self) -> RwLockReadGuard<'_, Vec<Arc<Event>>> {
        self.inner
            .history
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_history(&self) -> RwLockWriteGuard<'_, Vec<Arc<Event>>> {
        self.inner
            .history
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_len", &self.read_history().len())
            .finish()
    }
}
