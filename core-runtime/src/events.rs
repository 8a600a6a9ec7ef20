//! # Event Bus System
//!
//! Provides an event-driven channel between the sync core and the host UI
//! using `tokio::sync::broadcast`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │   Syncer    ├──────────────>│           │
//! └─────────────┘               │ EventBus  │     subscribe    ┌────────────┐
//!                               │ (broadcast├─────────────────>│  Host UI   │
//! ┌─────────────┐     emit      │  channel) │                  └────────────┘
//! │   Manager   ├──────────────>│           │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Sync(SyncEvent::Finished)).ok();
//! assert_eq!(subscriber.try_recv().unwrap().name(), "sync-local-finished");
//! ```
//!
//! ## Wire names
//!
//! Every event has a stable name that hosts use to route it:
//! - `sync-local-queue-state`: current per-kind queue contents
//! - `sync-local-finished`: fired once per drained sync pass
//! - `collections-refreshed-anime` / `collections-refreshed-manga`: fired
//!   after a push pass refreshed the remote collections
//!
//! A slow subscriber sees `RecvError::Lagged(n)` once and then resumes with
//! the oldest buffered event; `RecvError::Closed` means the core shut down.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Local sync queue events
    Sync(SyncEvent),
    /// Remote collection refresh events
    Collections(CollectionEvent),
}

impl CoreEvent {
    /// Returns the stable wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Sync(SyncEvent::QueueState { .. }) => "sync-local-queue-state",
            CoreEvent::Sync(SyncEvent::Finished) => "sync-local-finished",
            CoreEvent::Collections(CollectionEvent::AnimeRefreshed) => {
                "collections-refreshed-anime"
            }
            CoreEvent::Collections(CollectionEvent::MangaRefreshed) => {
                "collections-refreshed-manga"
            }
        }
    }

    /// Used by emitters to pick a log level.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::QueueState { .. }) => EventSeverity::Debug,
            CoreEvent::Sync(SyncEvent::Finished) => EventSeverity::Info,
            CoreEvent::Collections(_) => EventSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
}

// ============================================================================
// Sync Events
// ============================================================================

/// A media item waiting in or being processed by a sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueMediaTask {
    pub media_id: i32,
    pub image: String,
    pub title: String,
    /// `"anime"` or `"manga"`
    #[serde(rename = "type")]
    pub kind: String,
}

/// Snapshot of both sync queues, keyed by media id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    pub anime_tasks: BTreeMap<i32, QueueMediaTask>,
    pub manga_tasks: BTreeMap<i32, QueueMediaTask>,
}

impl QueueState {
    /// Returns true when neither queue holds a task.
    pub fn is_empty(&self) -> bool {
        self.anime_tasks.is_empty() && self.manga_tasks.is_empty()
    }
}

/// Events published by the local sync queues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// The set of queued media changed.
    #[serde(rename = "sync-local-queue-state")]
    QueueState {
        /// Current contents of both queues.
        state: QueueState,
    },
    /// Both queues drained and the mirror collections were rebuilt.
    #[serde(rename = "sync-local-finished")]
    Finished,
}

// ============================================================================
// Collection Events
// ============================================================================

/// Events emitted after the remote collections were refreshed by a push pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CollectionEvent {
    #[serde(rename = "collections-refreshed-anime")]
    AnimeRefreshed,
    #[serde(rename = "collections-refreshed-manga")]
    MangaRefreshed,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by the manager, the sync workers and the host.
/// Cloning the bus yields another producer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// A subscriber more than `capacity` events behind gets `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Next event accepted by the filter. Lagging is reported, not skipped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// `None` when no matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
