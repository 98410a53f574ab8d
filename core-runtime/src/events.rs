//! # Event Bus System
//!
//! Typed lifecycle events for catalog scans, delivered over a
//! `core_async::sync::broadcast` channel.
//!
//! ## Overview
//!
//! - **Event Types**: [`ScanEvent`] for session lifecycle, [`CatalogEvent`]
//!   for read-model swaps and snapshot persistence
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! Partial crawl results are not carried here; they travel on the
//! synchronizer's own progress channel so that large record batches are not
//! cloned into every lifecycle subscriber.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::events::{CoreEvent, EventBus, ScanEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Scan(ScanEvent::Canceled {
//!         session_id: "5f0c...".to_string(),
//!         partition: "music".to_string(),
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! `emit` fails only when nobody is subscribed. Publishers call `.ok()` on
//! the result: an unobserved event is not an error.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scan session lifecycle
    Scan(ScanEvent),
    /// Catalog read model and snapshot changes
    Catalog(CatalogEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Catalog(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Scan(ScanEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Catalog(CatalogEvent::SnapshotPersistFailed { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Scan(ScanEvent::Completed { .. })
            | CoreEvent::Catalog(CatalogEvent::Published { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Partition the event refers to (`"music"` or `"video"`).
    pub fn partition(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.partition(),
            CoreEvent::Catalog(e) => e.partition(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Scan Events
// ============================================================================

/// Events describing one synchronization session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    /// Session started.
    Started {
        session_id: String,
        partition: String,
        /// Whether the snapshot cache may be used.
        use_cache: bool,
    },
    /// Full crawl reported a batch of newly discovered items.
    Progress {
        session_id: String,
        partition: String,
        /// Items discovered so far in this session.
        items_discovered: u64,
    },
    /// Session finished and its result was published.
    Completed {
        session_id: String,
        partition: String,
        /// `"cache"` when reconciled from the snapshot, `"crawl"` otherwise.
        path: String,
        /// Records in the published catalog.
        items: u64,
        /// Records demoted or removed by this session.
        removed: u64,
        duration_ms: u64,
    },
    /// Session was superseded or explicitly canceled; nothing was published.
    Canceled { session_id: String, partition: String },
    /// Session failed; the previous catalog stays visible.
    Failed {
        session_id: String,
        partition: String,
        message: String,
    },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::Started { .. } => "Scan started",
            ScanEvent::Progress { .. } => "Scan in progress",
            ScanEvent::Completed { .. } => "Scan completed",
            ScanEvent::Canceled { .. } => "Scan canceled",
            ScanEvent::Failed { .. } => "Scan failed",
        }
    }

    fn partition(&self) -> &str {
        match self {
            ScanEvent::Started { partition, .. }
            | ScanEvent::Progress { partition, .. }
            | ScanEvent::Completed { partition, .. }
            | ScanEvent::Canceled { partition, .. }
            | ScanEvent::Failed { partition, .. } => partition,
        }
    }
}

// ============================================================================
// Catalog Events
// ============================================================================

/// Events describing changes to the published catalog and its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    /// A new read model was swapped in.
    Published {
        partition: String,
        /// Monotonic per-partition publish counter.
        generation: u64,
        records: u64,
        albums: u64,
        artists: u64,
    },
    /// The snapshot blob was written.
    SnapshotPersisted { partition: String, records: u64 },
    /// The snapshot could not be written; the in-memory catalog is unaffected.
    SnapshotPersistFailed { partition: String, message: String },
}

impl CatalogEvent {
    fn description(&self) -> &str {
        match self {
            CatalogEvent::Published { .. } => "Catalog published",
            CatalogEvent::SnapshotPersisted { .. } => "Snapshot persisted",
            CatalogEvent::SnapshotPersistFailed { .. } => "Snapshot persistence failed",
        }
    }

    fn partition(&self) -> &str {
        match self {
            CatalogEvent::Published { partition, .. }
            | CatalogEvent::SnapshotPersisted { partition, .. }
            | CatalogEvent::SnapshotPersistFailed { partition, .. } => partition,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus; cheap to clone, all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
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
/// ```ignore
/// let music_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.partition() == "music");
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

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
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
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
