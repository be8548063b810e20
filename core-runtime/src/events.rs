//! # Event Bus System
//!
//! Typed, broadcast events for the media-index engine built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps one enum per concern
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ```text
//! ┌─────────────┐  SyncEvent   ┌───────────┐   subscribe   ┌────────────┐
//! │  Sync Jobs  ├─────────────>│ EventBus  ├──────────────>│  UI layer  │
//! └─────────────┘  IndexEvent  └───────────┘               └────────────┘
//! ```
//!
//! [`IndexEvent::Changed`] is the "data changed" signal readers re-query on.
//! It fires at most once per committed page that changed at least one row.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, IndexEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Index(IndexEvent::Changed {
//!         domain: "search_results".to_string(),
//!         parent_key: "42".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Cached index data changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber fell behind and missed `n` events.
//!   Readers should simply re-query the cache.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Lifecycle of sync and reset jobs
    Sync(SyncEvent),
    /// Changes to cached index data
    Index(IndexEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Index(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Obsolete { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::ResetCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by sync and reset jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        job_id: String,
        /// `media_sets`, `media_in_media_set` or `search_results`
        domain: String,
        /// `local` or `cloud`
        source: String,
        authority: String,
    },
    /// A page was committed to the cache.
    PageCached {
        job_id: String,
        page: u32,
        rows_written: u64,
    },
    Completed {
        job_id: String,
        pages: u32,
        rows_written: u64,
    },
    /// The run's precondition went stale; the scheduler may reschedule freely.
    Obsolete { job_id: String, reason: String },
    Failed { job_id: String, message: String },
    ResetCompleted {
        job_id: String,
        domain: String,
        /// `partial`, `full`, `expired` or `media_sets`
        mode: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PageCached { .. } => "Sync page cached",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Obsolete { .. } => "Sync obsolete",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::ResetCompleted { .. } => "Cache reset completed",
        }
    }
}

// ============================================================================
// Index Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum IndexEvent {
    /// Rows under `parent_key` changed; readers should re-query.
    Changed { domain: String, parent_key: String },
}

impl IndexEvent {
    fn description(&self) -> &str {
        match self {
            IndexEvent::Changed { .. } => "Cached index data changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// * `capacity` - Events buffered per subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
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

/// A `broadcast::Receiver` that skips events rejected by a filter.
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
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(parent_key: &str) -> CoreEvent {
        CoreEvent::Index(IndexEvent::Changed {
            domain: "search_results".to_string(),
            parent_key: parent_key.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(changed("1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Sync(SyncEvent::Started {
            job_id: "job-1".to_string(),
            domain: "media_sets".to_string(),
            source: "cloud".to_string(),
            authority: "com.example.cloud".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter_skips_sync_events() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Index(_)));

        bus.emit(CoreEvent::Sync(SyncEvent::PageCached {
            job_id: "job-1".to_string(),
            page: 1,
            rows_written: 500,
        }))
        .ok();
        bus.emit(changed("7")).ok();

        assert_eq!(stream.recv().await.unwrap(), changed("7"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_try_recv_reports_lag() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for i in 0..5 {
            bus.emit(changed(&i.to_string())).ok();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(_)))));
    }

    #[test]
    fn test_severity_mapping() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            job_id: "j".to_string(),
            message: "provider returned no page".to_string(),
        });
        let obsolete = CoreEvent::Sync(SyncEvent::Obsolete {
            job_id: "j".to_string(),
            reason: "cancelled".to_string(),
        });

        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(obsolete.severity(), EventSeverity::Warning);
        assert_eq!(changed("1").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(changed("42")).unwrap();

        assert_eq!(json["type"], "Index");
        assert_eq!(json["payload"]["event"], "Changed");
        assert_eq!(json["payload"]["parent_key"], "42");
    }
}
