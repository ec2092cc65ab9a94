//! Per-item completion reporting.
//!
//! Write failures do not propagate to the submitting caller: a hard error
//! truncates the item and the worker moves on. Subscribing to completion
//! events is how a caller observes per-item outcomes, including those
//! truncations. Workers publish with a non-blocking send and never stall on
//! a slow subscriber; overflowing streams drop events and the engine counts
//! the drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use uuid::Uuid;

use crate::buffer::{Destination, SourceToken};
use crate::error::{RuntimeError, SpillResult};

/// Unique identifier for a completion event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// How a work item's write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every byte of the item was delivered.
    Completed,
    /// The OS reported a hard error; the remainder of the item was not
    /// written and no retry was attempted.
    Failed {
        /// Raw OS error code, when one was available.
        errno: Option<i32>,
        /// Human-readable error description.
        message: String,
    },
}

impl WriteOutcome {
    /// Returns true if the item was fully delivered.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One completed (or truncated) work item.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// Engine-wide monotonically increasing completion counter.
    pub sequence: u64,
    /// Token of the source region; the region is safe to reuse once this
    /// event is observed.
    pub token: SourceToken,
    /// Destination the item was written to.
    pub destination: Destination,
    /// Length requested at submission.
    pub requested: usize,
    /// Bytes actually delivered.
    pub bytes_written: usize,
    /// Completion or truncation.
    pub outcome: WriteOutcome,
    /// When the worker finished the item.
    pub timestamp: DateTime<Utc>,
}

/// Fan-out registry the workers publish into.
#[derive(Debug)]
pub(crate) struct EventHub {
    subscribers: Mutex<HashMap<SubscriptionId, Sender<CompletionEvent>>>,
    sequence: AtomicU64,
    dropped: AtomicU64,
    stream_capacity: usize,
}

impl EventHub {
    pub(crate) fn new(stream_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            stream_capacity: stream_capacity.max(1),
        }
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> CompletionStream {
        let (tx, rx) = bounded::<CompletionEvent>(self.stream_capacity);
        let id = SubscriptionId::new();
        self.subscribers.lock().unwrap().insert(id, tx);
        CompletionStream {
            id,
            rx,
            hub: Arc::clone(self),
            unsubscribed: AtomicBool::new(false),
        }
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    /// Publishes one completion to every live subscriber.
    ///
    /// Never blocks: a full stream drops the event for that subscriber, a
    /// disconnected stream is pruned.
    pub(crate) fn publish(
        &self,
        token: SourceToken,
        destination: Destination,
        requested: usize,
        bytes_written: usize,
        outcome: WriteOutcome,
    ) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let event = CompletionEvent {
            sequence,
            token,
            destination,
            requested,
            bytes_written,
            outcome,
            timestamp: Utc::now(),
        };

        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|_, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A subscription stream for completion events.
///
/// Dropping the stream unregisters it.
#[derive(Debug)]
pub struct CompletionStream {
    id: SubscriptionId,
    rx: Receiver<CompletionEvent>,
    hub: Arc<EventHub>,
    unsubscribed: AtomicBool,
}

impl CompletionStream {
    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicit unregistration. Idempotent; events already buffered remain
    /// receivable until the stream is dropped.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.hub.unsubscribe(self.id);
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// Returns [`RuntimeError::Disconnected`] once the stream has been
    /// unsubscribed and its buffer is exhausted.
    pub fn recv(&self) -> SpillResult<CompletionEvent> {
        self.rx.recv().map_err(|_| {
            RuntimeError::Disconnected {
                path: "completion_stream".to_string(),
            }
            .into()
        })
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// Returns [`RuntimeError::Timeout`] if no event arrives in time, or
    /// [`RuntimeError::Disconnected`] once the stream has been unsubscribed
    /// and its buffer is exhausted.
    pub fn recv_timeout(&self, timeout: Duration) -> SpillResult<CompletionEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => RuntimeError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }
            .into(),
            RecvTimeoutError::Disconnected => RuntimeError::Disconnected {
                path: "completion_stream".to_string(),
            }
            .into(),
        })
    }

    /// Non-blocking receive.
    #[must_use]
    pub fn try_recv(&self) -> Option<CompletionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        if !self.unsubscribed.swap(true, Ordering::AcqRel) {
            self.hub.unsubscribe(self.id);
        }
    }
}
