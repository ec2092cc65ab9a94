//! The write-behind engine.
//!
//! [`Spillway`] accepts references to caller-owned byte regions and queues
//! them for background delivery to raw destination handles. `submit` returns
//! as soon as the item is queued; one long-lived worker thread per
//! destination performs the blocking writes in submission order. A region is
//! never queued twice concurrently for the same destination: a second
//! submission with the same token blocks until the first completes. `drain`
//! and `drain_token` let callers wait for delivery before reusing or
//! invalidating source memory; `shutdown` flushes everything and joins the
//! workers.
//!
//! There is no global engine: each `Spillway` is an ordinary value with
//! deterministic teardown, and independent engines never share state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::buffer::{BufferRef, Destination, SourceToken};
use crate::error::{RuntimeError, SpillResult, ValidationError};
use crate::events::{CompletionStream, EventHub, WriteOutcome};
use crate::io;
use crate::state::{DestState, WorkItem};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SpillwayConfig {
    /// Upper bound on the byte count of a single underlying write call.
    pub chunk_size: usize,
    /// Buffer capacity of each completion event stream.
    pub event_stream_capacity: usize,
}

impl Default for SpillwayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            event_stream_capacity: 1024,
        }
    }
}

struct DestEntry {
    state: Arc<DestState>,
    worker: Option<JoinHandle<()>>,
}

/// Asynchronous, deduplicated write-behind engine.
///
/// Dropping the engine performs a full [`shutdown`](Spillway::shutdown).
pub struct Spillway {
    config: SpillwayConfig,
    running: Arc<AtomicBool>,
    destinations: Mutex<HashMap<Destination, DestEntry>>,
    events: Arc<EventHub>,
    // Serializes concurrent shutdown callers so each returns only after the
    // workers are actually joined.
    shutdown_lock: Mutex<()>,
}

impl std::fmt::Debug for Spillway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spillway")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Spillway {
    /// Creates an engine with the given configuration.
    ///
    /// Configuration values are clamped to a minimum of 1.
    #[must_use]
    pub fn new(config: SpillwayConfig) -> Self {
        let config = SpillwayConfig {
            chunk_size: config.chunk_size.max(1),
            event_stream_capacity: config.event_stream_capacity.max(1),
        };
        let events = Arc::new(EventHub::new(config.event_stream_capacity));
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            destinations: Mutex::new(HashMap::new()),
            events,
            shutdown_lock: Mutex::new(()),
        }
    }

    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(SpillwayConfig::default())
    }

    /// Queues a write of `buffer` to `dest` and returns once queued.
    ///
    /// Never blocks on I/O. Blocks only when `buffer`'s token is already
    /// pending on `dest`, until that earlier item fully completes. The same
    /// token may be in flight on different destinations simultaneously.
    /// Zero-length buffers are legal and produce a no-op write.
    ///
    /// The caller must keep the referenced memory valid and unmodified until
    /// the engine signals completion for the token.
    ///
    /// # Errors
    /// [`ValidationError::NullBuffer`] for a null address, and
    /// [`RuntimeError::Stopped`] when the engine has begun shutting down —
    /// including when shutdown overtakes a submission parked in the dedup
    /// wait.
    pub fn submit(&self, buffer: BufferRef, dest: Destination) -> SpillResult<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(RuntimeError::Stopped.into());
        }
        if buffer.addr() == 0 {
            return Err(ValidationError::NullBuffer.into());
        }

        let state = self.state_for(dest);
        let token = buffer.token();

        let mut queue = state.queue.lock().unwrap();
        loop {
            if queue.stopped || !self.running.load(Ordering::Acquire) {
                return Err(RuntimeError::Stopped.into());
            }
            if !queue.pending.contains(&token) {
                break;
            }
            queue = state.done_cv.wait(queue).unwrap();
        }

        queue.pending.insert(token);
        queue.items.push_back(WorkItem {
            token,
            addr: buffer.addr(),
            len: buffer.len(),
        });
        drop(queue);

        state.work_cv.notify_one();
        Ok(())
    }

    /// Blocks until every destination's pending set is empty.
    ///
    /// Covers every item submitted before this call; items submitted
    /// concurrently are not guaranteed to be included.
    pub fn drain(&self) {
        for state in self.snapshot_states() {
            state.wait_empty();
        }
    }

    /// Blocks until `token` is no longer pending on any destination.
    ///
    /// Lets a caller reuse or release one specific region without waiting
    /// for unrelated traffic to flush.
    pub fn drain_token(&self, token: SourceToken) {
        for state in self.snapshot_states() {
            state.wait_token_clear(token);
        }
    }

    /// Flushes all pending work, stops and joins every worker, and clears
    /// the destination registry.
    ///
    /// Idempotent: safe with zero destinations, safe to call repeatedly, and
    /// invoked automatically on drop.
    pub fn shutdown(&self) {
        let _guard = self.shutdown_lock.lock().unwrap();

        self.drain();
        self.running.store(false, Ordering::Release);

        let entries: Vec<DestEntry> = {
            let mut map = self.destinations.lock().unwrap();
            map.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &entries {
            entry.state.request_stop();
        }
        for mut entry in entries {
            if let Some(handle) = entry.worker.take() {
                let _ = handle.join();
            }
        }
    }

    /// Drains and stops a single destination, leaving the rest of the engine
    /// running.
    ///
    /// A later submission to the same handle starts a fresh worker. No-op if
    /// the destination was never seen.
    pub fn close_destination(&self, dest: Destination) {
        let entry = self.destinations.lock().unwrap().remove(&dest);
        let Some(mut entry) = entry else {
            return;
        };

        entry.state.wait_empty();
        entry.state.request_stop();
        if let Some(handle) = entry.worker.take() {
            let _ = handle.join();
        }
    }

    /// Opens a stream of per-item completion events.
    ///
    /// Workers publish without blocking; a stream that falls behind drops
    /// events (counted by [`dropped_events`](Spillway::dropped_events)).
    #[must_use]
    pub fn subscribe(&self) -> CompletionStream {
        self.events.subscribe()
    }

    /// Completion events dropped because a subscriber's stream was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// True until `shutdown` begins.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of destinations with live workers.
    #[must_use]
    pub fn destination_count(&self) -> usize {
        self.destinations.lock().unwrap().len()
    }

    /// Resolves the destination's state, lazily spawning its worker.
    fn state_for(&self, dest: Destination) -> Arc<DestState> {
        let mut map = self.destinations.lock().unwrap();
        if let Some(entry) = map.get(&dest) {
            return Arc::clone(&entry.state);
        }

        let state = Arc::new(DestState::new());
        let worker = self.spawn_worker(dest, Arc::clone(&state));
        map.insert(
            dest,
            DestEntry {
                state: Arc::clone(&state),
                worker: Some(worker),
            },
        );
        state
    }

    fn spawn_worker(&self, dest: Destination, state: Arc<DestState>) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let events = Arc::clone(&self.events);
        let chunk_size = self.config.chunk_size;
        thread::Builder::new()
            .name(format!("spillway-dest-{}", dest.raw()))
            .spawn(move || worker_loop(dest, &state, &running, &events, chunk_size))
            .expect("failed to spawn spillway worker")
    }

    fn snapshot_states(&self) -> Vec<Arc<DestState>> {
        self.destinations
            .lock()
            .unwrap()
            .values()
            .map(|entry| Arc::clone(&entry.state))
            .collect()
    }
}

impl Drop for Spillway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One destination's worker: waits for work, writes items in FIFO order,
/// clears pending tokens, and signals waiters. Exits once the queue is empty
/// and the destination (or engine) is stopping.
fn worker_loop(
    dest: Destination,
    state: &DestState,
    running: &AtomicBool,
    events: &EventHub,
    chunk_size: usize,
) {
    debug!(dest = dest.raw(), "worker started");

    loop {
        let item = {
            let mut queue = state.queue.lock().unwrap();
            loop {
                // Remaining items are always written, even mid-shutdown.
                if let Some(item) = queue.items.pop_front() {
                    break item;
                }
                if queue.stopped || !running.load(Ordering::Acquire) {
                    debug!(dest = dest.raw(), "worker exiting");
                    return;
                }
                queue = state.work_cv.wait(queue).unwrap();
            }
        };

        // Write outside the lock so the dispatcher is never blocked by an
        // in-progress write.
        let result = io::write_region(dest, item.addr, item.len, chunk_size);
        let outcome = match result.error {
            None => {
                trace!(
                    dest = dest.raw(),
                    token = %item.token,
                    bytes = result.bytes_written,
                    "item written"
                );
                WriteOutcome::Completed
            }
            Some(err) => {
                warn!(
                    dest = dest.raw(),
                    token = %item.token,
                    written = result.bytes_written,
                    requested = item.len,
                    error = %err,
                    "write failed; item truncated"
                );
                WriteOutcome::Failed {
                    errno: err.raw_os_error(),
                    message: err.to_string(),
                }
            }
        };

        {
            let mut queue = state.queue.lock().unwrap();
            queue.pending.remove(&item.token);
        }
        // Broadcast: drain callers and dedup waiters may both be parked.
        state.done_cv.notify_all();
        state.work_cv.notify_all();

        events.publish(
            item.token,
            dest,
            item.len,
            result.bytes_written,
            outcome,
        );
    }
}
