//! Shared application state for the monitoring server.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::broadcast;

use factory::core::events::EventRingBuffer;
use factory::core::types::RunEvent;
use factory::io::store::RunPaths;

struct StreamState {
    ring: StdMutex<EventRingBuffer>,
    event_tx: broadcast::Sender<RunEvent>,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Paths inside the run directory being monitored.
    pub paths: RunPaths,
    stream: Arc<StreamState>,
}

impl AppState {
    pub fn new(run_dir: PathBuf, buffer_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            paths: RunPaths::new(run_dir),
            stream: Arc::new(StreamState {
                ring: StdMutex::new(EventRingBuffer::new(buffer_capacity)),
                event_tx,
            }),
        }
    }

    /// Buffer an event and fan it out to live subscribers.
    ///
    /// Push and broadcast happen under the ring lock so a subscriber that
    /// snapshots under the same lock sees neither gaps nor duplicates.
    pub fn publish(&self, event: RunEvent) {
        let mut ring = self.lock_ring();
        ring.push(event.clone());
        let _ = self.stream.event_tx.send(event);
    }

    /// Subscribe for live events and snapshot retained history atomically
    /// with respect to [`AppState::publish`].
    pub fn subscribe_with_replay(&self) -> (Vec<RunEvent>, broadcast::Receiver<RunEvent>) {
        let ring = self.lock_ring();
        let rx = self.stream.event_tx.subscribe();
        (ring.snapshot(), rx)
    }

    fn lock_ring(&self) -> MutexGuard<'_, EventRingBuffer> {
        self.stream
            .ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
