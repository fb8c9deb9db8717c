//! Bounded event buffering with replay-then-live delivery.
//!
//! The agent loop can outpace consumers; the ring buffer makes the system
//! favor availability and recency over completeness under overload. Pushes
//! are synchronous, O(1), and never block the producer. Once the buffer is
//! full, each push evicts exactly one oldest event (FIFO eviction).

use std::sync::Mutex;

use tracing::debug;

use crate::core::types::RunEvent;

/// Fixed-capacity circular buffer of run events.
#[derive(Debug)]
pub struct EventRingBuffer {
    buf: Vec<Option<RunEvent>>,
    head: usize,
    count: usize,
}

impl EventRingBuffer {
    /// Create a buffer retaining at most `capacity` events.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring buffer capacity must be >= 1");
        Self {
            buf: vec![None; capacity],
            head: 0,
            count: 0,
        }
    }

    /// Append an event, overwriting the oldest entry when full.
    pub fn push(&mut self, event: RunEvent) {
        self.buf[self.head] = Some(event);
        self.head = (self.head + 1) % self.buf.len();
        if self.count < self.buf.len() {
            self.count += 1;
        }
    }

    /// All retained events in chronological order.
    pub fn snapshot(&self) -> Vec<RunEvent> {
        let capacity = self.buf.len();
        let mut out = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let idx = (self.head + capacity - self.count + i) % capacity;
            if let Some(event) = &self.buf[idx] {
                out.push(event.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Deliver the buffer's current snapshot to `listener`, then hand the
/// listener back for live registration.
///
/// A late subscriber sees a gap-free (possibly truncated-from-the-start)
/// view of history followed by everything new, provided the caller registers
/// the returned listener before the next push.
pub fn with_replay<F>(buffer: &EventRingBuffer, mut listener: F) -> F
where
    F: FnMut(&RunEvent),
{
    for event in buffer.snapshot() {
        listener(&event);
    }
    listener
}

type Listener = Box<dyn FnMut(&RunEvent) + Send>;

struct BusInner {
    ring: EventRingBuffer,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Couples a ring buffer with a listener registry.
///
/// `emit` buffers the event and fans it out synchronously; `subscribe`
/// replays the retained history to the new listener before it starts
/// receiving live events. Both run under one lock, so a subscriber can never
/// observe a gap between replay and live delivery.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                ring: EventRingBuffer::new(capacity),
                listeners: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Buffer and deliver an event to every registered listener.
    pub fn emit(&self, event: RunEvent) {
        let mut inner = self.lock();
        inner.ring.push(event.clone());
        for (_, listener) in &mut inner.listeners {
            listener(&event);
        }
    }

    /// Register a listener, replaying retained history first.
    ///
    /// Returns a subscription id for [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&self, mut listener: F) -> u64
    where
        F: FnMut(&RunEvent) + Send + 'static,
    {
        let mut inner = self.lock();
        for event in inner.ring.snapshot() {
            listener(&event);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Box::new(listener)));
        debug!(subscription = id, "event listener registered");
        id
    }

    /// Remove a listener. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    /// Snapshot of the retained history.
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.lock().ring.snapshot()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        // Listeners run under this lock and must not panic; recover the
        // state if one did rather than wedging every later caller.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
