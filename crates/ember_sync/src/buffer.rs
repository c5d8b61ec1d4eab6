//! # Update Buffer
//!
//! Hand-off queue between the network receive task and the fixed-step loop.
//!
//! ```text
//! Network task:   push ─┐  push ─┐        push ─┐
//!                       ▼        ▼              ▼
//! Buffer:         [d51] [d51 d52]  (drained)  [d53]
//!                                   │
//! Fixed step:                     drain → apply d51, d52
//! ```
//!
//! ## Guarantees
//!
//! - Items come out in push order
//! - A drain takes everything under a single lock, so a concurrent push
//!   lands either entirely before or entirely after it
//! - `push` never blocks on the consumer; at capacity the oldest item goes
//! - `drain` never waits for the producer; it may return nothing

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::config::BufferConfig;

/// Result of a [`UpdateBuffer::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// Stored without evicting anything.
    Stored,
    /// Stored; the oldest unconsumed item was evicted to make room.
    Evicted(T),
    /// The buffer is closed; the item was not stored.
    Rejected(T),
}

/// Buffer counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Items accepted by `push`.
    pub pushed: u64,
    /// Items evicted at capacity.
    pub evicted: u64,
    /// Items refused while closed.
    pub rejected: u64,
    /// Items handed to the consumer.
    pub drained: u64,
    /// Items discarded by `clear` / `close`.
    pub cleared: u64,
}

struct BufferInner<T> {
    items: VecDeque<T>,
    closed: bool,
    stats: BufferStats,
}

/// Bounded, thread-safe FIFO with drop-oldest overflow.
pub struct UpdateBuffer<T> {
    inner: Mutex<BufferInner<T>>,
    capacity: usize,
    max_batch: usize,
}

impl<T> UpdateBuffer<T> {
    /// Creates a buffer. Zero values are raised to 1.
    #[must_use]
    pub fn new(capacity: usize, max_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(BufferInner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                stats: BufferStats::default(),
            }),
            capacity,
            max_batch: max_batch.max(1),
        }
    }

    /// Creates a buffer from configuration. Without a batch limit a bounded
    /// drain takes up to the whole capacity.
    #[must_use]
    pub fn from_config(config: &BufferConfig) -> Self {
        Self::new(config.capacity, config.max_batch.unwrap_or(config.capacity))
    }

    /// Appends an item at the tail.
    ///
    /// At capacity the oldest item is evicted and returned. A closed buffer
    /// hands the item straight back.
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            inner.stats.rejected += 1;
            return PushOutcome::Rejected(item);
        }
        let evicted = if inner.items.len() >= self.capacity {
            inner.stats.evicted += 1;
            inner.items.pop_front()
        } else {
            None
        };
        inner.items.push_back(item);
        inner.stats.pushed += 1;
        match evicted {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Stored,
        }
    }

    /// Removes and returns every buffered item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        let items: Vec<T> = inner.items.drain(..).collect();
        inner.stats.drained += items.len() as u64;
        items
    }

    /// Removes and returns at most `max_batch` of the oldest items.
    ///
    /// Anything beyond the batch stays for the next call.
    pub fn drain_batch(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        let take = inner.items.len().min(self.max_batch);
        let items: Vec<T> = inner.items.drain(..take).collect();
        inner.stats.drained += items.len() as u64;
        items
    }

    /// Discards every buffered item. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::clear_locked(&mut inner)
    }

    /// Discards every buffered item and refuses further pushes.
    ///
    /// Both happen under one lock: no push can slip in between.
    pub fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        Self::clear_locked(&mut inner)
    }

    /// Accepts pushes again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.inner.lock().closed = false;
    }

    fn clear_locked(inner: &mut BufferInner<T>) -> usize {
        let count = inner.items.len();
        inner.items.clear();
        inner.stats.cleared += count as u64;
        count
    }

    /// Returns true if pushes are being refused.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns the number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the configured batch size for [`drain_batch`](Self::drain_batch).
    #[must_use]
    pub const fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Returns a copy of the counters.
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        self.inner.lock().stats
    }
}

impl<T> Default for UpdateBuffer<T> {
    fn default() -> Self {
        Self::from_config(&BufferConfig::default())
    }
}
