//! Bounded ingest queue with drop-oldest overflow.
//!
//! Producers never block: when the queue is full the longest-waiting event is
//! evicted to admit the new one. The single consumer (the dispatcher) waits for
//! an entry with a bounded timeout so it stays responsive to shutdown.
//!
//! # Concurrency
//!
//! - Storage is a lock-free `crossbeam` `ArrayQueue`; `force_push` performs the
//!   eviction atomically with the insertion
//! - A `tokio::sync::Notify` wakes the consumer; a notification sent before the
//!   consumer starts waiting is kept as a permit, so no wakeup is lost
//! - FIFO by insertion order; events may be lost on overflow, never reordered

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::event::Event;

/// Default maximum number of pending events.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Bounded, thread-safe mailbox of pending trigger events.
///
/// # Example
///
/// ```
/// use pulsesync_scheduler::{Event, EventQueue};
/// use tokio::time::Instant;
///
/// let queue = EventQueue::with_capacity(2);
/// let now = Instant::now();
/// assert!(!queue.push(Event::new("bd", now, 1)));
/// assert!(!queue.push(Event::new("hh", now, 2)));
/// // Full: event 1 is evicted to admit event 3.
/// assert!(queue.push(Event::new("sn", now, 3)));
/// assert_eq!(queue.overflow_count(), 1);
/// ```
#[derive(Debug)]
pub struct EventQueue {
    events: ArrayQueue<Event>,
    ready: Notify,
    overflow_count: AtomicU64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_QUEUE_SIZE)
    }

    /// Create a queue holding at most `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: ArrayQueue::new(capacity.max(1)),
            ready: Notify::new(),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Insert an event without blocking.
    ///
    /// Returns `true` when the queue was full and its oldest event was evicted.
    pub fn push(&self, event: Event) -> bool {
        self.push_evicting(event).is_some()
    }

    /// Insert an event without blocking, returning the evicted event if any.
    pub fn push_evicting(&self, event: Event) -> Option<Event> {
        let evicted = self.events.force_push(event);
        if evicted.is_some() {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        evicted
    }

    /// Take the oldest event, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout.
    pub async fn pop(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.events.pop() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return self.events.pop();
            }
        }
    }

    /// Take the oldest event if one is queued.
    #[inline]
    pub fn try_pop(&self) -> Option<Event> {
        self.events.pop()
    }

    /// Number of events currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if no events are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events the queue holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Number of events evicted by overflow since creation.
    #[inline]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Discard every queued event, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.events.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}
