//! Duplex queue for buffering inbound messages
//!
//! Holds messages read off the wire until a `recv` caller takes them. The
//! queue combines a bounded primary region with an unbounded overflow list so
//! the reader task never blocks or drops data when consumers fall behind.

use crate::core::message::Message;
use crate::error::{Result, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Default primary region capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

struct QueueState {
    primary: VecDeque<Message>,
    overflow: VecDeque<Message>,
    closed: bool,
}

impl QueueState {
    fn pop(&mut self) -> Option<Message> {
        // Everything in primary is older than everything in overflow
        self.primary.pop_front().or_else(|| self.overflow.pop_front())
    }

    fn len(&self) -> usize {
        self.primary.len() + self.overflow.len()
    }
}

/// FIFO queue with a bounded primary region and unbounded overflow
///
/// # Ordering
///
/// A message goes to the primary region only while it has room **and** the
/// overflow list is empty; otherwise it is appended to overflow. `take`
/// drains primary before overflow. Together these rules keep delivery order
/// equal to arrival order no matter where a message landed. Both regions sit
/// behind one mutex, so the rule is applied atomically.
///
/// # Example
///
/// ```no_run
/// use rust_duplex_transport::core::{DuplexQueue, Message};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = DuplexQueue::new(2);
///
/// queue.put(Message::new("a"))?;
/// queue.put(Message::new("b"))?;
/// queue.put(Message::new("c"))?; // primary full, lands in overflow
///
/// assert_eq!(queue.stats().overflow, 1);
/// let first = queue.take().await?;
/// assert_eq!(first.body().as_ref(), b"a");
/// # Ok(())
/// # }
/// ```
pub struct DuplexQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Notify,
    enqueued_count: AtomicU64,
    dequeued_count: AtomicU64,
    overflowed_count: AtomicU64,
}

impl DuplexQueue {
    /// Create a queue whose primary region holds `capacity` messages
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                primary: VecDeque::with_capacity(capacity),
                overflow: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
            enqueued_count: AtomicU64::new(0),
            dequeued_count: AtomicU64::new(0),
            overflowed_count: AtomicU64::new(0),
        }
    }

    /// Create a queue with the default capacity
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Insert a message without blocking
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueClosed`] once [`close`](Self::close) has
    /// been called. Never fails for lack of space.
    pub fn put(&self, message: Message) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::QueueClosed);
            }

            if state.overflow.is_empty() && state.primary.len() < self.capacity {
                state.primary.push_back(message);
            } else {
                state.overflow.push_back(message);
                self.overflowed_count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Primary region full ({}), {} message(s) in overflow",
                    self.capacity,
                    state.overflow.len()
                );
            }
        }

        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest message, waiting while the queue is empty
    ///
    /// Messages buffered before [`close`](Self::close) are still handed out.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueClosed`] once the queue is closed and
    /// empty.
    pub async fn take(&self) -> Result<Message> {
        loop {
            // Register interest before inspecting state so a put or close
            // racing with this check still wakes us.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take()? {
                return Ok(message);
            }

            notified.await;
        }
    }

    /// Remove the oldest message if one is buffered
    ///
    /// Returns `Ok(None)` when empty and still open.
    pub fn try_take(&self) -> Result<Option<Message>> {
        let (message, more) = {
            let mut state = self.state.lock();
            match state.pop() {
                Some(message) => (message, state.len() > 0),
                None if state.closed => return Err(TransportError::QueueClosed),
                None => return Ok(None),
            }
        };

        self.dequeued_count.fetch_add(1, Ordering::Relaxed);
        if more {
            // Pass the wakeup on in case another taker is parked
            self.available.notify_one();
        }
        Ok(Some(message))
    }

    /// Stop accepting messages and wake every waiting taker
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Discard all buffered messages, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.len();
        state.primary.clear();
        state.overflow.clear();
        discarded
    }

    /// Check whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of buffered messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Check if no messages are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages currently in the primary region
    #[must_use]
    pub fn primary_len(&self) -> usize {
        self.state.lock().primary.len()
    }

    /// Messages currently in the overflow list
    #[must_use]
    pub fn overflow_len(&self) -> usize {
        self.state.lock().overflow.len()
    }

    /// Primary region capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get queue statistics
    #[must_use]
    pub fn stats(&self) -> DuplexQueueStats {
        let (primary, overflow) = {
            let state = self.state.lock();
            (state.primary.len(), state.overflow.len())
        };

        DuplexQueueStats {
            depth: primary + overflow,
            primary,
            overflow,
            capacity: self.capacity,
            enqueued: self.enqueued_count.load(Ordering::Relaxed),
            dequeued: self.dequeued_count.load(Ordering::Relaxed),
            overflowed: self.overflowed_count.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DuplexQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexQueue")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Statistics for a duplex queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplexQueueStats {
    /// Messages currently buffered
    pub depth: usize,
    /// Messages in the primary region
    pub primary: usize,
    /// Messages in the overflow list
    pub overflow: usize,
    /// Primary region capacity
    pub capacity: usize,
    /// Total messages accepted by `put`
    pub enqueued: u64,
    /// Total messages handed out
    pub dequeued: u64,
    /// Total messages that were routed to overflow
    pub overflowed: u64,
}
