//! Bounded, closable, thread-safe FIFO queue.
//!
//! Every hand-off between pipeline stages goes through one of these. The bounded capacity is the backpressure
//! mechanism: a producer that outruns its consumer blocks in [`BoundedClosableQueue::put`] until space frees or its
//! timeout passes.
//!
//! Closing is one-way. A closed queue rejects new items but keeps handing out the ones it already holds, so consumers
//! drain it before they observe [`TakeError::Closed`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Errors constructing a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
}

/// A rejected `put`. The item is handed back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum PutError<T> {
    Timeout(T),
    Closed(T),
}

impl<T> std::fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PutError::Timeout(_) => write!(f, "timed out waiting for queue space"),
            PutError::Closed(_) => write!(f, "queue is closed"),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for PutError<T> {}

impl<T> PutError<T> {
    /// Recovers the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Timeout(item) | PutError::Closed(item) => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PutError::Closed(_))
    }
}

/// A `take` that produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TakeError {
    #[error("timed out waiting for an item")]
    Timeout,

    #[error("queue is closed and drained")]
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer multi-consumer queue with timeouts and one-way close.
pub struct BoundedClosableQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedClosableQueue<T> {
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues `item`, waiting up to `timeout` for space.
    ///
    /// Fails with [`PutError::Closed`] if the queue is closed on entry or becomes closed while waiting.
    pub fn put(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PutError::Closed(item));
            }
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            if self.not_full.wait_until(&mut state, deadline).timed_out() {
                // one last look: space may have freed right at the deadline
                if !state.closed && state.items.len() < self.capacity {
                    continue;
                }
                return Err(if state.closed {
                    PutError::Closed(item)
                } else {
                    PutError::Timeout(item)
                });
            }
        }
    }

    /// Dequeues the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// A closed queue still yields its remaining items. Once it is closed and empty every call returns
    /// [`TakeError::Closed`] immediately.
    pub fn take(&self, timeout: Duration) -> Result<T, TakeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(TakeError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(item);
                }
                return Err(if state.closed {
                    TakeError::Closed
                } else {
                    TakeError::Timeout
                });
            }
        }
    }

    /// Dequeues without waiting.
    pub fn try_take(&self) -> Result<T, TakeError> {
        self.take(Duration::ZERO)
    }

    /// Stops admission and wakes every blocked producer and consumer. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for BoundedClosableQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedClosableQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
