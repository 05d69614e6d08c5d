use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::models::error::RingBufferError;

/// How long a ring buffer transfer may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Block until space or data exists, or the buffer is closed.
    Infinite,
    /// Poll once without blocking.
    NonBlocking,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::After(d) => Some(Instant::now() + d),
            _ => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::NonBlocking
        } else {
            Self::After(d)
        }
    }
}

#[derive(Debug)]
struct RingState {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    closed: bool,
}

/// Bounded byte FIFO linking two pipeline stages.
///
/// One producer pushes and one consumer pops; both block with a timeout
/// instead of dropping data. A push into a full buffer waits for the
/// consumer, which is the backpressure between stages. Transfers may be
/// partial: `push` stores as much as fits, `pop` returns what is buffered,
/// and the caller retries for the remainder.
///
/// Share between threads as `Arc<RingBuffer>`; all methods take `&self`.
#[derive(Debug)]
pub struct RingBuffer {
    state: Mutex<RingState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            state: Mutex::new(RingState {
                buffer: vec![0; capacity],
                write_index: 0,
                read_index: 0,
                available: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    /// Copy up to `data.len()` bytes in, returning how many were stored.
    ///
    /// Blocks while the buffer is full. Returns `TimedOut` if no space
    /// appeared within `timeout`, `Closed` once the buffer is closed.
    pub fn push(&self, data: &[u8], timeout: Timeout) -> Result<usize, RingBufferError> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let capacity = self.capacity;
        Self::wait_until_ready(&self.writable, &mut state, timeout, |s| {
            if s.closed {
                Err(RingBufferError::Closed)
            } else {
                Ok(s.available < capacity)
            }
        })?;

        let count = data.len().min(capacity - state.available);
        let first = count.min(capacity - state.write_index);
        let start = state.write_index;
        state.buffer[start..start + first].copy_from_slice(&data[..first]);
        state.buffer[..count - first].copy_from_slice(&data[first..count]);
        state.write_index = (start + count) % capacity;
        state.available += count;
        drop(state);

        self.readable.notify_one();
        Ok(count)
    }

    /// Move up to `out.len()` buffered bytes into `out`, returning the count.
    ///
    /// Blocks while the buffer is empty. A closed buffer still yields its
    /// remaining bytes; `Closed` is returned only once it is drained.
    pub fn pop_into(&self, out: &mut [u8], timeout: Timeout) -> Result<usize, RingBufferError> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        Self::wait_until_ready(&self.readable, &mut state, timeout, |s| {
            if s.available > 0 {
                Ok(true)
            } else if s.closed {
                Err(RingBufferError::Closed)
            } else {
                Ok(false)
            }
        })?;

        let capacity = self.capacity;
        let count = out.len().min(state.available);
        let first = count.min(capacity - state.read_index);
        let start = state.read_index;
        out[..first].copy_from_slice(&state.buffer[start..start + first]);
        out[first..count].copy_from_slice(&state.buffer[..count - first]);
        state.read_index = (start + count) % capacity;
        state.available -= count;
        drop(state);

        self.writable.notify_one();
        Ok(count)
    }

    /// Pop up to `max_bytes` into a new vector.
    pub fn pop(&self, max_bytes: usize, timeout: Timeout) -> Result<Vec<u8>, RingBufferError> {
        let mut out = vec![0; max_bytes];
        let count = self.pop_into(&mut out, timeout)?;
        out.truncate(count);
        Ok(out)
    }

    /// Close the buffer and wake every blocked caller.
    ///
    /// Later pushes fail with `Closed`; pops drain what is left first.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait on `cond` until `ready` reports true, the deadline passes, or
    /// `ready` reports an error.
    fn wait_until_ready<F>(
        cond: &Condvar,
        state: &mut MutexGuard<'_, RingState>,
        timeout: Timeout,
        ready: F,
    ) -> Result<(), RingBufferError>
    where
        F: Fn(&RingState) -> Result<bool, RingBufferError>,
    {
        let deadline = timeout.deadline();
        loop {
            if ready(state)? {
                return Ok(());
            }
            match (timeout, deadline) {
                (Timeout::NonBlocking, _) => return Err(RingBufferError::TimedOut),
                (_, Some(deadline)) => {
                    if cond.wait_until(state, deadline).timed_out() {
                        return match ready(state)? {
                            true => Ok(()),
                            false => Err(RingBufferError::TimedOut),
                        };
                    }
                }
                _ => cond.wait(state),
            }
        }
    }
}
