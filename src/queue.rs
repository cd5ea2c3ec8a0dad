//! An append-only byte buffer with asynchronous exact-length reads.
//!
//! [`ByteQueue`] is the primitive underneath every transport adapter: writers
//! push chunks of arbitrary size, readers request an exact number of bytes and
//! suspend until that many have arrived. Reads are served strictly in the
//! order they were requested, never reordered by size, so a multiplexed
//! protocol that assumes in-order delivery per stream stays synchronized.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

const INITIAL_CAPACITY: usize = 1024;

/// The error raised by [`ByteQueue`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been closed; all pending and future operations fail.
    #[error("byte queue is closed")]
    Closed,
}

/// An append-only byte buffer supporting asynchronous exact-length reads.
///
/// Closing is terminal: pending and future reads fail, writes are rejected.
#[derive(Debug)]
pub struct ByteQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    pending: VecDeque<PendingPop>,
    closed: bool,
}

#[derive(Debug)]
struct PendingPop {
    len: usize,
    tx: oneshot::Sender<Result<Vec<u8>, QueueError>>,
}

impl ByteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        ByteQueue {
            inner: Mutex::new(Inner {
                buf: vec![0; INITIAL_CAPACITY],
                start: 0,
                end: 0,
                pending: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Appends `data` and satisfies as many pending reads (oldest first) as
    /// the buffered bytes now allow. Never suspends.
    pub fn push(&self, data: &[u8]) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("byte queue lock poisoned");
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.reserve(data.len());
        let end = inner.end;
        inner.buf[end..end + data.len()].copy_from_slice(data);
        inner.end += data.len();
        inner.resolve_pending();
        inner.compact();
        Ok(())
    }

    /// Requests exactly `len` bytes.
    ///
    /// The read is registered before this method returns, so calls issued in
    /// sequence are served in that sequence: a later, smaller request never
    /// jumps ahead of an earlier, still-unsatisfied one. The returned future
    /// resolves once `len` bytes are available (immediately if they already
    /// are and no earlier read is waiting), or fails once the queue closes.
    pub fn pop(&self, len: usize) -> Pop {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("byte queue lock poisoned");
        if inner.closed {
            let _ = tx.send(Err(QueueError::Closed));
        } else if inner.pending.is_empty() && inner.unread() >= len {
            let data = inner.take(len);
            inner.compact();
            let _ = tx.send(Ok(data));
        } else {
            inner.pending.push_back(PendingPop { len, tx });
        }
        Pop { rx }
    }

    /// Closes the queue. Idempotent; fails every pending read.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("byte queue lock poisoned");
        if inner.closed {
            return;
        }
        inner.closed = true;
        while let Some(pop) = inner.pending.pop_front() {
            let _ = pop.tx.send(Err(QueueError::Closed));
        }
    }

    /// Whether [`close`](ByteQueue::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("byte queue lock poisoned").closed
    }

    /// Number of buffered bytes not yet handed to a read.
    pub fn unread(&self) -> usize {
        self.inner.lock().expect("byte queue lock poisoned").unread()
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        ByteQueue::new()
    }
}

impl Inner {
    fn unread(&self) -> usize {
        self.end - self.start
    }

    /// Grows the buffer (doubling) so that `additional` more bytes fit,
    /// moving the unread region to the front of the new allocation.
    fn reserve(&mut self, additional: usize) {
        let required = self.end + additional;
        if required <= self.buf.len() {
            return;
        }
        let mut new_len = self.buf.len() * 2;
        while new_len < required {
            new_len *= 2;
        }
        let mut new_buf = vec![0; new_len];
        new_buf[..self.unread()].copy_from_slice(&self.buf[self.start..self.end]);
        self.end = self.unread();
        self.start = 0;
        self.buf = new_buf;
    }

    fn take(&mut self, len: usize) -> Vec<u8> {
        let data = self.buf[self.start..self.start + len].to_vec();
        self.start += len;
        data
    }

    /// Completes pending reads in strict FIFO order while enough bytes exist.
    fn resolve_pending(&mut self) {
        while let Some(front) = self.pending.front() {
            if self.unread() < front.len {
                break;
            }
            let pop = self.pending.pop_front().expect("front exists");
            let data = self.take(pop.len);
            let _ = pop.tx.send(Ok(data));
        }
    }

    /// Resets the window when drained, otherwise shifts the unread region to
    /// the front so the start offset cannot grow without bound.
    fn compact(&mut self) {
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        } else if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }
}

/// Future returned by [`ByteQueue::pop`], resolving with exactly the
/// requested number of bytes.
#[derive(Debug)]
pub struct Pop {
    rx: oneshot::Receiver<Result<Vec<u8>, QueueError>>,
}

impl Future for Pop {
    type Output = Result<Vec<u8>, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| match res {
            Ok(res) => res,
            // The queue was dropped with this read still registered.
            Err(_) => Err(QueueError::Closed),
        })
    }
}
