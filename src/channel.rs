//! The party I/O contract: channel tags, per-tag byte queues and the
//! [`Channel`] trait used to exchange protocol bytes with other parties.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::queue::{ByteQueue, Pop, QueueError};

/// Discriminator for the independent logical byte-streams multiplexed over
/// one transport between the same pair of parties.
///
/// [`Tag::A`] and [`Tag::B`] carry the engine's two protocol sub-streams;
/// [`Tag::Diag`] is reserved for pre-flight probes so diagnostics can never
/// corrupt protocol channel state. Bytes within one `(party, tag)` stream are
/// delivered in write order; across tags there is no ordering guarantee,
/// which is what keeps one stream's backlog from blocking another's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// First protocol sub-stream (wire byte `a`).
    A,
    /// Second protocol sub-stream (wire byte `b`).
    B,
    /// Diagnostics sub-stream (wire byte `d`), used by pre-flight probes.
    Diag,
}

impl Tag {
    /// Every tag, in wire-byte order.
    pub const ALL: [Tag; 3] = [Tag::A, Tag::B, Tag::Diag];

    /// The byte identifying this tag on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            Tag::A => b'a',
            Tag::B => b'b',
            Tag::Diag => b'd',
        }
    }

    /// Parses a wire byte back into a tag.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        match byte {
            b'a' => Some(Tag::A),
            b'b' => Some(Tag::B),
            b'd' => Some(Tag::Diag),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Tag::A => 0,
            Tag::B => 1,
            Tag::Diag => 2,
        }
    }
}

/// Errors raised by [`Channel`] operations and transport adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel (or one of its queues) has been closed.
    #[error("channel is closed")]
    Closed,
    /// The party index does not address the peer this channel is bound to.
    #[error("unexpected party {actual}, this channel is bound to party {expected}")]
    UnexpectedParty {
        /// The party index passed by the caller.
        actual: usize,
        /// The remote party this channel is bound to.
        expected: usize,
    },
    /// The party index is out of range or addresses the local party itself.
    #[error("party {party} cannot be addressed in a computation of size {size}")]
    InvalidParty {
        /// The party index passed by the caller.
        party: usize,
        /// The number of participants.
        size: usize,
    },
    /// An inbound transport unit carried an unrecognized tag byte.
    #[error("unrecognized channel tag byte {0:#04x}")]
    UnknownTag(u8),
    /// The underlying transport reported a failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<QueueError> for ChannelError {
    fn from(_: QueueError) -> Self {
        ChannelError::Closed
    }
}

/// One [`ByteQueue`] per [`Tag`]: the inbound side of a transport adapter.
///
/// A set lives exactly as long as its adapter; closing the set closes every
/// queue in it.
#[derive(Debug, Default)]
pub struct ChannelSet {
    queues: [ByteQueue; 3],
}

impl ChannelSet {
    /// Creates a set with one empty queue per tag.
    pub fn new() -> Self {
        ChannelSet::default()
    }

    /// The queue backing `tag`.
    pub fn queue(&self, tag: Tag) -> &ByteQueue {
        &self.queues[tag.index()]
    }

    /// Appends `data` to the queue for `tag`.
    pub fn push(&self, tag: Tag, data: &[u8]) -> Result<(), QueueError> {
        self.queue(tag).push(data)
    }

    /// Requests exactly `len` bytes from the queue for `tag`.
    pub fn pop(&self, tag: Tag, len: usize) -> Pop {
        self.queue(tag).pop(len)
    }

    /// Closes every queue in the set. Idempotent.
    pub fn close(&self) {
        for queue in &self.queues {
            queue.close();
        }
    }
}

/// The I/O contract consumed by the engine runner and implemented by the
/// transport adapters.
///
/// `send_to` and `recv_from` are the required core operations. Error
/// observation and closing are optional capabilities with no-op defaults, so
/// whether an implementation offers them is decided where the contract is
/// composed, not probed at call time.
pub trait Channel: Send + Sync + 'static {
    /// The future returned by [`recv_from`](Channel::recv_from).
    type Recv: Future<Output = Result<Vec<u8>, ChannelError>> + Send + 'static;

    /// Sends `data` to party `to` on the stream identified by `tag`.
    /// Fire-and-forget: never suspends the caller.
    fn send_to(&self, to: usize, tag: Tag, data: Vec<u8>) -> Result<(), ChannelError>;

    /// Requests exactly `len` bytes from party `from` on `tag`.
    ///
    /// The read must be registered when this method is called (not when the
    /// future is first polled), so requests issued in sequence are served in
    /// that sequence.
    fn recv_from(&self, from: usize, tag: Tag, len: usize) -> Self::Recv;

    /// Optional capability: asynchronous transport-failure notifications,
    /// reported independently of any pending read.
    fn subscribe_errors(&self) -> Option<broadcast::Receiver<ChannelError>> {
        None
    }

    /// Optional capability: closes the channel and its underlying transport.
    /// Idempotent; the default does nothing.
    fn close(&self) {}
}

impl<C: Channel> Channel for Arc<C> {
    type Recv = C::Recv;

    fn send_to(&self, to: usize, tag: Tag, data: Vec<u8>) -> Result<(), ChannelError> {
        (**self).send_to(to, tag, data)
    }

    fn recv_from(&self, from: usize, tag: Tag, len: usize) -> Self::Recv {
        (**self).recv_from(from, tag, len)
    }

    fn subscribe_errors(&self) -> Option<broadcast::Receiver<ChannelError>> {
        (**self).subscribe_errors()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Future returned by [`Channel::recv_from`] implementations that are backed
/// by a [`ByteQueue`]: either an already-known failure or a pending pop.
#[derive(Debug)]
pub struct Recv(RecvState);

#[derive(Debug)]
enum RecvState {
    Failed(Option<ChannelError>),
    Pop(Pop),
}

impl Recv {
    /// A receive that fails with `err` on first poll.
    pub fn failed(err: ChannelError) -> Self {
        Recv(RecvState::Failed(Some(err)))
    }
}

impl From<Pop> for Recv {
    fn from(pop: Pop) -> Self {
        Recv(RecvState::Pop(pop))
    }
}

impl Future for Recv {
    type Output = Result<Vec<u8>, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.0 {
            RecvState::Failed(err) => {
                let err = err.take().expect("recv future polled after completion");
                Poll::Ready(Err(err))
            }
            RecvState::Pop(pop) => Pin::new(pop)
                .poll(cx)
                .map(|res| res.map_err(ChannelError::from)),
        }
    }
}
