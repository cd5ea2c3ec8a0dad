//! The generic point-to-point adapter core: per-tag inbound queues bound to
//! an outbound frame stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};

use crate::channel::{Channel, ChannelError, ChannelSet, Recv, Tag};

/// One outbound transport unit: the tag plus its payload.
pub type Frame = (Tag, Vec<u8>);

/// Binds a [`ChannelSet`] to a single remote party over one transport.
///
/// Inbound units (leading tag byte, then payload) are fed in with
/// [`accept_frame`](BufferedIo::accept_frame); outbound sends surface on the
/// frame receiver returned by [`new`](BufferedIo::new), which the concrete
/// transport's writer drains. Dropping that receiver-draining writer, or
/// calling [`close`](Channel::close), is the single point where the
/// underlying transport gets shut down, so a bound transport is never closed
/// twice.
#[derive(Debug)]
pub struct BufferedIo {
    remote: usize,
    set: ChannelSet,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    errors: broadcast::Sender<ChannelError>,
    closed: AtomicBool,
}

impl BufferedIo {
    /// Creates an adapter bound to the remote party `remote`.
    ///
    /// Returns the adapter and the outbound frame stream; the transport
    /// writer must drain the stream and push each frame onto the wire. The
    /// stream ends when the adapter is closed.
    pub fn new(remote: usize) -> (Arc<BufferedIo>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (errors, _) = broadcast::channel(16);
        let io = Arc::new(BufferedIo {
            remote,
            set: ChannelSet::new(),
            outbound: Mutex::new(Some(tx)),
            errors,
            closed: AtomicBool::new(false),
        });
        (io, rx)
    }

    /// The remote party this adapter is bound to.
    pub fn remote(&self) -> usize {
        self.remote
    }

    /// Feeds one inbound transport unit: a leading tag byte followed by the
    /// payload. An empty unit or an unrecognized tag byte is an adapter
    /// error, never silently dropped.
    pub fn accept_frame(&self, unit: &[u8]) -> Result<(), ChannelError> {
        let Some((&tag_byte, payload)) = unit.split_first() else {
            return Err(ChannelError::Transport("empty transport unit".into()));
        };
        let Some(tag) = Tag::from_byte(tag_byte) else {
            return Err(ChannelError::UnknownTag(tag_byte));
        };
        self.accept(tag, payload)
    }

    /// Feeds payload bytes for an already-demultiplexed tag.
    pub fn accept(&self, tag: Tag, data: &[u8]) -> Result<(), ChannelError> {
        self.set.push(tag, data)?;
        Ok(())
    }

    /// Reports an asynchronous transport failure to subscribers and closes
    /// the adapter, failing every pending read.
    pub fn fail(&self, err: ChannelError) {
        let _ = self.errors.send(err);
        self.close_inner();
    }

    fn close_inner(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender ends the outbound stream; the transport writer
        // observes it and shuts the connection down exactly once.
        self.outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
        self.set.close();
    }
}

impl Channel for BufferedIo {
    type Recv = Recv;

    fn send_to(&self, to: usize, tag: Tag, data: Vec<u8>) -> Result<(), ChannelError> {
        if to != self.remote {
            return Err(ChannelError::UnexpectedParty {
                actual: to,
                expected: self.remote,
            });
        }
        let outbound = self.outbound.lock().expect("outbound lock poisoned");
        match outbound.as_ref() {
            Some(tx) => tx.send((tag, data)).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    fn recv_from(&self, from: usize, tag: Tag, len: usize) -> Recv {
        if from != self.remote {
            return Recv::failed(ChannelError::UnexpectedParty {
                actual: from,
                expected: self.remote,
            });
        }
        Recv::from(self.set.pop(tag, len))
    }

    fn subscribe_errors(&self) -> Option<broadcast::Receiver<ChannelError>> {
        Some(self.errors.subscribe())
    }

    fn close(&self) {
        self.close_inner();
    }
}
