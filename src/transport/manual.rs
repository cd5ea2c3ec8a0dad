//! Offline transport for manual exchange: each outbound unit becomes one
//! base64 line handed to a caller-supplied emitter (console, chat window,
//! clipboard), and lines pasted back from the peer are fed in via
//! [`ManualIo::accept`].

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::broadcast;

use crate::channel::{Channel, ChannelError, Recv, Tag};
use crate::transport::buffered::BufferedIo;

/// A copy/paste adapter bound to a single remote party.
///
/// Clones share the same underlying adapter, so one clone can be handed to a
/// runner while another keeps feeding pasted lines.
#[derive(Debug, Clone)]
pub struct ManualIo {
    io: Arc<BufferedIo>,
}

impl ManualIo {
    /// Creates an adapter bound to `remote`. `emit` is called with one
    /// base64-encoded unit per outbound send.
    pub fn new(remote: usize, emit: impl Fn(String) + Send + 'static) -> ManualIo {
        let (io, mut outbound) = BufferedIo::new(remote);
        tokio::spawn(async move {
            while let Some((tag, data)) = outbound.recv().await {
                let mut unit = Vec::with_capacity(1 + data.len());
                unit.push(tag.as_byte());
                unit.extend_from_slice(&data);
                emit(STANDARD.encode(&unit));
            }
        });
        ManualIo { io }
    }

    /// Feeds one line produced by the remote side's emitter.
    pub fn accept(&self, line: &str) -> Result<(), ChannelError> {
        let unit = STANDARD
            .decode(line.trim())
            .map_err(|err| ChannelError::Transport(format!("invalid base64 unit: {err}")))?;
        self.io.accept_frame(&unit)
    }
}

impl Channel for ManualIo {
    type Recv = Recv;

    fn send_to(&self, to: usize, tag: Tag, data: Vec<u8>) -> Result<(), ChannelError> {
        self.io.send_to(to, tag, data)
    }

    fn recv_from(&self, from: usize, tag: Tag, len: usize) -> Recv {
        self.io.recv_from(from, tag, len)
    }

    fn subscribe_errors(&self) -> Option<broadcast::Receiver<ChannelError>> {
        self.io.subscribe_errors()
    }

    fn close(&self) {
        Channel::close(&*self.io);
    }
}
