//! Direct socket transport: one TCP connection to a single fixed peer.
//!
//! TCP delivers an undifferentiated byte stream, so outbound frames carry
//! explicit demultiplexing information: a tag byte, a big-endian `u32`
//! payload length, then the payload.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{Channel, ChannelError, Tag};
use crate::transport::buffered::{BufferedIo, Frame};

/// Connects to `addr` and returns an adapter bound to `remote`.
pub async fn connect(addr: impl ToSocketAddrs, remote: usize) -> io::Result<Arc<BufferedIo>> {
    let stream = TcpStream::connect(addr).await?;
    Ok(from_stream(stream, remote))
}

/// Wraps an already-established connection (e.g. an accepted socket) in an
/// adapter bound to `remote`. Spawns the reader and writer tasks.
pub fn from_stream(stream: TcpStream, remote: usize) -> Arc<BufferedIo> {
    let (read_half, write_half) = stream.into_split();
    let (io, outbound) = BufferedIo::new(remote);
    tokio::spawn(write_frames(write_half, outbound));
    tokio::spawn(read_frames(read_half, Arc::clone(&io)));
    io
}

async fn write_frames(mut write_half: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Frame>) {
    while let Some((tag, data)) = outbound.recv().await {
        let mut frame = Vec::with_capacity(1 + 4 + data.len());
        frame.push(tag.as_byte());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(&data);
        if let Err(err) = write_half.write_all(&frame).await {
            debug!(%err, "tcp write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_frames(mut read_half: OwnedReadHalf, io: Arc<BufferedIo>) {
    loop {
        let tag_byte = match read_half.read_u8().await {
            Ok(byte) => byte,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                // Clean disconnection: close the queues so pending reads fail.
                io.close();
                return;
            }
            Err(err) => {
                io.fail(ChannelError::Transport(format!("tcp read failed: {err}")));
                return;
            }
        };
        let result = async {
            let len = read_half.read_u32().await? as usize;
            let mut payload = vec![0; len];
            read_half.read_exact(&mut payload).await?;
            Ok::<_, io::Error>(payload)
        }
        .await;
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                io.fail(ChannelError::Transport(format!("tcp read failed: {err}")));
                return;
            }
        };
        let accepted = match Tag::from_byte(tag_byte) {
            Some(tag) => io.accept(tag, &payload),
            None => Err(ChannelError::UnknownTag(tag_byte)),
        };
        if let Err(err) = accepted {
            io.fail(err);
            return;
        }
    }
}
