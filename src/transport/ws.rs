//! WebSocket transport, used for direct endpoints and as the client leg of
//! the pairing relay.
//!
//! WebSocket messages are already framed, so each binary message is one
//! transport unit: a leading tag byte followed by the payload.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::channel::{Channel, ChannelError};
use crate::transport::buffered::BufferedIo;

/// Connects to a WebSocket endpoint (for a relay: the relay URL with the
/// pairing identifier as its path) and returns an adapter bound to `remote`.
pub async fn connect(url: &str, remote: usize) -> Result<Arc<BufferedIo>, WsError> {
    let (stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut source) = stream.split();
    let (io, mut outbound) = BufferedIo::new(remote);

    tokio::spawn({
        let io = Arc::clone(&io);
        async move {
            while let Some((tag, data)) = outbound.recv().await {
                let mut unit = Vec::with_capacity(1 + data.len());
                unit.push(tag.as_byte());
                unit.extend_from_slice(&data);
                if let Err(err) = sink.send(Message::Binary(unit)).await {
                    io.fail(ChannelError::Transport(format!("websocket send failed: {err}")));
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        }
    });

    tokio::spawn({
        let io = Arc::clone(&io);
        async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Binary(unit)) => {
                        if let Err(err) = io.accept_frame(&unit) {
                            io.fail(err);
                            return;
                        }
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "websocket closed by peer");
                        io.close();
                        return;
                    }
                    Ok(other) => {
                        io.fail(ChannelError::Transport(format!(
                            "unexpected websocket message: {other:?}"
                        )));
                        return;
                    }
                    Err(err) => {
                        io.fail(ChannelError::Transport(format!(
                            "websocket receive failed: {err}"
                        )));
                        return;
                    }
                }
            }
            io.close();
        }
    });

    Ok(io)
}
