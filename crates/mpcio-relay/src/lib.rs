//! A rendezvous relay that pairs exactly two WebSocket connections sharing a
//! pairing identifier and forwards messages between them.
//!
//! The identifier is embedded in the request path (`ws://host:port/<id>`).
//! The first connection under an identifier is held open; anything it sends
//! is buffered (up to a cap) until the second connection registers, then
//! flushed and forwarded directly from there on. No envelope is imposed on
//! relayed units beyond whatever the two parties agree on.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// How long the first connection is held open waiting for its peer.
const PAIRING_TIMEOUT: Duration = Duration::from_secs(60);
/// Cap on bytes buffered for a not-yet-connected peer.
const BUFFER_CAP: usize = 1024 * 1024;

const POLICY_VIOLATION: u16 = 1008;
const MESSAGE_TOO_BIG: u16 = 1009;

#[derive(Default)]
struct RelayState {
    pairs: Mutex<HashMap<String, Pair>>,
    next_generation: AtomicU64,
}

struct Pair {
    /// Distinguishes this entry from later ones reusing the identifier, so a
    /// stale pairing timeout cannot tear down a fresh entry.
    generation: u64,
    sides: [Option<mpsc::UnboundedSender<Message>>; 2],
    buffer: Vec<Message>,
    buffered: usize,
}

/// Builds the relay router: one WebSocket route with the pairing identifier
/// as its path.
pub fn router() -> Router {
    let state = Arc::new(RelayState::default());
    Router::new()
        .route("/{pairing_id}", get(pair))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves the relay until the process exits.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await
}

async fn pair(
    ws: WebSocketUpgrade,
    Path(pairing_id): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    ws.on_upgrade(move |socket| relay_connection(state, pairing_id, socket))
}

async fn relay_connection(state: Arc<RelayState>, pairing_id: String, mut socket: WebSocket) {
    let (tx, mut outbound) = mpsc::unbounded_channel::<Message>();
    let side = {
        let mut pairs = state.pairs.lock().await;
        match pairs.get_mut(&pairing_id) {
            None => {
                let generation = state.next_generation.fetch_add(1, Ordering::Relaxed);
                pairs.insert(
                    pairing_id.clone(),
                    Pair {
                        generation,
                        sides: [Some(tx), None],
                        buffer: Vec::new(),
                        buffered: 0,
                    },
                );
                tokio::spawn(expire_unpaired(
                    Arc::clone(&state),
                    pairing_id.clone(),
                    generation,
                ));
                0
            }
            Some(pair) if pair.sides[1].is_none() => {
                debug!(%pairing_id, buffered = pair.buffered, "pairing complete");
                for msg in pair.buffer.drain(..) {
                    let _ = tx.send(msg);
                }
                pair.buffered = 0;
                pair.sides[1] = Some(tx);
                1
            }
            Some(_) => {
                info!(%pairing_id, "rejecting third connection");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: POLICY_VIOLATION,
                        reason: "pairing identifier already has two participants".into(),
                    })))
                    .await;
                return;
            }
        }
    };

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(msg @ (Message::Binary(_) | Message::Text(_))) => {
                if !forward(&state, &pairing_id, side, msg).await {
                    break;
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) | Err(_) => break,
        }
    }

    let mut pairs = state.pairs.lock().await;
    if let Some(pair) = pairs.get_mut(&pairing_id) {
        pair.sides[side] = None;
        if pair.sides.iter().all(Option::is_none) {
            pairs.remove(&pairing_id);
        }
    }
    drop(pairs);
    let _ = writer.await;
}

/// Forwards one relayed unit to the other leg, or buffers it while the peer
/// is not connected. Returns `false` once the pairing entry is gone or the
/// buffer cap was exceeded.
async fn forward(state: &RelayState, pairing_id: &str, side: usize, msg: Message) -> bool {
    let mut pairs = state.pairs.lock().await;
    let Some(pair) = pairs.get_mut(pairing_id) else {
        return false;
    };
    let mut msg = msg;
    if let Some(peer) = &pair.sides[1 - side] {
        match peer.send(msg) {
            Ok(()) => return true,
            // The peer's writer is already gone; keep the unit buffered so
            // it is not dropped silently before cleanup runs.
            Err(mpsc::error::SendError(returned)) => msg = returned,
        }
    }
    pair.buffered += match &msg {
        Message::Binary(payload) => payload.len(),
        Message::Text(payload) => payload.len(),
        _ => 0,
    };
    if pair.buffered > BUFFER_CAP {
        warn!(%pairing_id, "buffer cap exceeded before pairing, closing both sides");
        for sender in pair.sides.iter().flatten() {
            let _ = sender.send(Message::Close(Some(CloseFrame {
                code: MESSAGE_TOO_BIG,
                reason: "pairing buffer exceeded 1 MiB".into(),
            })));
        }
        pairs.remove(pairing_id);
        return false;
    }
    pair.buffer.push(msg);
    true
}

/// Tears down a pairing entry whose second participant never arrived.
async fn expire_unpaired(state: Arc<RelayState>, pairing_id: String, generation: u64) {
    tokio::time::sleep(PAIRING_TIMEOUT).await;
    let mut pairs = state.pairs.lock().await;
    let Some(pair) = pairs.get(&pairing_id) else {
        return;
    };
    if pair.generation != generation || pair.sides[1].is_some() {
        return;
    }
    info!(%pairing_id, "second participant did not connect in time");
    if let Some(first) = pair.sides[0].as_ref() {
        let _ = first.send(Message::Close(Some(CloseFrame {
            code: POLICY_VIOLATION,
            reason: "second participant did not connect in time".into(),
        })));
    }
    pairs.remove(&pairing_id);
}
