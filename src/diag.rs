//! Pre-flight channel diagnostics.
//!
//! Both probes are small request/response loops over [`Tag::Diag`], so they
//! can run before the engine starts without touching the protocol streams.
//! Their results are estimates for operator feedback; a probe failure is
//! reported by the runner but never fails the run.

use std::time::{Duration, Instant};

use crate::channel::{Channel, ChannelError, Tag};

const PING: [u8; 1] = [0x70];
const CHUNK_LEN: usize = 64 * 1024;

/// The measurements gathered before a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preflight {
    /// Worst round-trip time over the pairs this party initiated (zero for a
    /// party that initiated none).
    pub latency: Duration,
    /// Rough inbound throughput estimate in bytes per second.
    pub throughput: f64,
}

/// Runs the latency and throughput probes for `party` in a computation of
/// `size` participants. Every participant must call this with the same
/// arguments for the probes to pair up.
pub async fn preflight<C: Channel>(
    io: &C,
    party: usize,
    size: usize,
) -> Result<Preflight, ChannelError> {
    let latency = latency_probe(io, party, size).await?;
    let throughput = throughput_probe(io, party, size).await?;
    Ok(Preflight {
        latency,
        throughput,
    })
}

/// Ping/echo over every pair, lower index initiating. Returns the worst
/// round-trip time this party observed as initiator.
async fn latency_probe<C: Channel>(
    io: &C,
    party: usize,
    size: usize,
) -> Result<Duration, ChannelError> {
    let mut worst = Duration::ZERO;
    for initiator in 0..size {
        for responder in initiator + 1..size {
            if party == initiator {
                let started = Instant::now();
                io.send_to(responder, Tag::Diag, PING.to_vec())?;
                io.recv_from(responder, Tag::Diag, PING.len()).await?;
                worst = worst.max(started.elapsed());
            } else if party == responder {
                let ping = io.recv_from(initiator, Tag::Diag, PING.len()).await?;
                io.send_to(initiator, Tag::Diag, ping)?;
            }
        }
    }
    Ok(worst)
}

/// Each party streams one chunk to its ring successor and times the chunk
/// arriving from its predecessor.
async fn throughput_probe<C: Channel>(
    io: &C,
    party: usize,
    size: usize,
) -> Result<f64, ChannelError> {
    if size < 2 {
        return Ok(0.0);
    }
    let next = (party + 1) % size;
    let prev = (party + size - 1) % size;
    let started = Instant::now();
    io.send_to(next, Tag::Diag, vec![0; CHUNK_LEN])?;
    io.recv_from(prev, Tag::Diag, CHUNK_LEN).await?;
    let elapsed = started.elapsed().as_secs_f64();
    if elapsed == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(CHUNK_LEN as f64 / elapsed)
}
