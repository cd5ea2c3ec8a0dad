//! The boundary to the opaque computation engine.
//!
//! The engine (garbling, oblivious transfer, circuit evaluation) is a black
//! box to this crate: it consumes a circuit description, input bits and a
//! blocking byte I/O contract, and produces output bits. The runner hosts it
//! on a worker thread and relays its I/O; everything behind the [`Engine`]
//! trait is out of scope here.

use thiserror::Error;

use crate::channel::Tag;

/// The configuration of one engine invocation.
#[derive(Debug, Clone)]
pub struct Job {
    /// The local party's index in `[0, size)`.
    pub party: usize,
    /// The number of participants.
    pub size: usize,
    /// The circuit description, opaque to the core.
    pub circuit: String,
    /// The local party's input, one bit per byte.
    pub input_bits: Vec<u8>,
    /// Input bit count per party, so the engine can locate each party's
    /// segment inside the joint input vector.
    pub input_bits_per_party: Vec<usize>,
}

/// Errors reported across the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The job configuration is inconsistent (party out of range, input
    /// length mismatch, wrong topology for the entry point).
    #[error("invalid job: {0}")]
    InvalidJob(String),
    /// The circuit description could not be understood.
    #[error("circuit error: {0}")]
    Circuit(String),
    /// A byte exchange with another party failed.
    #[error("engine i/o failed: {0}")]
    Io(String),
    /// The engine failed internally; the message is propagated verbatim.
    #[error("{0}")]
    Failed(String),
}

/// Blocking byte I/O available to an engine while it runs.
///
/// `send` never blocks; `recv` blocks the engine until exactly `len` bytes
/// have arrived from the addressed party on the given tag.
pub trait EngineIo {
    /// Sends `data` to party `to` on `tag`.
    fn send(&mut self, to: usize, tag: Tag, data: &[u8]) -> Result<(), EngineError>;
    /// Receives exactly `len` bytes from party `from` on `tag`.
    fn recv(&mut self, from: usize, tag: Tag, len: usize) -> Result<Vec<u8>, EngineError>;
    /// Reports a diagnostic progress note. Carries no correlation semantics
    /// and may be ignored; the default does nothing.
    fn state(&mut self, _note: &str) {}
}

/// The opaque computation engine, with one entry point per topology.
///
/// Implementations expose shared module state at most suited for a single
/// run at a time; the runner serializes access accordingly.
pub trait Engine: Send + Sync + 'static {
    /// Runs the two-party-optimized protocol. Fails if `job.size != 2`.
    fn run_two_party(&self, job: &Job, io: &mut dyn EngineIo) -> Result<Vec<u8>, EngineError>;

    /// Runs the general N-party protocol.
    fn run_multi_party(&self, job: &Job, io: &mut dyn EngineIo) -> Result<Vec<u8>, EngineError>;
}
