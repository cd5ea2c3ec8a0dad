//! Engine lifecycle management: spawn, relay, settle, tear down.
//!
//! A [`Runner`] owns one engine-module handle and executes at most one run
//! against it at a time. The engine itself executes on a dedicated worker
//! thread so long-running computation never stalls the caller's executor;
//! host and worker communicate exclusively through typed messages, with a
//! correlation identifier matching every receive response to the specific
//! engine-side wait that issued it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use thiserror::Error;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelError, Tag};
use crate::diag;
use crate::engine::{Engine, EngineError, EngineIo, Job};
use crate::transport::memory::MemoryChannel;

/// Topology selection for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The two-party-optimized protocol; only valid when `size == 2`.
    TwoParty,
    /// The general N-party protocol.
    Multi,
    /// Pick [`Mode::TwoParty`] iff exactly two parties participate.
    #[default]
    Auto,
}

impl Mode {
    fn resolve(self, size: usize) -> Mode {
        match self {
            Mode::Auto if size == 2 => Mode::TwoParty,
            Mode::Auto => Mode::Multi,
            explicit => explicit,
        }
    }
}

/// The description of one engine invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The local party's index in `[0, size)`.
    pub party: usize,
    /// The number of participants.
    pub size: usize,
    /// The circuit description handed to the engine verbatim.
    pub circuit: String,
    /// The local party's input, one bit per byte.
    pub input_bits: Vec<u8>,
    /// Input bit count per party.
    pub input_bits_per_party: Vec<usize>,
    /// Topology selection; defaults to [`Mode::Auto`].
    pub mode: Mode,
    /// Whether to run the pre-flight probes before starting the engine.
    pub preflight: bool,
}

impl Invocation {
    /// Creates an invocation with automatic mode selection and no pre-flight
    /// probes.
    pub fn new(
        party: usize,
        size: usize,
        circuit: impl Into<String>,
        input_bits: Vec<u8>,
        input_bits_per_party: Vec<usize>,
    ) -> Invocation {
        Invocation {
            party,
            size,
            circuit: circuit.into(),
            input_bits,
            input_bits_per_party,
            mode: Mode::Auto,
            preflight: false,
        }
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.size < 2 {
            return Err(RunError::InvalidInvocation(format!(
                "a computation needs at least two parties, got {}",
                self.size
            )));
        }
        if self.party >= self.size {
            return Err(RunError::InvalidInvocation(format!(
                "party {} out of range for size {}",
                self.party, self.size
            )));
        }
        if self.input_bits_per_party.len() != self.size {
            return Err(RunError::InvalidInvocation(format!(
                "input bit table has {} entries for {} parties",
                self.input_bits_per_party.len(),
                self.size
            )));
        }
        if self.input_bits.len() != self.input_bits_per_party[self.party] {
            return Err(RunError::InvalidInvocation(format!(
                "party {} provided {} input bits, expected {}",
                self.party,
                self.input_bits.len(),
                self.input_bits_per_party[self.party]
            )));
        }
        Ok(())
    }
}

/// The error settling a failed run.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum RunError {
    /// Another run is already active against this runner's engine module.
    /// Concurrent attempts fail instead of queueing.
    #[error("another run is already active against this engine module")]
    Busy,
    /// The invocation is inconsistent; nothing was started.
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),
    /// The engine reported an internal failure, propagated verbatim.
    #[error("engine failure: {0}")]
    Engine(String),
    /// The transport failed while the run was in flight.
    #[error("transport failure: {0}")]
    Transport(ChannelError),
    /// The worker hosting the engine exited without settling the run.
    #[error("engine worker exited unexpectedly")]
    WorkerExited,
}

/// Messages sent by the worker hosting the engine.
enum WorkerRequest {
    /// Forward bytes to another party. Fire-and-forget.
    IoSend { to: usize, tag: Tag, data: Vec<u8> },
    /// Request exactly `len` bytes; answered by a reply carrying `id`.
    IoRecv {
        id: u64,
        from: usize,
        tag: Tag,
        len: usize,
    },
    /// Diagnostic note without correlation semantics.
    State(String),
    /// The engine produced its output bits.
    Result(Vec<u8>),
    /// The engine failed.
    Error(String),
}

/// Messages sent by the host to the worker.
enum WorkerReply {
    /// Kicks off the run.
    Start(Job, Mode),
    /// Fulfils the receive request carrying the same `id`.
    RecvOk { id: u64, data: Vec<u8> },
    /// Fails the receive request carrying the same `id`.
    RecvErr { id: u64, error: String },
}

/// Owns one engine-module handle and runs at most one invocation at a time
/// against it.
///
/// The single-run constraint exists because an engine module exposes shared,
/// not per-instance, state; callers that need parallel runs provision one
/// runner (and thus one engine module) per run.
#[derive(Debug)]
pub struct Runner<E> {
    engine: Arc<E>,
    busy: Arc<Semaphore>,
}

impl<E: Engine> Runner<E> {
    /// Creates a runner owning `engine`.
    pub fn new(engine: E) -> Runner<E> {
        Runner::from_shared(Arc::new(engine))
    }

    /// Creates a runner sharing an already-wrapped engine module.
    pub fn from_shared(engine: Arc<E>) -> Runner<E> {
        Runner {
            engine,
            busy: Arc::new(Semaphore::new(1)),
        }
    }

    /// Executes one run: spawns the engine on a worker thread, relays its
    /// I/O through `io`, and resolves with the output bits.
    ///
    /// Teardown is unconditional: on every exit path the worker is
    /// unblocked, the error subscription is dropped and the single-run
    /// permit is released. On failure the channel is closed so no pending
    /// engine-side wait can outlive the run.
    pub async fn run<C: Channel>(&self, invocation: Invocation, io: C) -> Result<Vec<u8>, RunError> {
        let _permit = self
            .busy
            .clone()
            .try_acquire_owned()
            .map_err(|_| RunError::Busy)?;
        invocation.validate()?;

        if invocation.preflight {
            match diag::preflight(&io, invocation.party, invocation.size).await {
                Ok(report) => debug!(?report, "pre-flight probes"),
                Err(err) => warn!(%err, "pre-flight probes failed"),
            }
        }

        let mode = invocation.mode.resolve(invocation.size);
        let job = Job {
            party: invocation.party,
            size: invocation.size,
            circuit: invocation.circuit,
            input_bits: invocation.input_bits,
            input_bits_per_party: invocation.input_bits_per_party,
        };

        let (reply_tx, reply_rx) = std_mpsc::channel::<WorkerReply>();
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
        let engine = Arc::clone(&self.engine);
        std::thread::Builder::new()
            .name("mpcio-engine".into())
            .spawn(move || worker_main(engine, reply_rx, request_tx))
            .map_err(|err| RunError::Engine(format!("failed to spawn engine worker: {err}")))?;
        if reply_tx.send(WorkerReply::Start(job, mode)).is_err() {
            return Err(RunError::WorkerExited);
        }

        let io = Arc::new(io);
        let mut errors = io.subscribe_errors();
        let result = relay(&io, &reply_tx, &mut request_rx, &mut errors).await;
        if result.is_err() {
            // Fail any engine-side wait still in flight so the worker winds
            // down instead of blocking forever.
            io.close();
        }
        drop(reply_tx);
        result
    }
}

/// Forwards engine I/O requests to the channel until the run settles.
async fn relay<C: Channel>(
    io: &Arc<C>,
    reply_tx: &std_mpsc::Sender<WorkerReply>,
    request_rx: &mut mpsc::UnboundedReceiver<WorkerRequest>,
    errors: &mut Option<broadcast::Receiver<ChannelError>>,
) -> Result<Vec<u8>, RunError> {
    loop {
        let request = tokio::select! {
            request = request_rx.recv() => request,
            err = transport_error(errors) => return Err(RunError::Transport(err)),
        };
        let Some(request) = request else {
            return Err(RunError::WorkerExited);
        };
        match request {
            WorkerRequest::IoSend { to, tag, data } => {
                if let Err(err) = io.send_to(to, tag, data) {
                    return Err(RunError::Transport(err));
                }
            }
            WorkerRequest::IoRecv { id, from, tag, len } => {
                // Register the read now (order matters), fulfil it whenever
                // the bytes arrive. Replies for a gone worker are dropped.
                let pending = io.recv_from(from, tag, len);
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let reply = match pending.await {
                        Ok(data) => WorkerReply::RecvOk { id, data },
                        Err(err) => WorkerReply::RecvErr {
                            id,
                            error: err.to_string(),
                        },
                    };
                    let _ = reply_tx.send(reply);
                });
            }
            WorkerRequest::State(note) => debug!(%note, "engine state"),
            WorkerRequest::Result(bits) => return Ok(bits),
            WorkerRequest::Error(message) => return Err(RunError::Engine(message)),
        }
    }
}

/// Resolves with the next transport failure, or never if the channel does
/// not offer error notifications.
async fn transport_error(
    errors: &mut Option<broadcast::Receiver<ChannelError>>,
) -> ChannelError {
    match errors {
        Some(rx) => loop {
            match rx.recv().await {
                Ok(err) => break err,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                // The adapter is gone; pending reads will fail on their own.
                Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
            }
        },
        None => std::future::pending().await,
    }
}

/// Entry point of the worker thread hosting the engine.
fn worker_main<E: Engine>(
    engine: Arc<E>,
    replies: std_mpsc::Receiver<WorkerReply>,
    requests: mpsc::UnboundedSender<WorkerRequest>,
) {
    let Ok(WorkerReply::Start(job, mode)) = replies.recv() else {
        return;
    };
    let mut io = WorkerIo {
        next_id: 0,
        fulfilled: HashMap::new(),
        replies,
        requests: requests.clone(),
    };
    let result = match mode.resolve(job.size) {
        Mode::TwoParty => engine.run_two_party(&job, &mut io),
        _ => engine.run_multi_party(&job, &mut io),
    };
    let message = match result {
        Ok(bits) => WorkerRequest::Result(bits),
        Err(err) => WorkerRequest::Error(err.to_string()),
    };
    let _ = requests.send(message);
}

/// The worker-side I/O proxy: turns blocking engine calls into correlated
/// messages to the host.
struct WorkerIo {
    next_id: u64,
    fulfilled: HashMap<u64, Result<Vec<u8>, EngineError>>,
    replies: std_mpsc::Receiver<WorkerReply>,
    requests: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerIo {
    fn host_gone() -> EngineError {
        EngineError::Io("host side of the run is gone".into())
    }
}

impl EngineIo for WorkerIo {
    fn send(&mut self, to: usize, tag: Tag, data: &[u8]) -> Result<(), EngineError> {
        self.requests
            .send(WorkerRequest::IoSend {
                to,
                tag,
                data: data.to_vec(),
            })
            .map_err(|_| WorkerIo::host_gone())
    }

    fn recv(&mut self, from: usize, tag: Tag, len: usize) -> Result<Vec<u8>, EngineError> {
        let id = self.next_id;
        self.next_id += 1;
        self.requests
            .send(WorkerRequest::IoRecv { id, from, tag, len })
            .map_err(|_| WorkerIo::host_gone())?;
        loop {
            if let Some(result) = self.fulfilled.remove(&id) {
                return result;
            }
            match self.replies.recv() {
                Ok(WorkerReply::RecvOk { id: done, data }) => {
                    self.fulfilled.insert(done, Ok(data));
                }
                Ok(WorkerReply::RecvErr { id: done, error }) => {
                    self.fulfilled.insert(done, Err(EngineError::Io(error)));
                }
                Ok(WorkerReply::Start(..)) => {}
                Err(_) => return Err(WorkerIo::host_gone()),
            }
        }
    }

    fn state(&mut self, note: &str) {
        let _ = self.requests.send(WorkerRequest::State(note.to_string()));
    }
}

/// Runs every party of a computation in-process over the in-memory mesh and
/// returns each party's output bits, in party order.
///
/// Each party gets its own runner (and thus its own engine-module handle),
/// since one engine module only supports a single active run.
pub async fn simulate<E: Engine>(
    engine: Arc<E>,
    circuit: &str,
    inputs: &[Vec<u8>],
    mode: Mode,
) -> Result<Vec<Vec<u8>>, RunError> {
    let size = inputs.len();
    let input_bits_per_party: Vec<usize> = inputs.iter().map(|bits| bits.len()).collect();
    let channels = MemoryChannel::channels(size);
    let mut parties = Vec::with_capacity(size);
    for (party, io) in channels.into_iter().enumerate() {
        let mut invocation = Invocation::new(
            party,
            size,
            circuit,
            inputs[party].clone(),
            input_bits_per_party.clone(),
        );
        invocation.mode = mode;
        let runner = Runner::from_shared(Arc::clone(&engine));
        parties.push(async move { runner.run(invocation, io).await });
    }
    futures::future::join_all(parties).await.into_iter().collect()
}
