//! Byte-exact transport plumbing and engine lifecycle management for
//! garbled-circuit multi-party computation.
//!
//! The cryptographic engine itself (garbling, oblivious transfer, circuit
//! evaluation) is treated as an opaque module behind the [`engine::Engine`]
//! trait. What this crate provides is everything needed to get bytes
//! reliably, in order and on demand between that engine, the application
//! that invoked it, and the network, across party and logical-channel
//! boundaries, plus the lifecycle of spawning, running and tearing down one
//! engine instance per invocation.
//!
//! ## Main components
//!
//! * [`queue`]: [`queue::ByteQueue`], an append-only buffer with
//!   asynchronous exact-length reads served in strict request order.
//! * [`channel`]: channel tags, per-tag queue sets and the [`channel::Channel`]
//!   I/O contract connecting the runner to a transport.
//! * [`transport`]: interchangeable adapters for direct TCP sockets,
//!   WebSockets (including the relay client leg), manual copy/paste exchange
//!   and an in-process mesh.
//! * [`runner`]: [`runner::Runner`], which hosts the engine on a worker
//!   thread, relays its I/O requests over a channel and guarantees teardown
//!   on every exit path.
//! * [`diag`]: optional pre-flight latency and throughput probes.
//! * [`cleartext`]: an insecure reveal-and-evaluate engine for development
//!   and tests.
//!
//! ## Basic usage
//!
//! Each participating party connects a transport adapter to its peer(s) and
//! hands it to a runner together with its private input bits:
//!
//! ```ignore
//! use mpcio::{cleartext::ClearEngine, runner::{Invocation, Runner}, transport::tcp};
//!
//! # async fn example(circuit: &str, input_bits: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let io = tcp::connect("203.0.113.7:9000", 1).await?;
//! let runner = Runner::new(ClearEngine);
//! let invocation = Invocation::new(0, 2, circuit, input_bits, vec![32, 32]);
//! let output_bits = runner.run(invocation, io).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Only one run may be active per runner at a time; a second attempt fails
//! fast with [`runner::RunError::Busy`]. Parallel runs need one runner (and
//! therefore one engine module) each.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod cleartext;
pub mod diag;
pub mod engine;
pub mod queue;
pub mod runner;
pub mod transport;
