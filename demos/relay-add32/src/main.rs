use anyhow::{Context, bail};
use clap::Parser;
use mpcio::cleartext::ClearEngine;
use mpcio::runner::{Invocation, Mode, Runner};
use mpcio::transport::ws;
use mpcio_test_utils::{ADD32, from_bits, to_bits};

/// Jointly computes the sum of two private 32-bit inputs with a peer reached
/// through a pairing relay.
///
/// Both participants run this binary with the same relay URL and pairing
/// identifier, as party 0 and party 1 respectively.
#[derive(Debug, Parser)]
#[command(name = "relay-add32")]
struct Args {
    /// Relay endpoint, e.g. ws://127.0.0.1:8175
    #[arg(long, default_value = "ws://127.0.0.1:8175")]
    relay: String,
    /// Pairing identifier shared with the peer.
    #[arg(long)]
    pairing: String,
    /// The local party index (0 or 1).
    #[arg(long)]
    party: usize,
    /// Force an execution mode (`2pc` or `mpc`) instead of automatic
    /// selection.
    #[arg(long)]
    mode: Option<String>,
    /// Run the pre-flight latency/throughput probes before the computation.
    #[arg(long)]
    preflight: bool,
    /// The private 32-bit input.
    input: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if args.party > 1 {
        bail!("party must be 0 or 1");
    }
    let mode = match args.mode.as_deref() {
        None => Mode::Auto,
        Some("2pc") => Mode::TwoParty,
        Some("mpc") => Mode::Multi,
        Some(other) => bail!("unknown mode {other} (expected 2pc or mpc)"),
    };

    let url = format!("{}/{}", args.relay.trim_end_matches('/'), args.pairing);
    let io = ws::connect(&url, 1 - args.party)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;

    let mut invocation = Invocation::new(
        args.party,
        2,
        ADD32,
        to_bits(args.input, 32),
        vec![32, 32],
    );
    invocation.mode = mode;
    invocation.preflight = args.preflight;

    let runner = Runner::new(ClearEngine);
    let output = runner
        .run(invocation, io)
        .await
        .context("joint computation failed")?;
    println!("{}", from_bits(&output));
    Ok(())
}
