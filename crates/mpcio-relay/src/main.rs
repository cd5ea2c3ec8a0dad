use std::net::SocketAddr;

use clap::Parser;

/// Rendezvous relay pairing two WebSocket connections per identifier.
#[derive(Debug, Parser)]
#[command(name = "mpcio-relay")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "SOCKET_ADDRESS", default_value = "127.0.0.1:8175")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    mpcio_relay::serve(args.listen).await
}
