//! JSON-RPC-over-frames request layer: the external collaborator that
//! resolves `(dataset-id, column-id, index)` and invokes core Dataset/Column
//! operations (spec §2 "Request glue", specified here at the level SPEC_FULL
//! §10.6 calls for — enough to exercise the core from tests and the CLI).

mod connection;
mod dispatch;
pub mod frame;
mod state;
mod wire;

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub use state::ServerState;

/// Scans `root` for datasets, binds `0.0.0.0:<port>`, and serves connections
/// until the process is killed. Every core mutation runs under one
/// `tokio::sync::Mutex<ServerState>`, matching spec §5's single logical
/// control thread even though I/O itself is handled by many tasks.
pub async fn run(root: &Path, port: u16) -> std::io::Result<()> {
    let state = ServerState::load(root).map_err(|e| std::io::Error::other(e.to_string()))?;
    let state = Arc::new(Mutex::new(state));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            connection::handle_connection(state, stream, peer).await;
        });
    }
}
