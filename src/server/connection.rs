//! Per-connection glue: one task reads frames and dispatches requests, one
//! task owns the socket's write half and drains a per-client push channel
//! fed both by that client's own responses and by notifications fanned out
//! from other clients' mutations (spec §5's single control thread, realized
//! here as "every core mutation goes through one `tokio::sync::Mutex`").

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use super::dispatch::dispatch;
use super::frame::{read_frame, write_frame};
use super::state::{ClientState, ServerState};
use super::wire::{build_error_response, build_response, parse_request};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_client_id() -> String {
    format!("client-{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

pub async fn handle_connection(state: Arc<Mutex<ServerState>>, stream: TcpStream, addr: SocketAddr) {
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let client_id = fresh_client_id();

    state.lock().await.register_client(client_id.clone(), tx.clone());
    log::info!("client {client_id} connected from {addr}");

    let writer_task = tokio::spawn(writer_loop(write_half, rx));

    let mut client = ClientState { id: client_id.clone(), current_dataset: None };
    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::warn!("client {client_id} read error: {e}");
                break;
            }
        };

        let envelope = match parse_request(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("client {client_id} sent a malformed request, dropping: {e}");
                continue;
            }
        };

        log::debug!("client {client_id} dispatching {}", envelope.method);
        let response = {
            let mut state = state.lock().await;
            match dispatch(&mut state, &mut client, &envelope.method, envelope.argument) {
                Ok(result) => build_response(envelope.index, result),
                Err(err) => build_error_response(envelope.index, &err),
            }
        };

        if tx.send(Bytes::from(response)).is_err() {
            break;
        }
    }

    state.lock().await.forget_client(&client_id);
    writer_task.abort();
    log::info!("client {client_id} disconnected");
}

async fn writer_loop(mut write_half: WriteHalf<TcpStream>, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &payload).await {
            log::warn!("write error, closing connection: {e}");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
