//! WebSocket server: accept loop and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket, reading the client
//!    type hint from the upgrade request.
//! 3. Attaching the connection to the [`Hub`] and running two halves per
//!    connection:
//!    - **Reader**: text frames → [`Hub::handle_frame`].
//!    - **Writer**: a task draining the connection's [`OutboundFrame`]
//!      channel into the socket sink.
//! 4. Detaching the connection from the hub as soon as either half ends.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Modules and dashboards share this one endpoint; the hub decides which is
//! which.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{Sink, SinkExt, StreamExt};
use locker_core::{encode_outbound, ClientHint};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::application::Hub;
use crate::domain::{ConnectionHandle, ConnectionId, OutboundFrame};

/// Header carrying the declared client type during the upgrade.
pub const CLIENT_TYPE_HEADER: &str = "x-client-type";

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `bind_addr` and serves connections until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// permission).
pub async fn run_server(
    bind_addr: SocketAddr,
    hub: Arc<Hub>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {bind_addr}"))?;
    info!("locker hub listening on {bind_addr}");
    serve(listener, hub, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Each accepted connection is handed to its own task so one slow client
/// never delays another.
///
/// # Errors
///
/// Currently infallible once the listener exists; accept errors are logged
/// and the loop continues.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<Hub>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("tcp connection from {peer_addr}");
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, hub).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection within the poll window.
            }
        }
    }
    Ok(())
}

/// Derives the client hint from the upgrade request.
pub fn hint_from_request(req: &Request) -> ClientHint {
    let header = req
        .headers()
        .get(CLIENT_TYPE_HEADER)
        .and_then(|value| value.to_str().ok());
    ClientHint::from_request(req.uri().path(), req.uri().query(), header)
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, hub: Arc<Hub>) {
    match run_session(stream, peer_addr, hub).await {
        Ok(()) => info!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one connection from handshake to detach.
///
/// # Errors
///
/// Returns an error if the handshake fails or the socket errors while
/// reading.  The connection is detached from the hub in both cases.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<Hub>,
) -> anyhow::Result<()> {
    let mut hint = ClientHint::Unspecified;
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        hint = hint_from_request(req);
        Ok::<Response, ErrorResponse>(resp)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let (handle, outbound) =
        ConnectionHandle::with_capacity(Some(peer_addr), hub.config().outbound_queue);
    let connection_id = handle.id();
    hub.attach(handle, hint).await;

    let mut writer = tokio::spawn(write_frames(ws_tx, outbound, connection_id));

    let result = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    hub.handle_frame(connection_id, &text).await;
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    debug!(%connection_id, len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                // Ping/Pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) => break Ok(()),
                Some(Err(e)) => {
                    let context = format!("read error on {connection_id}");
                    break Err(anyhow::Error::new(e).context(context));
                }
            },
            _ = &mut writer => {
                debug!(%connection_id, "writer finished; ending session");
                break Ok(());
            }
        }
    };

    hub.detach(connection_id).await;
    writer.abort();
    result
}

/// Drains a connection's outbound channel into its socket.
///
/// Ends after sending a Close frame (including the one queued for a slow
/// consumer), on a write error, or when every handle to the connection is
/// dropped.  Dropping the receiver on return is what
/// makes the connection's handles report closed.
pub async fn write_frames<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    connection_id: ConnectionId,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        match frame {
            OutboundFrame::Message(msg) => {
                let text = match encode_outbound(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(%connection_id, "{e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    warn!(%connection_id, kind = msg.type_name(), "write failed: {e}");
                    break;
                }
            }
            OutboundFrame::Close { reason } => {
                debug!(%connection_id, %reason, "closing connection");
                let close = CloseFrame {
                    code: CloseCode::Away,
                    reason: reason.into(),
                };
                if let Err(e) = sink.send(WsMessage::Close(Some(close))).await {
                    debug!(%connection_id, "close frame not sent: {e}");
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
