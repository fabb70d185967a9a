//! Observer WebSocket endpoint: accept loop and per-observer tasks.
//!
//! Observers (typically a browser dashboard) connect over WebSocket and send
//! one registration message naming the hub they want:
//!
//! ```json
//! {"type":"devices"}
//! {"type":"log"}
//! ```
//!
//! The server then subscribes a [`ChannelObserver`] to that hub and forwards
//! every hub message to the socket as a text frame.  A malformed or unknown
//! registration closes the connection.  When the observer's read side ends
//! the observer is unsubscribed.
//!
//! # Threads and tasks
//!
//! Hubs are published from the `probe-publisher` OS thread, which must never
//! block on a slow browser.  [`ChannelObserver::deliver`] therefore only
//! pushes onto a bounded tokio channel; a per-observer writer task drains
//! that channel into the WebSocket sink.  An observer whose queue is full has
//! stopped reading, so the delivery fails and the hub drops it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use super::control::ProbeCore;
use super::hub::{Observer, ObserverError, SubscriptionKind};

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Messages queued for one observer before it counts as stalled.
pub const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Hub member backed by a tokio channel feeding one WebSocket writer task.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::Sender<String>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, message: &str) -> Result<(), ObserverError> {
        self.tx
            .try_send(message.to_string())
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    ObserverError::Write(format!("{OBSERVER_QUEUE_CAPACITY} messages pending"))
                }
                TrySendError::Closed(_) => ObserverError::Disconnected,
            })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the observer TCP listener.
///
/// # Errors
///
/// Returns an error if the port is in use or cannot be bound.
pub async fn bind_observer_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind observer listener on {addr}"))
}

/// Binds `addr` and serves observers until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_observer_server(
    addr: SocketAddr,
    core: Arc<ProbeCore>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = bind_observer_listener(addr).await?;
    serve_observers(listener, core, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Each accepted connection is handed off to its own Tokio task so that one
/// slow observer never blocks the others.
pub async fn serve_observers(
    listener: TcpListener,
    core: Arc<ProbeCore>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    info!(
        "observer endpoint listening on {}",
        listener.local_addr().context("observer listener has no address")?
    );

    while running.load(Ordering::Relaxed) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("observer connection from {peer_addr}");
                let core = Arc::clone(&core);
                tokio::spawn(async move {
                    handle_observer(stream, peer_addr, core).await;
                });
            }
            Ok(Err(e)) => error!("observer accept error: {e}"),
            Err(_) => {
                // Timeout: loop back to check the `running` flag.
            }
        }
    }

    info!("observer endpoint stopped");
    Ok(())
}

// ── Per-observer handler ──────────────────────────────────────────────────────

async fn handle_observer(stream: TcpStream, peer_addr: SocketAddr, core: Arc<ProbeCore>) {
    match run_observer(stream, peer_addr, core).await {
        Ok(()) => debug!("observer {peer_addr} closed"),
        Err(e) => warn!("observer {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_observer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    core: Arc<ProbeCore>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let Some(kind) = read_registration(&mut ws_rx, peer_addr).await else {
        // Best effort; the peer may already be gone.
        let _ = ws_tx.send(WsMessage::Close(None)).await;
        return Ok(());
    };

    let (tx, mut rx) = mpsc::channel::<String>(OBSERVER_QUEUE_CAPACITY);
    let id = core.subscribe(kind, Box::new(ChannelObserver::new(tx)));
    info!("observer {peer_addr} subscribed to {kind}");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(message)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Observers are not expected to send anything after registering; the
    // read loop only watches for the connection going away.
    loop {
        match ws_rx.next().await {
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => break,
            Some(Err(e)) => {
                debug!("observer {peer_addr} read error: {e}");
                break;
            }
            Some(Ok(_)) => continue,
        }
    }

    // Dropping the hub's sender ends the writer task.
    core.unsubscribe(kind, id);
    let _ = writer.await;
    info!("observer {peer_addr} unsubscribed from {kind}");
    Ok(())
}

/// Waits for the registration message.  `None` closes the connection.
async fn read_registration<S>(ws_rx: &mut S, peer_addr: SocketAddr) -> Option<SubscriptionKind>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        match ws_rx.next().await? {
            Ok(WsMessage::Text(text)) => {
                return match serde_json::from_str::<SubscriptionKind>(&text) {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        warn!("observer {peer_addr} sent invalid registration {text:?}: {e}");
                        None
                    }
                };
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => continue,
            Ok(other) => {
                warn!("observer {peer_addr} sent non-text registration: {other:?}");
                return None;
            }
            Err(e) => {
                debug!("observer {peer_addr} failed before registering: {e}");
                return None;
            }
        }
    }
}
