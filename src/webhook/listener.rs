//! One-shot payload acceptor.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest payload read from a single connection.  Anything beyond is ignored.
pub const MAX_PAYLOAD_BYTES: usize = 255;

/// Written back on every connection that delivered a payload.
pub const ACKNOWLEDGEMENT: &[u8] = b"HTTP/1.0 200 OK\r\n";

/// Pause after a failed accept.  Errors such as descriptor exhaustion
/// persist until some connection closes.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Receives the raw bytes of each accepted payload.
///
/// Called on the connection's task; implementations should hand heavy work
/// off rather than block.
pub trait PayloadHandler: Send + Sync + 'static {
    fn handle(&self, payload: Bytes);
}

impl<F> PayloadHandler for F
where
    F: Fn(Bytes) + Send + Sync + 'static,
{
    fn handle(&self, payload: Bytes) {
        self(payload)
    }
}

// ---------------------------------------------------------------------------
// Idle
// ---------------------------------------------------------------------------

/// A listener that has not been started yet.
pub struct TriggerListener {
    addr: SocketAddr,
    handler: Arc<dyn PayloadHandler>,
}

impl TriggerListener {
    pub fn new(addr: SocketAddr, handler: impl PayloadHandler) -> Self {
        Self {
            addr,
            handler: Arc::new(handler),
        }
    }

    /// Bind the listening socket and start accepting connections.
    pub async fn start(self) -> Result<RunningListener> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind webhook listener on {}", self.addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read webhook listener address")?;

        info!(%local_addr, "webhook listener started");

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, self.handler, shutdown.clone()));

        Ok(RunningListener {
            local_addr,
            shutdown,
            task,
        })
    }
}

// ---------------------------------------------------------------------------
// Listening
// ---------------------------------------------------------------------------

/// A listener accepting connections until [`stop`](Self::stop) is called.
pub struct RunningListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the listening socket.
    ///
    /// Returns once no new connection can be accepted.  Connections already
    /// accepted are still read and handled.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "webhook accept loop ended abnormally");
        }
        info!(local_addr = %self.local_addr, "webhook listener stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn PayloadHandler>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tokio::spawn(handle_connection(socket, peer, Arc::clone(&handler)));
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept webhook connection");
                    if !back_off(&shutdown).await {
                        break;
                    }
                }
            },
        }
    }
    debug!("webhook accept loop exited");
}

/// Wait out [`ACCEPT_ERROR_BACKOFF`].  Returns `false` if shutdown was
/// requested meanwhile.
async fn back_off(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn PayloadHandler>,
) {
    let mut buf = vec![0u8; MAX_PAYLOAD_BYTES];
    let read = match socket.read(&mut buf).await {
        Ok(0) => {
            debug!(%peer, "connection closed before sending a payload");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            debug!(%peer, error = %e, "failed to read webhook payload");
            return;
        }
    };
    buf.truncate(read);

    if let Err(e) = socket.write_all(ACKNOWLEDGEMENT).await {
        warn!(%peer, error = %e, "failed to acknowledge webhook payload");
    }

    debug!(%peer, bytes = read, "webhook payload received");
    handler.handle(Bytes::from(buf));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
