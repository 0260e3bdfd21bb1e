//! Binds webhook payloads to mirror updates.
//!
//! Payloads that carry the shared token are queued for a single worker that
//! owns the update cycle.  The queue holds at most one pending payload, so a
//! burst of pushes collapses into the cycle already running plus one more.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::listener::PayloadHandler;
use crate::auth::SharedToken;
use crate::git::Engine;
use crate::mirror::Mirror;

/// [`PayloadHandler`] that schedules an update cycle on its mirror.
pub struct ResyncTrigger {
    path: PathBuf,
    token: SharedToken,
    pending: mpsc::Sender<Bytes>,
}

impl ResyncTrigger {
    /// Start the update worker for `mirror` and return the handler that feeds
    /// it, together with the worker's task.
    ///
    /// The worker exits once every clone of the handler has been dropped.
    pub async fn spawn<E>(mirror: Arc<Mutex<Mirror<E>>>) -> (Self, JoinHandle<()>)
    where
        E: Engine + 'static,
        E::Handle: 'static,
    {
        let (path, token) = {
            let mirror = mirror.lock().await;
            (mirror.path().to_path_buf(), mirror.token().clone())
        };
        let (pending, queue) = mpsc::channel(1);
        let worker = tokio::spawn(run_worker(mirror, queue));
        (
            Self {
                path,
                token,
                pending,
            },
            worker,
        )
    }
}

impl PayloadHandler for ResyncTrigger {
    fn handle(&self, payload: Bytes) {
        let path = self.path.display();
        if !self.token.permits(&payload) {
            error!(%path, "webhook payload does not contain the token; ignoring");
            return;
        }
        match self.pending.try_send(payload) {
            Ok(()) => debug!(%path, "update queued"),
            Err(TrySendError::Full(_)) => {
                info!(%path, "update already pending; coalescing trigger")
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%path, "update worker has stopped; dropping trigger")
            }
        }
    }
}

async fn run_worker<E>(mirror: Arc<Mutex<Mirror<E>>>, mut queue: mpsc::Receiver<Bytes>)
where
    E: Engine + 'static,
    E::Handle: 'static,
{
    while let Some(payload) = queue.recv().await {
        let mirror = Arc::clone(&mirror);
        // git2 calls block; keep them off the runtime threads.
        let cycle = tokio::task::spawn_blocking(move || mirror.blocking_lock().trigger(&payload));
        match cycle.await {
            Ok(outcome) => debug!(?outcome, "update cycle finished"),
            Err(e) => error!(error = %e, "update cycle panicked"),
        }
    }
    debug!("update worker stopped");
}
