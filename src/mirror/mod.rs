//! Local mirror of one remote repository.
//!
//! A [`Mirror`] establishes its working copy at construction (clone when the
//! directory holds no repository, otherwise fetch and hard-reset) and then
//! brings it up to date once per authorized trigger.  Observers only ever see
//! the outcome of a cycle that fully completed.

pub mod observer;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::SharedToken;
use crate::credentials::Credentials;
use crate::git::{Engine, EngineError, FileDiff, Git2Engine, Operation};

pub use observer::{LogObserver, Observer, ObserverId, ObserverRegistry};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything a [`Mirror`] needs to know about its repository.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub remote_url: String,
    pub local_path: PathBuf,
    pub token: SharedToken,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("cannot access repository path {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("webhook token for {} is empty", .0.display())]
    EmptyToken(PathBuf),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What one call to [`Mirror::trigger`] did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The payload did not carry the shared token.  No engine call was made.
    Unauthorized,
    /// The working copy was updated but no file changed.
    Unchanged,
    /// The working copy was updated and `observers` observers were notified.
    Notified { diff: FileDiff, observers: usize },
    /// An engine primitive failed.  Nobody was notified.
    Aborted(EngineError),
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

pub struct Mirror<E: Engine = Git2Engine> {
    engine: E,
    handle: E::Handle,
    config: MirrorConfig,
    observers: ObserverRegistry,
}

impl<E: Engine> Mirror<E> {
    /// Open or clone the working copy described by `config`.
    ///
    /// The local path must already exist as a directory and the token must
    /// be non-empty.  Any engine failure is returned after the partially
    /// opened repository has been released.
    pub fn new(engine: E, config: MirrorConfig) -> Result<Self, MirrorError> {
        let path = config.local_path.as_path();
        if config.token.is_empty() {
            return Err(MirrorError::EmptyToken(path.to_path_buf()));
        }
        check_directory(path)?;

        let handle = if engine.repository_exists(path) {
            info!(path = %path.display(), "repository exists; checking for updates");
            let mut handle = engine.open(path)?;
            engine.fetch(&mut handle, config.credentials.as_ref())?;
            engine.reset_to_fetch_head(&mut handle)?;
            info!(path = %path.display(), "repository update completed");
            handle
        } else {
            info!(
                path = %path.display(),
                remote = %config.remote_url,
                "repository does not exist; cloning"
            );
            let handle =
                engine.clone_repository(&config.remote_url, path, config.credentials.as_ref())?;
            info!(path = %path.display(), "cloning completed");
            handle
        };

        Ok(Self {
            engine,
            handle,
            config,
            observers: ObserverRegistry::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.local_path
    }

    pub fn remote_url(&self) -> &str {
        &self.config.remote_url
    }

    pub fn token(&self) -> &SharedToken {
        &self.config.token
    }

    pub fn handle(&self) -> &E::Handle {
        &self.handle
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Paths currently tracked by the working copy's index.
    pub fn tracked_files(&self) -> Result<Vec<String>, MirrorError> {
        Ok(self.engine.tracked_files(&self.handle)?)
    }

    /// Register `observer`.
    ///
    /// When the working copy tracks at least one file the observer receives
    /// the full list before this returns.
    pub fn add_observer(
        &mut self,
        mut observer: Box<dyn Observer>,
    ) -> Result<ObserverId, MirrorError> {
        let files = self.tracked_files()?;
        if !files.is_empty() {
            observer.on_full_list(&self.config.local_path, &files);
        }
        Ok(self.observers.insert(observer))
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        self.observers.remove(id)
    }

    /// Run one update cycle in response to a webhook payload.
    ///
    /// Failures are logged and reported in the returned outcome; they never
    /// reach observers.
    pub fn trigger(&mut self, payload: &[u8]) -> CycleOutcome {
        let path = self.config.local_path.display().to_string();
        info!(%path, "webhook triggered");

        if !self.config.token.permits(payload) {
            error!(%path, "webhook payload does not contain the token; ignoring");
            return CycleOutcome::Unauthorized;
        }

        let diff = match self.update() {
            Ok(diff) => diff,
            Err(e) => {
                if e.operation == Operation::Reset {
                    // FETCH_HEAD has advanced but the working tree has not.
                    warn!(
                        %path,
                        "working copy lags the fetched head until the next successful update"
                    );
                }
                error!(%path, error = %e, "repository update failed");
                return CycleOutcome::Aborted(e);
            }
        };
        info!(
            %path,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "finished updating repository"
        );

        if diff.is_empty() {
            return CycleOutcome::Unchanged;
        }

        let observers = self.notify(&diff);
        CycleOutcome::Notified { diff, observers }
    }

    fn update(&mut self) -> Result<FileDiff, EngineError> {
        self.engine
            .fetch(&mut self.handle, self.config.credentials.as_ref())?;
        let diff = self.engine.diff_to_fetch_head(&self.handle)?;
        self.engine.reset_to_fetch_head(&mut self.handle)?;
        Ok(diff)
    }

    fn notify(&mut self, diff: &FileDiff) -> usize {
        if self.observers.is_empty() {
            debug!(path = %self.config.local_path.display(), "no observers registered");
            return 0;
        }
        let mut notified = 0;
        for observer in self.observers.iter_mut() {
            observer.on_diff(&self.config.local_path, diff);
            notified += 1;
        }
        notified
    }
}

fn check_directory(path: &Path) -> Result<(), MirrorError> {
    let metadata = std::fs::metadata(path).map_err(|source| MirrorError::Inaccessible {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(MirrorError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
