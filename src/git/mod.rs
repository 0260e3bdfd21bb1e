//! The version-control engine the mirror is built on.
//!
//! [`Engine`] describes the handful of primitives the mirror needs (clone,
//! open, fetch, tree diff, hard reset, index listing).  [`Git2Engine`] is the
//! libgit2-backed implementation used in production.

pub mod diff;
pub mod engine;
#[cfg(test)]
pub(crate) mod fixture;

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::credentials::Credentials;

pub use diff::{Change, FileDiff};
pub use engine::{Git2Engine, RepositoryHandle};

/// Name of the remote every mirror fetches from.
pub const REMOTE_NAME: &str = "origin";

/// The reference a fetch leaves pointing at the retrieved remote head.
pub const FETCH_HEAD: &str = "FETCH_HEAD";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The engine primitive that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Clone,
    Open,
    Fetch,
    Diff,
    Reset,
    ListFiles,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clone => "clone",
            Self::Open => "open",
            Self::Fetch => "fetch",
            Self::Diff => "diff",
            Self::Reset => "reset",
            Self::ListFiles => "ls-files",
        };
        f.write_str(name)
    }
}

/// A failed engine primitive, including rejected credential negotiation.
#[derive(Debug, Error)]
#[error("git {operation} failed: {source}")]
pub struct EngineError {
    pub operation: Operation,
    #[source]
    pub source: git2::Error,
}

impl EngineError {
    pub fn new(operation: Operation, source: git2::Error) -> Self {
        Self { operation, source }
    }

    /// Adapter for `map_err`.
    pub(crate) fn during(operation: Operation) -> impl Fn(git2::Error) -> Self {
        move |source| Self::new(operation, source)
    }
}

// ---------------------------------------------------------------------------
// Engine capability
// ---------------------------------------------------------------------------

/// Primitives against one on-disk repository.
///
/// Every method is blocking.  `Handle` owns the open repository and releases
/// it when dropped.
pub trait Engine: Send {
    type Handle: Send;

    /// Whether `path` itself is a repository.  Parent directories are not
    /// searched.
    fn repository_exists(&self, path: &Path) -> bool;

    /// Clone `url` into `path`.  Credentials are offered only if supplied.
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<Self::Handle, EngineError>;

    fn open(&self, path: &Path) -> Result<Self::Handle, EngineError>;

    /// Fetch from [`REMOTE_NAME`], updating [`FETCH_HEAD`].
    fn fetch(
        &self,
        handle: &mut Self::Handle,
        credentials: Option<&Credentials>,
    ) -> Result<(), EngineError>;

    /// File-level changes between `HEAD` and [`FETCH_HEAD`].
    fn diff_to_fetch_head(&self, handle: &Self::Handle) -> Result<FileDiff, EngineError>;

    /// `git reset --hard FETCH_HEAD`.
    fn reset_to_fetch_head(&self, handle: &mut Self::Handle) -> Result<(), EngineError>;

    /// Every path in the index, in index order.
    fn tracked_files(&self, handle: &Self::Handle) -> Result<Vec<String>, EngineError>;
}
