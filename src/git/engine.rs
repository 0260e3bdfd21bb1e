//! libgit2-backed [`Engine`] implementation.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{ErrorCode, FetchOptions, Repository, RepositoryOpenFlags, ResetType};
use tracing::{debug, instrument};

use super::{Change, Engine, EngineError, FileDiff, Operation, FETCH_HEAD, REMOTE_NAME};
use crate::credentials::{self, Credentials};

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Exclusive ownership of one open working copy.
///
/// Dropping the handle closes the repository.
pub struct RepositoryHandle {
    repo: Repository,
    path: PathBuf,
}

impl RepositoryHandle {
    fn new(repo: Repository, path: &Path) -> Self {
        Self {
            repo,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for RepositoryHandle {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "releasing repository handle");
    }
}

fn fetch_options(credentials: Option<&Credentials>) -> FetchOptions<'_> {
    let mut options = FetchOptions::new();
    if let Some(credentials) = credentials {
        options.remote_callbacks(credentials::remote_callbacks(credentials));
    }
    options
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// [`Engine`] over libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Engine;

impl Engine for Git2Engine {
    type Handle = RepositoryHandle;

    fn repository_exists(&self, path: &Path) -> bool {
        Repository::open_ext(
            path,
            RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&OsStr>(),
        )
        .is_ok()
    }

    #[instrument(skip(self, credentials), fields(path = %path.display()))]
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<RepositoryHandle, EngineError> {
        let repo = RepoBuilder::new()
            .fetch_options(fetch_options(credentials))
            .clone(url, path)
            .map_err(EngineError::during(Operation::Clone))?;
        debug!("clone completed");
        Ok(RepositoryHandle::new(repo, path))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn open(&self, path: &Path) -> Result<RepositoryHandle, EngineError> {
        let repo = Repository::open(path).map_err(EngineError::during(Operation::Open))?;
        Ok(RepositoryHandle::new(repo, path))
    }

    #[instrument(skip_all, fields(path = %handle.path.display()))]
    fn fetch(
        &self,
        handle: &mut RepositoryHandle,
        credentials: Option<&Credentials>,
    ) -> Result<(), EngineError> {
        let during = EngineError::during(Operation::Fetch);
        let mut remote = handle.repo.find_remote(REMOTE_NAME).map_err(&during)?;
        let mut options = fetch_options(credentials);
        remote
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(&during)?;
        let stats = remote.stats();
        debug!(
            received_objects = stats.received_objects(),
            received_bytes = stats.received_bytes(),
            "fetch completed"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(path = %handle.path.display()))]
    fn diff_to_fetch_head(&self, handle: &RepositoryHandle) -> Result<FileDiff, EngineError> {
        let during = EngineError::during(Operation::Diff);
        let repo = &handle.repo;
        // A clone of an empty remote has no HEAD commit yet; diff against
        // the empty tree so every fetched file counts as added.
        let old_tree = match repo.head() {
            Ok(head) => Some(head.peel_to_tree().map_err(&during)?),
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(during(e)),
        };
        let new_tree = repo
            .revparse_single(FETCH_HEAD)
            .and_then(|object| object.peel_to_tree())
            .map_err(&during)?;
        let diff = repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)
            .map_err(&during)?;
        let file_diff: FileDiff = diff.deltas().map(|delta| Change::from_delta(&delta)).collect();
        debug!(
            added = file_diff.added.len(),
            removed = file_diff.removed.len(),
            "computed diff against fetched head"
        );
        Ok(file_diff)
    }

    #[instrument(skip_all, fields(path = %handle.path.display()))]
    fn reset_to_fetch_head(&self, handle: &mut RepositoryHandle) -> Result<(), EngineError> {
        let during = EngineError::during(Operation::Reset);
        let repo = &handle.repo;
        let oid = repo.refname_to_id(FETCH_HEAD).map_err(&during)?;
        let commit = repo.find_commit(oid).map_err(&during)?;
        repo.reset(commit.as_object(), ResetType::Hard, None)
            .map_err(&during)?;
        debug!(%oid, "working copy reset to fetched head");
        Ok(())
    }

    fn tracked_files(&self, handle: &RepositoryHandle) -> Result<Vec<String>, EngineError> {
        let during = EngineError::during(Operation::ListFiles);
        let mut index = handle.repo.index().map_err(&during)?;
        index.read(false).map_err(&during)?;
        Ok(index
            .iter()
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
