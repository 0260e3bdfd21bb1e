//! Throwaway repositories that stand in for a remote in tests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use git2::{Commit, Oid, Repository, Signature};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub(crate) struct RemoteFixture {
    repo: Repository,
    dir: TempDir,
}

impl RemoteFixture {
    /// Initialise a repository with one commit containing `files`.
    pub(crate) fn new(files: &[(&str, &str)]) -> Self {
        let fixture = Self::empty();
        fixture.commit(files, &[]);
        fixture
    }

    /// Initialise a repository whose `HEAD` is still unborn.
    pub(crate) fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut cfg = repo.config().unwrap();
        cfg.set_str("user.name", "Test").unwrap();
        cfg.set_str("user.email", "test@test.com").unwrap();
        Self { repo, dir }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn url(&self) -> String {
        self.dir.path().to_str().unwrap().to_string()
    }

    pub(crate) fn head(&self) -> Oid {
        self.repo.head().unwrap().target().unwrap()
    }

    /// Write `writes`, delete `deletes`, and commit the result on `HEAD`.
    pub(crate) fn commit(&self, writes: &[(&str, &str)], deletes: &[&str]) -> Oid {
        let mut index = self.repo.index().unwrap();
        for (path, contents) in writes {
            let full = self.dir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, contents).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in deletes {
            std::fs::remove_file(self.dir.path().join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, "update", &tree, &parents)
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// HTTP remote
// ---------------------------------------------------------------------------

/// An HTTP endpoint that answers every request with `respond(request_head)`
/// and closes the connection. Request heads are recorded in arrival order.
pub(crate) struct HttpRemote {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl HttpRemote {
    pub(crate) async fn start(respond: fn(&str) -> &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let head = read_request_head(&mut stream).await;
                let response = respond(&head);
                seen.lock().unwrap().push(head);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        Self {
            addr,
            requests,
            task,
        }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}/repo.git", self.addr)
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for HttpRemote {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}
