//! Upstream credential handling.
//!
//! Only plaintext username/password authentication is ever offered to the
//! remote.  Any other kind the remote asks for is refused, which surfaces as a
//! failed clone or fetch.

use std::fmt;

use git2::{Cred, CredentialType, RemoteCallbacks};
use serde::Deserialize;
use tracing::{debug, warn};

/// How many times a single engine call may ask for credentials before the
/// callback gives up.  libgit2 re-invokes the callback after every rejected
/// attempt.
pub(crate) const MAX_ATTEMPTS: usize = 3;

/// A fixed username/password pair for the upstream remote.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Answer one credential request from the remote.
///
/// Succeeds only when `allowed` includes plaintext username/password.
pub fn negotiate(credentials: &Credentials, allowed: CredentialType) -> Result<Cred, git2::Error> {
    if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
        warn!(
            ?allowed,
            "remote requested an unsupported authentication kind; rejecting"
        );
        return Err(git2::Error::from_str(
            "remote requires an authentication kind other than plaintext username/password",
        ));
    }
    Cred::userpass_plaintext(&credentials.username, &credentials.password)
}

/// Build remote callbacks that answer credential requests with `credentials`.
pub fn remote_callbacks(credentials: &Credentials) -> RemoteCallbacks<'_> {
    let mut attempts = 0usize;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, _username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_ATTEMPTS {
            warn!(%url, attempts = MAX_ATTEMPTS, "credentials rejected by remote; giving up");
            return Err(git2::Error::from_str(
                "credentials rejected by remote after repeated attempts",
            ));
        }
        debug!(%url, attempt = attempts, "supplying credentials to remote");
        negotiate(credentials, allowed)
    });
    callbacks
}
