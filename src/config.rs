use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::auth::SharedToken;
use crate::credentials::Credentials;
use crate::mirror::MirrorConfig;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub repositories: Vec<RepositoryConfig>,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// One mirrored repository and the webhook listener that keeps it fresh.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Label used in logs.  Defaults to the local path.
    #[serde(default)]
    pub name: Option<String>,
    /// TCP port the webhook listener binds.
    #[serde(alias = "webhookPort")]
    pub webhook_port: u16,
    /// Address the webhook listener binds.
    #[serde(default = "default_bind_address", alias = "bindAddress")]
    pub bind_address: IpAddr,
    /// Secret that must appear somewhere in each webhook payload.
    #[serde(alias = "webhookToken")]
    pub webhook_token: String,
    /// URL of the upstream repository.
    pub remote: String,
    /// Existing directory holding (or about to hold) the working copy.
    pub path: PathBuf,
    /// Plaintext credentials offered to the remote, if any.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl RepositoryConfig {
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.webhook_port)
    }

    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig {
            remote_url: self.remote.clone(),
            local_path: self.path.clone(),
            token: SharedToken::new(self.webhook_token.clone()),
            credentials: self.credentials.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("invalid config file: {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents).context("failed to parse YAML")?;
    validate_config(&config)?;
    Ok(config)
}

/// Sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        !config.repositories.is_empty(),
        "at least one repository must be configured"
    );

    let mut listeners: Vec<SocketAddr> = Vec::new();
    let mut paths = HashSet::new();
    for repo in &config.repositories {
        let label = repo.label();
        anyhow::ensure!(
            !repo.webhook_token.is_empty(),
            "{label}: webhook_token must not be empty"
        );
        anyhow::ensure!(!repo.remote.is_empty(), "{label}: remote must not be empty");
        anyhow::ensure!(repo.webhook_port != 0, "{label}: webhook_port must not be 0");
        let addr = repo.listen_addr();
        if let Some(other) = listeners.iter().find(|other| listeners_overlap(**other, addr)) {
            anyhow::bail!(
                "{label}: webhook listener {addr} overlaps {other} used by another repository"
            );
        }
        listeners.push(addr);
        anyhow::ensure!(
            paths.insert(repo.path.clone()),
            "{label}: path {} is already used by another repository",
            repo.path.display()
        );
    }
    Ok(())
}

/// Two listeners overlap when they share a port and either binds every
/// interface, or both bind the same address.
fn listeners_overlap(a: SocketAddr, b: SocketAddr) -> bool {
    a.port() == b.port()
        && (a.ip() == b.ip() || a.ip().is_unspecified() || b.ip().is_unspecified())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
repositories:
  - webhook_port: 34343
    webhook_token: s3cret
    remote: https://example.com/scripts.git
    path: /var/lib/repomirror/scripts
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        let repo = &config.repositories[0];
        assert_eq!(repo.listen_addr(), "0.0.0.0:34343".parse::<SocketAddr>().unwrap());
        assert!(repo.credentials.is_none());
        assert_eq!(repo.label(), "/var/lib/repomirror/scripts");
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let yaml = r#"
repositories:
  - name: scripts
    webhookPort: 4000
    webhookToken: s3cret
    remote: https://example.com/scripts.git
    path: /srv/scripts
    credentials:
      username: bot
      password: hunter2
"#;
        let config = parse_config(yaml).unwrap();
        let repo = &config.repositories[0];
        assert_eq!(repo.webhook_port, 4000);
        assert_eq!(repo.label(), "scripts");
        assert_eq!(repo.credentials, Some(Credentials::new("bot", "hunter2")));
    }

    #[test]
    fn mirror_config_carries_repository_settings() {
        let config = parse_config(MINIMAL).unwrap();
        let mirror = config.repositories[0].mirror_config();
        assert_eq!(mirror.remote_url, "https://example.com/scripts.git");
        assert_eq!(mirror.local_path, PathBuf::from("/var/lib/repomirror/scripts"));
        assert!(mirror.token.permits(b"?token=s3cret"));
    }

    #[test]
    fn empty_repository_list_is_rejected() {
        assert!(parse_config("repositories: []\n").is_err());
    }

    #[test]
    fn empty_token_is_rejected() {
        let yaml = MINIMAL.replace("webhook_token: s3cret", "webhook_token: \"\"");
        let err = parse_config(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("webhook_token"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let yaml = MINIMAL.replace("34343", "0");
        assert!(parse_config(&yaml).is_err());
    }

    #[test]
    fn shared_listener_is_rejected() {
        let yaml = r#"
repositories:
  - webhook_port: 4000
    webhook_token: a
    remote: https://example.com/a.git
    path: /srv/a
  - webhook_port: 4000
    webhook_token: b
    remote: https://example.com/b.git
    path: /srv/b
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("overlaps"));
    }

    #[test]
    fn wildcard_listener_overlaps_specific_address_on_same_port() {
        let yaml = r#"
repositories:
  - webhook_port: 4000
    webhook_token: a
    remote: https://example.com/a.git
    path: /srv/a
  - webhook_port: 4000
    bind_address: 127.0.0.1
    webhook_token: b
    remote: https://example.com/b.git
    path: /srv/b
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("overlaps 0.0.0.0:4000"));
    }

    #[test]
    fn distinct_addresses_may_share_a_port() {
        let yaml = r#"
repositories:
  - webhook_port: 4000
    bind_address: 127.0.0.1
    webhook_token: a
    remote: https://example.com/a.git
    path: /srv/a
  - webhook_port: 4000
    bind_address: 127.0.0.2
    webhook_token: b
    remote: https://example.com/b.git
    path: /srv/b
"#;
        assert!(parse_config(yaml).is_ok());
    }

    #[test]
    fn shared_path_is_rejected() {
        let yaml = r#"
repositories:
  - webhook_port: 4000
    webhook_token: a
    remote: https://example.com/a.git
    path: /srv/a
  - webhook_port: 4001
    webhook_token: b
    remote: https://example.com/b.git
    path: /srv/a
"#;
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/repomirror.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/repomirror.yaml"));
    }
}
