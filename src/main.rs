use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use repomirror::config::{self, RepositoryConfig};
use repomirror::git::Git2Engine;
use repomirror::mirror::{LogObserver, Mirror};
use repomirror::webhook::{ResyncTrigger, RunningListener, TriggerListener};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "repomirror", about = "Webhook-driven Git repository mirror")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

/// How long shutdown waits for an update worker to finish.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Per-repository service
// ---------------------------------------------------------------------------

/// A running mirror: its webhook listener and its update worker.
struct RepositoryService {
    name: String,
    listener: RunningListener,
    worker: JoinHandle<()>,
}

impl RepositoryService {
    async fn start(repo: &RepositoryConfig) -> Result<Self> {
        let name = repo.label();
        let mirror_config = repo.mirror_config();
        let observer_name = name.clone();

        // Clone or fetch+reset; both block on the network.
        let mirror = tokio::task::spawn_blocking(move || -> Result<Mirror> {
            let mut mirror = Mirror::new(Git2Engine, mirror_config)?;
            mirror.add_observer(Box::new(LogObserver::new(observer_name)))?;
            Ok(mirror)
        })
        .await
        .context("mirror setup task panicked")??;

        let remote = mirror.remote_url().to_owned();
        let (trigger, worker) = ResyncTrigger::spawn(Arc::new(Mutex::new(mirror))).await;
        let listener = TriggerListener::new(repo.listen_addr(), trigger)
            .start()
            .await?;

        tracing::info!(
            repo = %name,
            %remote,
            listen_addr = %listener.local_addr(),
            "repository mirror ready"
        );
        Ok(Self {
            name,
            listener,
            worker,
        })
    }

    /// Stop accepting triggers and wait up to [`WORKER_DRAIN_TIMEOUT`] for the
    /// worker to finish its current cycle.
    ///
    /// Only the wait is bounded.  A cycle already running on the blocking pool
    /// cannot be cancelled; aborting the worker detaches it, and the runtime
    /// still waits for that cycle's fetch to return before the process exits.
    async fn stop(self) {
        self.listener.stop().await;
        let mut worker = self.worker;
        match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(repo = %self.name, error = %e, "update worker failed"),
            Err(_) => {
                tracing::warn!(repo = %self.name, "update worker did not drain in time; detaching it");
                worker.abort();
            }
        }
        tracing::info!(repo = %self.name, "repository mirror stopped");
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        config_path = %cli.config,
        repositories = config.repositories.len(),
        "starting repomirror"
    );

    // ---- Mirrors ----
    let mut services = Vec::with_capacity(config.repositories.len());
    for repo in &config.repositories {
        let service = RepositoryService::start(repo)
            .await
            .with_context(|| format!("failed to start mirror for {}", repo.label()))?;
        services.push(service);
    }

    // ---- Await shutdown ----
    shutdown_signal().await;

    for service in services {
        service.stop().await;
    }

    tracing::info!("repomirror shut down cleanly");
    Ok(())
}
