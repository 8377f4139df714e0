//! Runs the quern task broker.
//!
//! Usage:
//!
//! ```text
//! quern [--config <path>]
//! ```
//!
//! Without `--config` the file named by `QUERN_CONFIG_PATH` is read, falling
//! back to `quern.toml` in the working directory. A missing file leaves the
//! built-in defaults in place.
//!
//! The broker answers mutations with 503 until the snapshot is restored. On
//! `SIGINT` or `SIGTERM` it stops admitting mutations, waits for running
//! requests, writes the snapshot once and exits.

use camino::Utf8PathBuf;
use clap::Parser;
use mockable::DefaultClock;
use quern::config::{BrokerSettings, CONFIG_PATH_ENV, resolve_config_path};
use quern::server::{self, DrainGate, ServerOptions};
use quern::task::adapters::{memory::InMemoryTaskStore, snapshot::SnapshotFile};
use quern::task::services::TaskBrokerService;
use quern::telemetry::{self, FanOutObserver, LoggingTaskObserver, MetricsTaskObserver};
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "quern", version, about = "Pull-based task queue broker")]
struct Cli {
    /// Configuration file to read.
    #[arg(long, short)]
    config: Option<Utf8PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref(), env::var(CONFIG_PATH_ENV).ok());
    let settings = BrokerSettings::load(&config_path)?;
    telemetry::init(settings.log_format, &settings.log_filter)?;
    info!(config = %config_path, "configuration loaded");

    let metrics = telemetry::install_metrics_recorder(&settings.metrics_prefix)?;
    let limits = settings.pool_limits()?;
    info!(
        default_pool_max_size = limits.default_max(),
        metrics_prefix = %settings.metrics_prefix,
        "pool limits loaded"
    );
    let observer = FanOutObserver::default()
        .with(Arc::new(LoggingTaskObserver))
        .with(Arc::new(MetricsTaskObserver::new(&settings.metrics_prefix)));
    let store = Arc::new(
        InMemoryTaskStore::new(Arc::new(DefaultClock), limits).with_observer(Arc::new(observer)),
    );
    let gate = Arc::new(DrainGate::new());
    let app = server::router(
        TaskBrokerService::new(Arc::clone(&store)),
        Arc::clone(&gate),
        ServerOptions::new()
            .with_auth_token(settings.auth_token())
            .with_metrics(metrics)
            .with_worker_metrics(settings.worker_metrics()),
    );

    let listen = settings.listen_addr();
    let listener = TcpListener::bind(listen.as_str()).await?;
    info!(listen = %listen, "listening in safe mode");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_rx.await.ok();
            })
            .await
    });

    let snapshot = settings.snapshot_path().map(SnapshotFile::new);
    if let Some(file) = &snapshot {
        let restored = file.read_into(store.as_ref()).await?;
        info!(path = %file.path(), restored, "snapshot restored");
    }
    gate.open();
    info!("accepting requests");

    wait_for_signal().await?;
    info!("termination signal received, draining");
    gate.close();
    gate.wait_idle().await;

    if let Some(file) = &snapshot {
        let written = file.write(store.as_ref()).await?;
        info!(path = %file.path(), written, "snapshot written");
    }

    if stop_tx.send(()).is_err() {
        warn!("server already stopped");
    }
    serving.await??;
    info!("exit");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
