//! Reading-progress sync for e-reader devices.
//!
//! Devices identify a book by a content fingerprint of the file they hold.
//! The checksum ledger remembers every fingerprint a catalog document has
//! ever had, so progress stays reachable after the file is edited, and the
//! progress store keeps the newest reading position per fingerprint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use folio_env::Config;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub mod auth;
pub mod checksum;
pub mod database;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod progress;
pub mod reconcile;
pub mod trace;
pub mod types;

pub use auth::{hash_password, StaticUsers, UserStore};
pub use checksum::{record_checksum, record_checksum_with_algorithm, ChecksumError};
pub use database::{AccessMode, SqliteDatabase};
pub use error::Error;
pub use ledger::ChecksumLedger;
pub use progress::ProgressStore;
pub use reconcile::{
    Catalog, DirectoryCatalog, ReconcileHandle, ReconcileMode, ReconcileReport, Reconciler,
    Representation,
};
pub use types::{
    ChecksumRecord, DocumentId, Format, NewChecksum, ProgressRecord, Resolution, WriteOutcome,
};

/// Collaborators shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn ChecksumLedger>,
    pub progress: Arc<dyn ProgressStore>,
    pub users: Arc<dyn UserStore>,
    /// Answer `404` for fingerprints the ledger cannot resolve, even when
    /// progress exists for them.
    pub require_known_document: bool,
}

impl AppState {
    pub fn new(database: SqliteDatabase, users: Arc<dyn UserStore>, config: &Config) -> Self {
        let database = Arc::new(database);

        Self {
            ledger: database.clone(),
            progress: database,
            users,
            require_known_document: config.sync.require_known_document,
        }
    }
}

/// Information about a running sync server
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub port: u16,
    pub host: String,
}

/// Background tasks of a running server. Dropping the handle stops them.
pub struct ServerHandle {
    pub reconcile: Option<ReconcileHandle>,
    server: Option<JoinHandle<()>>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    gateway::router(state)
}

async fn prepare(config: &Config) -> Result<(Router, ServerHandle)> {
    let database = SqliteDatabase::open(config.database_path(), AccessMode::ReadWrite)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database_path().display()
            )
        })?;

    let users = StaticUsers::from_config(&config.users);
    if users.is_empty() {
        warn!("No users configured, every sync request will be rejected");
    }

    let state = AppState::new(database, Arc::new(users), config);
    let reconcile = spawn_reconcile(config, state.ledger.clone());

    Ok((
        create_app(state),
        ServerHandle {
            reconcile,
            server: None,
        },
    ))
}

fn spawn_reconcile(config: &Config, ledger: Arc<dyn ChecksumLedger>) -> Option<ReconcileHandle> {
    let library = config.reconcile.library.clone()?;
    let interval = config.reconcile.interval_secs?;

    info!(
        library = %library.display(),
        interval_secs = interval,
        "Starting periodic reconciliation"
    );

    let reconciler = Reconciler::new(
        ledger,
        Arc::new(DirectoryCatalog::new(library)),
        config.reconcile.concurrency,
    );
    Some(reconciler.spawn_periodic(Duration::from_secs(interval)))
}

pub async fn run_server(config: Config) -> Result<()> {
    let (app, _handle) = prepare(&config).await?;

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!("Sync server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Sync server stopped");
    Ok(())
}

/// Start a server on a random port for library usage.
/// Returns the address actually bound and the handle of the background tasks.
pub async fn start_server_with_random_port(config: Config) -> Result<(ServerInfo, ServerHandle)> {
    let (app, mut handle) = prepare(&config).await?;

    let listener = tokio::net::TcpListener::bind(format!("{}:0", config.server.host)).await?;
    let actual_addr: SocketAddr = listener.local_addr()?;

    let server_info = ServerInfo {
        port: actual_addr.port(),
        host: config.server.host.clone(),
    };

    info!(
        "Started sync server on {}:{} (random port)",
        server_info.host, server_info.port
    );

    handle.server = Some(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    }));

    Ok((server_info, handle))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
