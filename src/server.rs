use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use jobledger::api::{self, AppState};
use jobledger::config::Config;
use jobledger::repository::{self, LedgerRepository, RepositoryOptions};
use jobledger::trimmer;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn open_repository(config: &Config) -> Result<LedgerRepository, AnyError> {
    info!(
        backend = ?config.storage.backend,
        path = %config.storage.path.display(),
        "Opening job store"
    );
    let store = repository::open_store(&config.storage)
        .map_err(|e| format!("Failed to open store: {}", e))?;

    let repository = LedgerRepository::open(store, RepositoryOptions::from_config(config))
        .map_err(|e| format!("Failed to open repository: {}", e))?;
    Ok(repository)
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let repository = open_repository(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trimmer = config.trimmer.enabled.then(|| {
        trimmer::spawn(
            repository.clone(),
            config.trimmer.interval.as_duration(),
            shutdown_rx,
        )
    });

    let state = AppState::new(config, repository.clone());
    let app = api::router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Job ledger API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = trimmer {
        if let Err(err) = handle.await {
            warn!(error = %err, "Trimmer task ended abnormally");
        }
    }

    repository.persist().await?;
    info!("Job ledger stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
