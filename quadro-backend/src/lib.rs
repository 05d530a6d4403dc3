/// Quadro backend: config loading, storage init, file reload and the HTTP server.
pub mod api;
pub mod config;
mod logging;
mod reload;
pub mod server;
pub mod state;

use std::sync::Arc;

use quadro_core::storage::local::LocalStorage;
use quadro_core::{BoardService, StorageError};
use thiserror::Error;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to open board: {0}")]
    Storage(#[from] StorageError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run() -> Result<(), ServerError> {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize backend logger: {}", e);
    }

    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);

    let storage = Arc::new(LocalStorage::open(&config.data_file)?);
    let board = BoardService::new(storage.clone(), config.board.clone());
    log::info!(
        "[quadro.backend] Board {:?} loaded from {:?} ({:?} cross-column writes)",
        board.snapshot().title,
        storage.file_path(),
        config.board.cross_column_writes
    );
    let state = AppState::new(board, config.port, config.bind_address.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Held until the server returns; dropping it stops the notify backend.
    let _watcher = if config.watch_data_file {
        reload::spawn(storage, shutdown_rx.clone())
    } else {
        None
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[quadro.backend] Failed to listen for ctrl-c: {}", e);
            return;
        }
        log::info!("[quadro.backend] Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server::serve(state, shutdown_rx).await?;
    Ok(())
}
