/// Shared application state passed to axum handlers.
use std::sync::Arc;

use quadro_core::events::BoardChangeEvent;
use quadro_core::storage::local::LocalStorage;
use quadro_core::BoardService;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<BoardService<LocalStorage>>,
    pub event_tx: broadcast::Sender<BoardChangeEvent>,
    pub port: u16,
    pub bind_address: String,
}

impl AppState {
    pub fn new(board: BoardService<LocalStorage>, port: u16, bind_address: String) -> Self {
        let event_tx = board.store().event_sender();
        Self {
            board: Arc::new(board),
            event_tx,
            port,
            bind_address,
        }
    }
}
