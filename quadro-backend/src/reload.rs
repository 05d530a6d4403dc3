/// Reloads the board when another process rewrites the data file.
///
/// Our own atomic writes also trigger the watcher; those are recognised by
/// their content fingerprint and skipped.
use std::sync::Arc;
use std::time::Duration;

use quadro_core::storage::local::LocalStorage;
use quadro_core::watcher::file_watcher::FileWatcher;
use quadro_core::watcher::types::FileChangeEvent;
use tokio::sync::{broadcast, watch};

const FINGERPRINT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Start watching the board file. The returned watcher must be kept alive
/// for as long as events should flow.
pub fn spawn(storage: Arc<LocalStorage>, mut shutdown_rx: watch::Receiver<bool>) -> Option<FileWatcher> {
    let (mut watcher, mut event_rx) = match FileWatcher::new() {
        Ok(created) => created,
        Err(e) => {
            log::warn!("[quadro.watcher] Failed to create file watcher: {}", e);
            return None;
        }
    };
    if let Err(e) = watcher.watch_file(storage.file_path()) {
        log::warn!("[quadro.watcher] Failed to watch {:?}: {}", storage.file_path(), e);
        return None;
    }

    tokio::spawn(async move {
        let mut cleanup = tokio::time::interval(FINGERPRINT_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    match result {
                        Ok(event) => handle_file_event(&storage, &event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("[quadro.watcher] Lagged by {} events, reloading", n);
                            handle_file_event(&storage, &FileChangeEvent::Modified {
                                path: storage.file_path().to_path_buf(),
                            });
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            log::info!("[quadro.watcher] Event channel closed");
                            break;
                        }
                    }
                }
                _ = cleanup.tick() => storage.cleanup_expired_fingerprints(),
                _ = shutdown_rx.changed() => {
                    log::info!("[quadro.watcher] Shutdown signal received");
                    break;
                }
            }
        }
    });

    Some(watcher)
}

fn handle_file_event(storage: &LocalStorage, event: &FileChangeEvent) {
    if let FileChangeEvent::Deleted { path } = event {
        log::warn!("[quadro.watcher] Board file {:?} was deleted; keeping in-memory board", path);
        return;
    }
    if storage.check_self_write() {
        log::debug!("[quadro.watcher] Suppressed self-write");
        return;
    }
    match storage.reload() {
        Ok(true) => log::info!("[quadro.watcher] Reloaded board after external change"),
        Ok(false) => log::debug!("[quadro.watcher] File event without content change"),
        Err(e) => log::warn!("[quadro.watcher] Failed to reload board: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadro_core::storage::ColumnPatch;
    use quadro_core::{ColumnId, ColumnStore, Snapshot};
    use quadro_core::types::Column;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> LocalStorage {
        let path = dir.path().join("board.json");
        let board = Snapshot::new(vec![Column::new("todo", "To Do", 0)]);
        std::fs::write(&path, serde_json::to_string_pretty(&board).unwrap()).unwrap();
        LocalStorage::open(&path).unwrap()
    }

    #[tokio::test]
    async fn test_own_write_is_not_reloaded() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        storage
            .write_column(&ColumnId::from("todo"), ColumnPatch::title("Backlog"))
            .await
            .unwrap();
        let version = storage.version();

        handle_file_event(&storage, &FileChangeEvent::Modified {
            path: storage.file_path().to_path_buf(),
        });
        assert_eq!(storage.version(), version);
    }

    #[test]
    fn test_external_write_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        let mut events = storage.events();

        let edited = Snapshot::new(vec![Column::new("todo", "Edited elsewhere", 0)]);
        std::fs::write(storage.file_path(), serde_json::to_string(&edited).unwrap()).unwrap();
        handle_file_event(&storage, &FileChangeEvent::Modified {
            path: storage.file_path().to_path_buf(),
        });

        assert_eq!(storage.subscribe().snapshot().columns[0].title, "Edited elsewhere");
        assert!(matches!(
            events.try_recv().unwrap(),
            quadro_core::events::BoardChangeEvent::Reloaded { .. }
        ));
    }

    #[test]
    fn test_deleted_file_keeps_board() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir);
        std::fs::remove_file(storage.file_path()).unwrap();
        handle_file_event(&storage, &FileChangeEvent::Deleted {
            path: storage.file_path().to_path_buf(),
        });
        assert_eq!(storage.subscribe().snapshot().columns.len(), 1);
    }
}
