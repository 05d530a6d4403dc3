/// File watcher using notify-debouncer-full.
///
/// Watches the board file so that writes made by other processes sharing
/// the same file reach this process's subscribers. Events are emitted on a
/// broadcast channel; self-write filtering happens in `LocalStorage`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::types::FileChangeEvent;

const DEBOUNCE_DURATION: Duration = Duration::from_millis(300);

pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    /// canonical paths of watched files
    files: Arc<RwLock<HashSet<PathBuf>>>,
    /// parent directories already registered with the debouncer
    watched_dirs: HashSet<PathBuf>,
}

impl FileWatcher {
    /// Create a watcher and the receiver for its events.
    pub fn new() -> Result<(Self, broadcast::Receiver<FileChangeEvent>), notify::Error> {
        let (event_tx, event_rx) = broadcast::channel(64);
        let files = Arc::new(RwLock::new(HashSet::new()));

        let files_clone = files.clone();

        let debouncer = new_debouncer(
            DEBOUNCE_DURATION,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        handle_debounced_event(&event, &files_clone, &event_tx);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        log::error!("[quadro.watcher.error] Watch error: {}", e);
                    }
                }
            },
        )?;

        Ok((
            Self {
                _debouncer: debouncer,
                files,
                watched_dirs: HashSet::new(),
            },
            event_rx,
        ))
    }

    /// Start watching a file. The parent directory is watched so that
    /// rename-over-write (atomic save) is seen as a change to the file.
    pub fn watch_file(&mut self, path: &Path) -> Result<(), notify::Error> {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(canonical.clone());

        if let Some(parent) = canonical.parent() {
            if self.watched_dirs.insert(parent.to_path_buf()) {
                self._debouncer.watch(parent, RecursiveMode::NonRecursive)?;
            }
        }
        log::info!("[quadro.watcher.file] Watching {:?}", canonical);
        Ok(())
    }
}

fn handle_debounced_event(
    event: &DebouncedEvent,
    files: &Arc<RwLock<HashSet<PathBuf>>>,
    tx: &broadcast::Sender<FileChangeEvent>,
) {
    use notify::EventKind;

    let watched = files.read().unwrap_or_else(|e| e.into_inner());
    for path in &event.paths {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        if !watched.contains(&canonical) {
            continue;
        }

        let change = match event.kind {
            EventKind::Remove(_) => FileChangeEvent::Deleted { path: canonical },
            EventKind::Create(_) => FileChangeEvent::Created { path: canonical },
            EventKind::Access(_) => continue,
            _ => FileChangeEvent::Modified { path: canonical },
        };

        if let Err(e) = tx.send(change) {
            log::warn!("[quadro.watcher.send] No receivers: {}", e);
        }
    }
}
