/// Local filesystem storage backend.
///
/// Keeps the whole board (title + column documents) in one JSON file:
/// - Atomic writes (write to .tmp, fsync, rename)
/// - SHA-256 content hash to notice writes made by other processes
/// - Self-write suppression for the file watcher
/// - Mutex-guarded commits so read-apply-write never interleaves
///
/// When the file changed on disk since we last read it, the incoming write
/// is applied on top of the fresh disk state instead of our cached copy.
/// Writes are per column document, so this is last-write-wins per column,
/// the same rule a remote document store applies.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use super::{
    ColumnPatch, ColumnStore, OrderEntry, SnapshotHub, StorageError, StorageWrite, Subscription,
    TasksWrite,
};
use crate::events::BoardChangeEvent;
use crate::types::{ColumnId, Snapshot};
use crate::watcher::self_write::SelfWriteTracker;

pub struct LocalStorage {
    file_path: PathBuf,
    hub: SnapshotHub,
    /// SHA-256 of the last read/written content
    content_hash: RwLock<String>,
    write_lock: Mutex<()>,
    self_write_tracker: Mutex<SelfWriteTracker>,
}

impl LocalStorage {
    /// Open a board file, creating it (and its directory) with an empty
    /// board when it does not exist yet.
    pub fn open(file_path: &Path) -> Result<Self, StorageError> {
        let (snapshot, content) = if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            (serde_json::from_str::<Snapshot>(&content)?, content)
        } else {
            if let Some(dir) = file_path.parent() {
                fs::create_dir_all(dir)?;
            }
            let snapshot = Snapshot::default();
            let content = serde_json::to_string_pretty(&snapshot)?;
            Self::atomic_write(file_path, &content)?;
            log::info!("[quadro.storage.local] Created new board file {:?}", file_path);
            (snapshot, content)
        };

        let file_path = fs::canonicalize(file_path).unwrap_or_else(|_| file_path.to_path_buf());
        log::info!(
            "[quadro.storage.local] Opened {:?} ({} columns, {} tasks)",
            file_path,
            snapshot.columns.len(),
            snapshot.task_count()
        );

        Ok(Self {
            file_path,
            hub: SnapshotHub::new(snapshot),
            content_hash: RwLock::new(Self::content_hash(&content)),
            write_lock: Mutex::new(()),
            self_write_tracker: Mutex::new(SelfWriteTracker::new()),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Version of the current canonical snapshot (for ETag support).
    pub fn version(&self) -> u64 {
        self.hub.current().version
    }

    pub fn content_hash_value(&self) -> String {
        self.content_hash.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events(&self) -> broadcast::Receiver<BoardChangeEvent> {
        self.hub.events()
    }

    pub fn event_sender(&self) -> broadcast::Sender<BoardChangeEvent> {
        self.hub.event_sender()
    }

    /// Compute SHA-256 hash of content (for change detection).
    fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.replace("\r\n", "\n").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check if a file change is one of our own writes. A match consumes
    /// the fingerprint.
    pub fn check_self_write(&self) -> bool {
        match fs::read_to_string(&self.file_path) {
            Ok(content) => self
                .self_write_tracker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .check_and_consume(&content),
            Err(_) => false,
        }
    }

    pub fn cleanup_expired_fingerprints(&self) {
        self.self_write_tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cleanup_expired();
    }

    /// Re-read the board file after an external change. Returns whether the
    /// content differed from what we last saw (and was published).
    pub fn reload(&self) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let content = fs::read_to_string(&self.file_path)?;
        let hash = Self::content_hash(&content);
        if hash == self.content_hash_value() {
            return Ok(false);
        }

        let snapshot: Snapshot = serde_json::from_str(&content)?;
        *self.content_hash.write().unwrap_or_else(|e| e.into_inner()) = hash;
        let version = self
            .hub
            .publish(snapshot, |version| BoardChangeEvent::Reloaded { version });
        log::info!("[quadro.storage.reload] Board file changed externally, now at version {}", version);
        Ok(true)
    }

    fn commit(&self, write: StorageWrite) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = (*self.hub.current().snapshot).clone();

        // Read current disk content to check for foreign writes
        if let Ok(disk_content) = fs::read_to_string(&self.file_path) {
            if Self::content_hash(&disk_content) != self.content_hash_value() {
                log::info!("[quadro.storage.rebase] Board file changed on disk, applying write on top of it");
                next = serde_json::from_str(&disk_content)?;
            }
        }

        write.apply(&mut next)?;
        let content = serde_json::to_string_pretty(&next)?;

        // Register fingerprint for self-write detection
        self.self_write_tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .register(&content);

        Self::atomic_write(&self.file_path, &content)?;
        *self.content_hash.write().unwrap_or_else(|e| e.into_inner()) = Self::content_hash(&content);

        let version = self.hub.publish(next, |version| write.change_event(version));
        log::debug!(
            "[quadro.storage.commit] {:?} committed as version {}",
            write.columns(),
            version
        );
        Ok(())
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    /// Refuses to write empty content over a non-empty file (data safety).
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        if content.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(path) {
                if !existing.trim().is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Refusing to overwrite non-empty board file with empty content",
                    ));
                }
            }
        }

        let tmp_path = path.with_extension("quadro.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        // fsync directory for rename durability
        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

impl ColumnStore for LocalStorage {
    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    async fn write_column(&self, column_id: &ColumnId, patch: ColumnPatch) -> Result<(), StorageError> {
        self.commit(StorageWrite::Column {
            column_id: column_id.clone(),
            patch,
        })
    }

    async fn batch_write_column_orders(&self, entries: Vec<OrderEntry>) -> Result<(), StorageError> {
        self.commit(StorageWrite::ColumnOrders(entries))
    }

    async fn delete_column(&self, column_id: &ColumnId) -> Result<(), StorageError> {
        self.commit(StorageWrite::DeleteColumn(column_id.clone()))
    }

    async fn write_board_title(&self, title: &str) -> Result<(), StorageError> {
        self.commit(StorageWrite::Title(title.to_string()))
    }

    /// The whole board is one file, so any batch is one atomic rename.
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn batch_write_tasks(&self, writes: Vec<TasksWrite>) -> Result<(), StorageError> {
        self.commit(StorageWrite::Tasks(writes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Task};
    use serde_json::json;
    use tempfile::TempDir;

    const TEST_BOARD: &str = r#"{
  "title": "Team board",
  "columns": [
    {"id": "todo", "title": "To Do", "order": 0, "emoji": "📝",
     "tasks": [{"id": 1700000000001, "content": "Buy groceries", "votes": 2, "votedBy": ["u1", "u2"]},
               {"id": "t2", "content": "Walk the dog", "priority": "HIGH"}]},
    {"id": "done", "title": "Done", "order": 1, "tasks": []}
  ]
}"#;

    fn board_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("board.json");
        fs::write(&path, TEST_BOARD).unwrap();
        path
    }

    #[test]
    fn test_open_existing_board() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(&board_file(&dir)).unwrap();

        let snapshot = storage.subscribe().snapshot();
        assert_eq!(snapshot.title, "Team board");
        assert_eq!(snapshot.columns.len(), 2);
        assert_eq!(snapshot.columns[0].tasks[0].id.as_str(), "1700000000001");
    }

    #[test]
    fn test_open_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("board.json");
        let storage = LocalStorage::open(&path).unwrap();

        assert!(path.exists());
        assert!(storage.subscribe().snapshot().columns.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = board_file(&dir);
        let storage = LocalStorage::open(&path).unwrap();

        let tasks = vec![Task::new("c", "3"), Task::new("a", "1"), Task::new("b", "2")];
        storage
            .write_column(&ColumnId::from("done"), ColumnPatch::tasks(tasks))
            .await
            .unwrap();

        let reopened = LocalStorage::open(&path).unwrap();
        let snapshot = reopened.subscribe().snapshot();
        let ids: Vec<&str> = snapshot
            .column(&ColumnId::from("done"))
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        // untouched payload survives the rewrite
        let todo = snapshot.column(&ColumnId::from("todo")).unwrap();
        assert_eq!(todo.meta.get("emoji"), Some(&json!("📝")));
        assert_eq!(todo.tasks[1].payload.get("priority"), Some(&json!("HIGH")));
    }

    #[tokio::test]
    async fn test_own_write_is_recognized() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(&board_file(&dir)).unwrap();

        storage.write_board_title("Renamed").await.unwrap();
        assert!(storage.check_self_write());
        assert!(!storage.check_self_write());
    }

    #[tokio::test]
    async fn test_reload_picks_up_foreign_write() {
        let dir = TempDir::new().unwrap();
        let path = board_file(&dir);
        let storage = LocalStorage::open(&path).unwrap();
        let mut sub = storage.subscribe();

        let mut foreign = storage.subscribe().snapshot().as_ref().clone();
        foreign.columns.push(Column::new("review", "Review", 2));
        fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();

        assert!(!storage.check_self_write());
        assert!(storage.reload().unwrap());
        assert!(!storage.reload().unwrap());

        let published = sub.changed().await.unwrap();
        assert_eq!(published.snapshot.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_write_rebases_on_foreign_change() {
        let dir = TempDir::new().unwrap();
        let path = board_file(&dir);
        let storage = LocalStorage::open(&path).unwrap();

        // Another process renames the board without us reloading
        let mut foreign = storage.subscribe().snapshot().as_ref().clone();
        foreign.title = "Renamed elsewhere".to_string();
        fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();

        storage
            .write_column(&ColumnId::from("done"), ColumnPatch::tasks(vec![Task::new("t9", "z")]))
            .await
            .unwrap();

        let snapshot = storage.subscribe().snapshot();
        assert_eq!(snapshot.title, "Renamed elsewhere");
        assert_eq!(snapshot.column(&ColumnId::from("done")).unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_column_write_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = board_file(&dir);
        let storage = LocalStorage::open(&path).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let err = storage
            .write_column(&ColumnId::from("ghost"), ColumnPatch::tasks(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ColumnMissing(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }
}
