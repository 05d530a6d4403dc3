pub mod local;
pub mod memory;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};

use crate::events::BoardChangeEvent;
use crate::types::{Column, ColumnId, Snapshot, Task};

/// Document store holding one document per column plus the board title.
///
/// The store is the only writer of the cached snapshot: every committed
/// write is pushed back through `subscribe()`. Callers never patch their
/// local copy; they wait for the canonical state.
///
/// Implementations: `LocalStorage` (JSON file on disk), `MemoryStorage`
/// (in-process, used by tests).
pub trait ColumnStore: Send + Sync {
    /// Latest canonical snapshot plus change notifications.
    /// Dropping the subscription unsubscribes.
    fn subscribe(&self) -> Subscription;

    /// Merge-write one column document. Only the fields present in the
    /// patch change. Writing a column that does not exist creates it only
    /// when the patch carries a title.
    fn write_column(
        &self,
        column_id: &ColumnId,
        patch: ColumnPatch,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Rewrite `order` on several columns as one all-or-nothing batch.
    fn batch_write_column_orders(
        &self,
        entries: Vec<OrderEntry>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn delete_column(
        &self,
        column_id: &ColumnId,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn write_board_title(&self, title: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Whether `batch_write_tasks` is available.
    fn supports_transactions(&self) -> bool;

    /// Replace the task sequences of several columns in one transaction.
    fn batch_write_tasks(
        &self,
        writes: Vec<TasksWrite>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Column document missing: {0}")]
    ColumnMissing(ColumnId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid board document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

/// New `order` value for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEntry {
    pub column_id: ColumnId,
    pub order: i64,
}

/// Full replacement of one column's task sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TasksWrite {
    pub column_id: ColumnId,
    pub tasks: Vec<Task>,
}

/// Partial column fields for a merge-write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPatch {
    pub title: Option<String>,
    pub order: Option<i64>,
    pub tasks: Option<Vec<Task>>,
    /// Display metadata, merged key by key.
    pub meta: Map<String, Value>,
}

impl ColumnPatch {
    pub fn tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    fn apply(&self, column: &mut Column) {
        if let Some(title) = &self.title {
            column.title = title.clone();
        }
        if let Some(order) = self.order {
            column.order = order;
        }
        if let Some(tasks) = &self.tasks {
            column.tasks = tasks.clone();
        }
        for (key, value) in &self.meta {
            column.meta.insert(key.clone(), value.clone());
        }
    }
}

/// One committed mutation, as recorded by the stores.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageWrite {
    Title(String),
    Column {
        column_id: ColumnId,
        patch: ColumnPatch,
    },
    ColumnOrders(Vec<OrderEntry>),
    DeleteColumn(ColumnId),
    Tasks(Vec<TasksWrite>),
}

impl StorageWrite {
    /// Column documents this write touches.
    pub fn columns(&self) -> Vec<&ColumnId> {
        match self {
            StorageWrite::Title(_) => Vec::new(),
            StorageWrite::Column { column_id, .. } | StorageWrite::DeleteColumn(column_id) => {
                vec![column_id]
            }
            StorageWrite::ColumnOrders(entries) => entries.iter().map(|e| &e.column_id).collect(),
            StorageWrite::Tasks(writes) => writes.iter().map(|w| &w.column_id).collect(),
        }
    }

    /// Apply to a snapshot. Batches are checked in full before anything is
    /// changed, so a failed batch leaves the snapshot untouched.
    pub fn apply(&self, snapshot: &mut Snapshot) -> Result<(), StorageError> {
        match self {
            StorageWrite::Title(title) => {
                snapshot.title = title.clone();
            }
            StorageWrite::Column { column_id, patch } => match snapshot.column_mut(column_id) {
                Some(column) => patch.apply(column),
                None if patch.title.is_some() => {
                    let mut column = Column::new(column_id.clone(), String::new(), 0);
                    patch.apply(&mut column);
                    snapshot.columns.push(column);
                }
                None => return Err(StorageError::ColumnMissing(column_id.clone())),
            },
            StorageWrite::ColumnOrders(entries) => {
                Self::ensure_present(snapshot, entries.iter().map(|e| &e.column_id))?;
                for entry in entries {
                    if let Some(column) = snapshot.column_mut(&entry.column_id) {
                        column.order = entry.order;
                    }
                }
            }
            StorageWrite::DeleteColumn(column_id) => {
                snapshot.columns.retain(|c| &c.id != column_id);
            }
            StorageWrite::Tasks(writes) => {
                Self::ensure_present(snapshot, writes.iter().map(|w| &w.column_id))?;
                for write in writes {
                    if let Some(column) = snapshot.column_mut(&write.column_id) {
                        column.tasks = write.tasks.clone();
                    }
                }
            }
        }
        Ok(())
    }

    fn ensure_present<'a, I>(snapshot: &Snapshot, ids: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = &'a ColumnId>,
    {
        for id in ids {
            if !snapshot.contains_column(id) {
                return Err(StorageError::ColumnMissing(id.clone()));
            }
        }
        Ok(())
    }

    /// Event announced to listeners once this write is committed.
    pub fn change_event(&self, version: u64) -> BoardChangeEvent {
        match self {
            StorageWrite::Title(title) => BoardChangeEvent::TitleChanged {
                title: title.clone(),
                version,
            },
            StorageWrite::Column { column_id, .. } => BoardChangeEvent::ColumnWritten {
                column_id: column_id.clone(),
                version,
            },
            StorageWrite::ColumnOrders(entries) => BoardChangeEvent::ColumnOrdersWritten {
                column_ids: entries.iter().map(|e| e.column_id.clone()).collect(),
                version,
            },
            StorageWrite::DeleteColumn(column_id) => BoardChangeEvent::ColumnDeleted {
                column_id: column_id.clone(),
                version,
            },
            StorageWrite::Tasks(writes) => BoardChangeEvent::TasksWritten {
                column_ids: writes.iter().map(|w| w.column_id.clone()).collect(),
                version,
            },
        }
    }
}

/// A committed snapshot with the version it was published under.
#[derive(Debug, Clone)]
pub struct Published {
    pub version: u64,
    pub snapshot: Arc<Snapshot>,
}

/// Live view of a store's canonical state.
#[derive(Debug, Clone)]
pub struct Subscription {
    rx: watch::Receiver<Published>,
}

impl Subscription {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.rx.borrow().snapshot.clone()
    }

    pub fn version(&self) -> u64 {
        self.rx.borrow().version
    }

    pub fn current(&self) -> Published {
        self.rx.borrow().clone()
    }

    /// Wait for the next committed snapshot. Returns `None` once the store
    /// has been dropped.
    pub async fn changed(&mut self) -> Option<Published> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

/// Fan-out of committed state shared by the store implementations:
/// the latest snapshot on a watch channel, change events on a broadcast
/// channel (consumed by the SSE endpoint).
pub struct SnapshotHub {
    state_tx: watch::Sender<Published>,
    event_tx: broadcast::Sender<BoardChangeEvent>,
    /// Monotonic version counter, incremented on every publish
    next_version: AtomicU64,
}

impl SnapshotHub {
    pub fn new(initial: Snapshot) -> Self {
        let (state_tx, _) = watch::channel(Published {
            version: 0,
            snapshot: Arc::new(initial),
        });
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state_tx,
            event_tx,
            next_version: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.state_tx.subscribe(),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<BoardChangeEvent> {
        self.event_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<BoardChangeEvent> {
        self.event_tx.clone()
    }

    pub fn current(&self) -> Published {
        self.state_tx.borrow().clone()
    }

    /// Replace the canonical snapshot and announce it.
    pub fn publish<F>(&self, snapshot: Snapshot, event: F) -> u64
    where
        F: FnOnce(u64) -> BoardChangeEvent,
    {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.state_tx.send_replace(Published {
            version,
            snapshot: Arc::new(snapshot),
        });
        if self.event_tx.send(event(version)).is_err() {
            log::debug!("[quadro.storage.publish] No event listeners for version {}", version);
        }
        version
    }
}
