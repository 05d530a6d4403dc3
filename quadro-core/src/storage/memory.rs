/// In-process store.
///
/// Behaves like the remote document store from the client's point of view:
/// per-document last-write-wins, atomic batches, canonical state pushed to
/// subscribers after every commit. Also records every committed write and
/// can be told to reject writes touching given columns, which is how the
/// failure paths of the reconciler are exercised.
use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{
    ColumnPatch, ColumnStore, OrderEntry, SnapshotHub, StorageError, StorageWrite, Subscription,
    TasksWrite,
};
use crate::events::BoardChangeEvent;
use crate::types::{ColumnId, Snapshot};

pub struct MemoryStorage {
    hub: SnapshotHub,
    /// Serializes commits so read-apply-publish is never interleaved
    write_lock: Mutex<()>,
    transactional: bool,
    rejected: Mutex<HashSet<ColumnId>>,
    log: Mutex<Vec<StorageWrite>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::default())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            hub: SnapshotHub::new(snapshot),
            write_lock: Mutex::new(()),
            transactional: true,
            rejected: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Behave like a store without multi-document transactions.
    pub fn without_transactions(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Reject every subsequent write that touches `column_id`.
    pub fn reject_writes_to(&self, column_id: impl Into<ColumnId>) {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(column_id.into());
    }

    pub fn accept_all_writes(&self) {
        self.rejected.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Writes committed so far, oldest first.
    pub fn writes(&self) -> Vec<StorageWrite> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events(&self) -> broadcast::Receiver<BoardChangeEvent> {
        self.hub.events()
    }

    pub fn snapshot(&self) -> Snapshot {
        (*self.hub.current().snapshot).clone()
    }

    fn commit(&self, write: StorageWrite) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        {
            let rejected = self.rejected.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(id) = write.columns().into_iter().find(|id| rejected.contains(*id)) {
                return Err(StorageError::Rejected(format!("column {} is read-only", id)));
            }
        }

        let mut next = (*self.hub.current().snapshot).clone();
        write.apply(&mut next)?;
        self.hub.publish(next, |version| write.change_event(version));
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(write);
        Ok(())
    }
}

impl ColumnStore for MemoryStorage {
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

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn batch_write_tasks(&self, writes: Vec<TasksWrite>) -> Result<(), StorageError> {
        if !self.transactional {
            return Err(StorageError::Unsupported("multi-document transactions"));
        }
        self.commit(StorageWrite::Tasks(writes))
    }
}
