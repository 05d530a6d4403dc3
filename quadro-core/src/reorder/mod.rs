pub mod order;
pub mod reconcile;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::types::{ColumnId, TaskId};

/// Why a move was refused or could not be persisted.
///
/// Everything except `WriteFailed` is detected before the first write.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("Index {index} out of range for a sequence of {len}")]
    InvalidIndex { index: usize, len: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(ColumnId),

    #[error("Container not found: {0}")]
    ContainerNotFound(ColumnId),

    #[error("Task {task_id} not found at index {index} of column {column_id}")]
    TaskNotFound {
        column_id: ColumnId,
        task_id: TaskId,
        index: usize,
    },

    #[error("Write failed: {0}")]
    WriteFailed(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Column,
    Task,
}

/// Transient description of one requested relocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub kind: MoveKind,
    /// For column moves both container ids are the board itself (`None`).
    pub source_container_id: Option<ColumnId>,
    pub dest_container_id: Option<ColumnId>,
    pub source_index: usize,
    pub dest_index: usize,
    pub entity_id: String,
}

/// A drag-and-drop result for a task, as reported by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMove {
    #[serde(alias = "sourceContainerId")]
    pub source_column_id: ColumnId,
    #[serde(alias = "destContainerId", alias = "destinationColumnId")]
    pub dest_column_id: ColumnId,
    pub task_id: TaskId,
    pub source_index: usize,
    #[serde(alias = "destinationIndex")]
    pub dest_index: usize,
}

impl TaskMove {
    pub fn is_same_container(&self) -> bool {
        self.source_column_id == self.dest_column_id
    }
}

/// Lifecycle of a single move operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePhase {
    Requested,
    Validated,
    Applied,
    Persisting,
    Committed,
    Failed,
}

impl fmt::Display for MovePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MovePhase::Requested => "requested",
            MovePhase::Validated => "validated",
            MovePhase::Applied => "applied",
            MovePhase::Persisting => "persisting",
            MovePhase::Committed => "committed",
            MovePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}
