//! Quadro core: board model, ordering, move reconciliation and the
//! column-document store contract shared by every Quadro frontend.

pub mod board;
pub mod config;
pub mod events;
pub mod filter;
pub mod payload;
pub mod reorder;
pub mod storage;
pub mod timing;
pub mod types;
pub mod vote;
pub mod watcher;

pub use board::{BoardError, BoardService};
pub use reorder::reconcile::{CrossColumnWrites, MoveOutcome, Reconciler};
pub use reorder::{MoveError, TaskMove};
pub use storage::{ColumnStore, StorageError};
pub use types::{Column, ColumnId, Snapshot, Task, TaskId};
pub use vote::{Session, VoterId};
