/// Board operations: title, columns, tasks, votes and task annotations.
///
/// Every operation reads the canonical snapshot from the store
/// subscription, builds the new column document on a copy and hands it to
/// the store. Nothing here patches the snapshot directly; callers see the
/// result once the store publishes it.
///
/// Mutations are for authenticated sessions only. A visitor calling one is
/// not an error: the call is logged and returns without writing. Voting is
/// the one operation open to visitors.
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{BoardSettings, UserIdentity};
use crate::filter::TaskFilter;
use crate::payload::{self, Comment, Label, PayloadList, Subtask, TimeCategory, TimeEntry, LABEL_COLORS};
use crate::reorder::order::{compact, dense_entries, next_order};
use crate::reorder::reconcile::{MoveOutcome, Reconciler};
use crate::reorder::{MoveError, TaskMove};
use crate::storage::{ColumnPatch, ColumnStore, StorageError, Subscription};
use crate::timing::{self, TrackingError};
use crate::types::{ColumnId, Snapshot, Task, TaskId};
use crate::vote::{self, IdentityResolver, Session, VoteOutcome};

/// Column fields owned by the store layout rather than the caller.
const RESERVED_COLUMN_KEYS: &[&str] = &["id", "title", "order", "tasks"];

/// Task fields a generic update may not touch.
const RESERVED_TASK_KEYS: &[&str] = &[
    "id",
    "votes",
    "votedBy",
    payload::CREATED_BY,
    payload::CREATED_AT,
];

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("Column not found: {0}")]
    ColumnNotFound(ColumnId),

    #[error("Column already exists: {0}")]
    ColumnExists(ColumnId),

    #[error("Task {task_id} not found in column {column_id}")]
    TaskNotFound { column_id: ColumnId, task_id: TaskId },

    #[error("Task not found on board: {0}")]
    UnknownTask(TaskId),

    #[error("Label not found: {0}")]
    LabelNotFound(String),

    #[error("Subtask not found: {0}")]
    SubtaskNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid task payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Request to create a column. Extra fields (`emoji`, `color`, ...) are
/// stored as column metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewColumn {
    pub title: String,
    #[serde(default)]
    pub id: Option<ColumnId>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl NewColumn {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

/// Request to create a task. Extra fields become task payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub id: Option<TaskId>,
    pub content: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NewTask {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Tracked time of one task, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSummary {
    pub entries: Vec<TimeEntry>,
    pub tracking: bool,
    pub total: i64,
    pub total_formatted: String,
    pub by_category: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: TimeCategory,
    pub label: &'static str,
    pub color: &'static str,
    pub total: i64,
}

impl TrackingSummary {
    fn of(entries: &[TimeEntry], now: i64) -> Self {
        let total = timing::total_tracked(entries, now);
        Self {
            entries: entries.to_vec(),
            tracking: entries.iter().any(|e| e.ongoing),
            total,
            total_formatted: timing::format_duration(total),
            by_category: timing::totals_by_category(entries, now)
                .into_iter()
                .map(|(category, total)| CategoryTotal {
                    category,
                    label: category.label(),
                    color: category.color(),
                    total,
                })
                .collect(),
        }
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn non_empty(value: &str, what: &str) -> Result<String, BoardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::InvalidInput(format!("{} is empty", what)));
    }
    Ok(trimmed.to_string())
}

pub struct BoardService<S: ColumnStore> {
    store: Arc<S>,
    subscription: Subscription,
    settings: BoardSettings,
}

impl<S: ColumnStore> BoardService<S> {
    pub fn new(store: Arc<S>, settings: BoardSettings) -> Self {
        let subscription = store.subscribe();
        Self {
            store,
            subscription,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.subscription.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.subscription.version()
    }

    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    /// Display copy of the board with `filter` applied.
    pub fn filtered(&self, filter: &TaskFilter) -> Snapshot {
        filter.apply(&self.snapshot(), Utc::now())
    }

    fn gate<'s>(&self, session: &'s Session, operation: &str) -> Option<&'s UserIdentity> {
        let user = session.user();
        if user.is_none() {
            log::debug!("[quadro.board.gate] Ignoring {} from anonymous caller", operation);
        }
        user
    }

    fn reconciler(&self) -> Reconciler<'_, S> {
        Reconciler::new(self.store.as_ref(), self.settings.cross_column_writes)
    }

    // ── Board ───────────────────────────────────────────────────────────

    pub async fn update_title(&self, session: &Session, title: &str) -> Result<(), BoardError> {
        if self.gate(session, "update_title").is_none() {
            return Ok(());
        }
        let title = non_empty(title, "board title")?;
        self.store.write_board_title(&title).await?;
        log::info!("[quadro.board.title] Board renamed to {:?}", title);
        Ok(())
    }

    // ── Columns ─────────────────────────────────────────────────────────

    /// Create a column after the last one. The id is the requested one,
    /// else a slug of the title, else a random UUID when the slug is empty
    /// or already taken.
    pub async fn add_column(&self, session: &Session, column: NewColumn) -> Result<Option<ColumnId>, BoardError> {
        let Some(user) = self.gate(session, "add_column") else {
            return Ok(None);
        };
        let title = non_empty(&column.title, "column title")?;
        let snapshot = self.snapshot();

        let column_id = match column.id {
            Some(id) if snapshot.contains_column(&id) => return Err(BoardError::ColumnExists(id)),
            Some(id) => id,
            None => {
                let slug = ColumnId::from_title(&title);
                if slug.as_str().is_empty() || snapshot.contains_column(&slug) {
                    ColumnId::random()
                } else {
                    slug
                }
            }
        };

        let order = match next_order(snapshot.columns.iter().map(|c| c.order)) {
            Some(order) => order,
            None => {
                log::warn!("[quadro.board.column] Column orders exhausted, renumbering before append");
                let ordered: Vec<ColumnId> = snapshot
                    .ordered_columns()
                    .into_iter()
                    .map(|c| c.id.clone())
                    .collect();
                self.store.batch_write_column_orders(dense_entries(&ordered)).await?;
                ordered.len() as i64
            }
        };
        let mut patch = ColumnPatch::title(title)
            .with_order(order)
            .with_meta(payload::CREATED_BY, Value::String(user.id.clone()))
            .with_meta(payload::UPDATED_AT, timestamp());
        patch.tasks = Some(Vec::new());
        for (key, value) in column.meta {
            if !RESERVED_COLUMN_KEYS.contains(&key.as_str()) {
                patch.meta.insert(key, value);
            }
        }

        self.store.write_column(&column_id, patch).await?;
        log::info!("[quadro.board.column] Added column {} at order {}", column_id, order);
        Ok(Some(column_id))
    }

    /// Merge-write title and display metadata of an existing column.
    pub async fn update_column(
        &self,
        session: &Session,
        column_id: &ColumnId,
        update: ColumnUpdate,
    ) -> Result<(), BoardError> {
        if self.gate(session, "update_column").is_none() {
            return Ok(());
        }
        if !self.snapshot().contains_column(column_id) {
            return Err(BoardError::ColumnNotFound(column_id.clone()));
        }

        let mut patch = ColumnPatch::default();
        if let Some(title) = update.title {
            patch.title = Some(non_empty(&title, "column title")?);
        }
        for (key, value) in update.meta {
            if !RESERVED_COLUMN_KEYS.contains(&key.as_str()) {
                patch.meta.insert(key, value);
            }
        }
        patch.meta.insert(payload::UPDATED_AT.to_string(), timestamp());

        self.store.write_column(column_id, patch).await?;
        Ok(())
    }

    /// Delete a column and its tasks. With `compact_on_delete` the
    /// survivors are renumbered `0..n` in one batch.
    pub async fn delete_column(&self, session: &Session, column_id: &ColumnId) -> Result<(), BoardError> {
        if self.gate(session, "delete_column").is_none() {
            return Ok(());
        }
        let snapshot = self.snapshot();
        let Some(column) = snapshot.column(column_id) else {
            return Err(BoardError::ColumnNotFound(column_id.clone()));
        };
        let dropped = column.tasks.len();

        self.store.delete_column(column_id).await?;
        log::info!("[quadro.board.column] Deleted column {} ({} tasks)", column_id, dropped);

        // The column is gone at this point; gapped orders still sort
        // correctly and the next column move rewrites them densely.
        if self.settings.compact_on_delete {
            if let Some(entries) = compact(&snapshot.columns, column_id) {
                log::debug!("[quadro.board.column] Compacting {} column orders", entries.len());
                if let Err(e) = self.store.batch_write_column_orders(entries).await {
                    log::error!(
                        "[quadro.board.column] Deleted column {} but failed to compact orders: {}",
                        column_id,
                        e
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn move_column(
        &self,
        session: &Session,
        column_id: &ColumnId,
        destination_index: usize,
    ) -> Result<MoveOutcome, BoardError> {
        if self.gate(session, "move_column").is_none() {
            return Ok(MoveOutcome::Noop);
        }
        let snapshot = self.snapshot();
        Ok(self.reconciler().move_column(&snapshot, column_id, destination_index).await?)
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    /// Replace one column's task sequence with an edited copy.
    async fn write_tasks<F, R>(&self, column_id: &ColumnId, edit: F) -> Result<R, BoardError>
    where
        F: FnOnce(&mut Vec<Task>) -> Result<R, BoardError> + Send,
        R: Send,
    {
        let mut tasks = {
            let snapshot = self.snapshot();
            let column = snapshot
                .column(column_id)
                .ok_or_else(|| BoardError::ColumnNotFound(column_id.clone()))?;
            column.tasks.clone()
        };
        let result = edit(&mut tasks)?;
        self.store.write_column(column_id, ColumnPatch::tasks(tasks)).await?;
        Ok(result)
    }

    async fn modify_task<F, R>(&self, column_id: &ColumnId, task_id: &TaskId, edit: F) -> Result<R, BoardError>
    where
        F: FnOnce(&mut Task) -> Result<R, BoardError> + Send,
        R: Send,
    {
        self.write_tasks(column_id, |tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| &t.id == task_id)
                .ok_or_else(|| BoardError::TaskNotFound {
                    column_id: column_id.clone(),
                    task_id: task_id.clone(),
                })?;
            edit(task)
        })
        .await
    }

    /// Append a task to the end of a column.
    pub async fn add_task(
        &self,
        session: &Session,
        column_id: &ColumnId,
        new_task: NewTask,
    ) -> Result<Option<TaskId>, BoardError> {
        let Some(user) = self.gate(session, "add_task") else {
            return Ok(None);
        };
        let content = non_empty(&new_task.content, "task content")?;
        let task_id = match new_task.id {
            Some(id) if self.snapshot().find_task(&id).is_some() => {
                return Err(BoardError::InvalidInput(format!("task id {} already in use", id)))
            }
            Some(id) => id,
            None => TaskId::generate(),
        };

        let mut task = Task::new(task_id.clone(), content);
        for (key, value) in new_task.payload {
            if !RESERVED_TASK_KEYS.contains(&key.as_str()) && key != "content" {
                task.payload.insert(key, value);
            }
        }
        if !task.payload.contains_key(payload::LABELS) {
            task.payload.insert(payload::LABELS.to_string(), Value::Array(Vec::new()));
        }
        task.payload
            .insert(payload::CREATED_BY.to_string(), Value::String(user.id.clone()));
        task.payload.insert(payload::CREATED_AT.to_string(), timestamp());

        self.write_tasks(column_id, move |tasks| {
            tasks.push(task);
            Ok(())
        })
        .await?;
        log::info!("[quadro.board.task] Added task {} to column {}", task_id, column_id);
        Ok(Some(task_id))
    }

    /// Merge `updates` into a task. `content` must stay a non-empty string;
    /// ids, votes and creation stamps are ignored.
    pub async fn update_task(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        updates: Map<String, Value>,
    ) -> Result<(), BoardError> {
        let Some(user) = self.gate(session, "update_task") else {
            return Ok(());
        };
        let user_id = user.id.clone();
        self.modify_task(column_id, task_id, move |task| {
            for (key, value) in updates {
                if RESERVED_TASK_KEYS.contains(&key.as_str()) {
                    log::debug!("[quadro.board.task] Ignoring update of reserved field {}", key);
                    continue;
                }
                if key == "content" {
                    let content = value
                        .as_str()
                        .ok_or_else(|| BoardError::InvalidInput("task content must be a string".into()))?;
                    task.content = non_empty(content, "task content")?;
                    continue;
                }
                task.payload.insert(key, value);
            }
            task.payload.insert(payload::UPDATED_AT.to_string(), timestamp());
            task.payload
                .insert(payload::UPDATED_BY.to_string(), Value::String(user_id));
            Ok(())
        })
        .await
    }

    pub async fn delete_task(&self, session: &Session, column_id: &ColumnId, task_id: &TaskId) -> Result<(), BoardError> {
        if self.gate(session, "delete_task").is_none() {
            return Ok(());
        }
        self.write_tasks(column_id, |tasks| {
            let index = tasks
                .iter()
                .position(|t| &t.id == task_id)
                .ok_or_else(|| BoardError::TaskNotFound {
                    column_id: column_id.clone(),
                    task_id: task_id.clone(),
                })?;
            tasks.remove(index);
            Ok(())
        })
        .await?;
        log::info!("[quadro.board.task] Deleted task {} from column {}", task_id, column_id);
        Ok(())
    }

    pub async fn move_task(&self, session: &Session, request: &TaskMove) -> Result<MoveOutcome, BoardError> {
        if self.gate(session, "move_task").is_none() {
            return Ok(MoveOutcome::Noop);
        }
        let snapshot = self.snapshot();
        Ok(self.reconciler().move_task(&snapshot, request).await?)
    }

    // ── Votes ───────────────────────────────────────────────────────────

    /// Toggle the session's vote. Open to visitors.
    pub async fn vote(&self, session: &Session, column_id: &ColumnId, task_id: &TaskId) -> Result<VoteOutcome, BoardError> {
        let voter = session.resolve_voter_id();

        if session.is_anonymous(&voter) {
            let snapshot = self.snapshot();
            let already = snapshot
                .column(column_id)
                .and_then(|c| c.tasks.iter().find(|t| &t.id == task_id))
                .is_some_and(|t| vote::has_voted(t, &voter));
            if already {
                return Ok(VoteOutcome::Unchanged);
            }
        }

        let outcome = self
            .modify_task(column_id, task_id, |task| {
                let (next, outcome) = vote::toggle_vote(task, &voter);
                *task = next;
                Ok(outcome)
            })
            .await?;
        log::debug!("[quadro.board.vote] {} on task {}: {:?}", voter, task_id, outcome);
        Ok(outcome)
    }

    /// Whether the session has a vote on `task_id`, wherever the task is.
    pub fn has_voted(&self, session: &Session, task_id: &TaskId) -> bool {
        let voter = session.resolve_voter_id();
        let snapshot = self.snapshot();
        snapshot
            .find_task(task_id)
            .is_some_and(|(column, index)| vote::has_voted(&column.tasks[index], &voter))
    }

    // ── Labels ──────────────────────────────────────────────────────────

    pub async fn add_label(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        text: &str,
        color: Option<&str>,
    ) -> Result<Option<Label>, BoardError> {
        if self.gate(session, "add_label").is_none() {
            return Ok(None);
        }
        let label = Label {
            id: uuid::Uuid::new_v4().to_string(),
            text: non_empty(text, "label text")?,
            color: color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(LABEL_COLORS[0])
                .to_string(),
            extra: Map::new(),
        };
        let created = label.clone();
        self.modify_task(column_id, task_id, move |task| {
            let mut labels: PayloadList<Label> = task.list(payload::LABELS);
            labels.push(label);
            task.set_list(payload::LABELS, &labels)?;
            Ok(())
        })
        .await?;
        Ok(Some(created))
    }

    pub async fn remove_label(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        label_id: &str,
    ) -> Result<(), BoardError> {
        if self.gate(session, "remove_label").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, |task| {
            let mut labels: PayloadList<Label> = task.list(payload::LABELS);
            if !labels.remove_by_id(label_id, |l| l.id.as_str()) {
                return Err(BoardError::LabelNotFound(label_id.to_string()));
            }
            task.set_list(payload::LABELS, &labels)?;
            Ok(())
        })
        .await
    }

    // ── Time tracking ───────────────────────────────────────────────────

    pub async fn start_tracking(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        category: TimeCategory,
    ) -> Result<(), BoardError> {
        if self.gate(session, "start_tracking").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, move |task| {
            let mut entries: PayloadList<TimeEntry> = task.list(payload::TIME_ENTRIES);
            entries.edit(|entries| timing::start(entries, category, timing::now_millis()))?;
            task.set_list(payload::TIME_ENTRIES, &entries)?;
            Ok(())
        })
        .await
    }

    /// Stop the running entry; returns the tracked duration in ms.
    pub async fn stop_tracking(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
    ) -> Result<Option<i64>, BoardError> {
        if self.gate(session, "stop_tracking").is_none() {
            return Ok(None);
        }
        let duration = self
            .modify_task(column_id, task_id, |task| {
                let mut entries: PayloadList<TimeEntry> = task.list(payload::TIME_ENTRIES);
                let duration = entries.edit(|entries| timing::stop(entries, timing::now_millis()))?;
                task.set_list(payload::TIME_ENTRIES, &entries)?;
                Ok(duration)
            })
            .await?;
        log::debug!(
            "[quadro.board.tracking] Task {} tracked {}",
            task_id,
            timing::format_duration(duration)
        );
        Ok(Some(duration))
    }

    pub async fn delete_time_entry(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        index: usize,
    ) -> Result<(), BoardError> {
        if self.gate(session, "delete_time_entry").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, |task| {
            let mut entries: PayloadList<TimeEntry> = task.list(payload::TIME_ENTRIES);
            entries.edit(|entries| timing::delete_entry(entries, index))?;
            task.set_list(payload::TIME_ENTRIES, &entries)?;
            Ok(())
        })
        .await
    }

    /// Time entries of a task with running totals. Open to everyone.
    pub fn tracking_summary(&self, column_id: &ColumnId, task_id: &TaskId) -> Result<TrackingSummary, BoardError> {
        let snapshot = self.snapshot();
        let column = snapshot
            .column(column_id)
            .ok_or_else(|| BoardError::ColumnNotFound(column_id.clone()))?;
        let task = column
            .tasks
            .iter()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| BoardError::TaskNotFound {
                column_id: column_id.clone(),
                task_id: task_id.clone(),
            })?;
        Ok(TrackingSummary::of(&task.time_entries(), timing::now_millis()))
    }

    // ── Comments ────────────────────────────────────────────────────────

    pub async fn add_comment(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        text: &str,
    ) -> Result<Option<Comment>, BoardError> {
        let Some(user) = self.gate(session, "add_comment") else {
            return Ok(None);
        };
        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            text: non_empty(text, "comment")?,
            author: if user.name.trim().is_empty() {
                user.id.clone()
            } else {
                user.name.clone()
            },
            created_at: Utc::now(),
            extra: Map::new(),
        };
        let created = comment.clone();
        self.modify_task(column_id, task_id, move |task| {
            let mut comments: PayloadList<Comment> = task.list(payload::COMMENTS);
            comments.push(comment);
            task.set_list(payload::COMMENTS, &comments)?;
            Ok(())
        })
        .await?;
        Ok(Some(created))
    }

    pub async fn remove_comment(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        comment_id: &str,
    ) -> Result<(), BoardError> {
        if self.gate(session, "remove_comment").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, |task| {
            let mut comments: PayloadList<Comment> = task.list(payload::COMMENTS);
            if !comments.remove_by_id(comment_id, |c| c.id.as_str()) {
                return Err(BoardError::CommentNotFound(comment_id.to_string()));
            }
            task.set_list(payload::COMMENTS, &comments)?;
            Ok(())
        })
        .await
    }

    // ── Subtasks ────────────────────────────────────────────────────────

    pub async fn add_subtask(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        text: &str,
    ) -> Result<Option<Subtask>, BoardError> {
        if self.gate(session, "add_subtask").is_none() {
            return Ok(None);
        }
        let subtask = Subtask {
            id: uuid::Uuid::new_v4().to_string(),
            text: non_empty(text, "subtask text")?,
            completed: false,
            extra: Map::new(),
        };
        let created = subtask.clone();
        self.modify_task(column_id, task_id, move |task| {
            let mut subtasks: PayloadList<Subtask> = task.list(payload::SUBTASKS);
            subtasks.push(subtask);
            task.set_list(payload::SUBTASKS, &subtasks)?;
            Ok(())
        })
        .await?;
        Ok(Some(created))
    }

    /// Flip a subtask's completion; returns the new state.
    pub async fn toggle_subtask(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        subtask_id: &str,
    ) -> Result<Option<bool>, BoardError> {
        if self.gate(session, "toggle_subtask").is_none() {
            return Ok(None);
        }
        let completed = self
            .modify_task(column_id, task_id, |task| {
                let mut subtasks: PayloadList<Subtask> = task.list(payload::SUBTASKS);
                let completed = subtasks.edit(|subtasks| {
                    let subtask = subtasks
                        .iter_mut()
                        .find(|s| s.id == subtask_id)
                        .ok_or_else(|| BoardError::SubtaskNotFound(subtask_id.to_string()))?;
                    subtask.completed = !subtask.completed;
                    Ok::<_, BoardError>(subtask.completed)
                })?;
                task.set_list(payload::SUBTASKS, &subtasks)?;
                Ok(completed)
            })
            .await?;
        Ok(Some(completed))
    }

    pub async fn remove_subtask(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        subtask_id: &str,
    ) -> Result<(), BoardError> {
        if self.gate(session, "remove_subtask").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, |task| {
            let mut subtasks: PayloadList<Subtask> = task.list(payload::SUBTASKS);
            if !subtasks.remove_by_id(subtask_id, |s| s.id.as_str()) {
                return Err(BoardError::SubtaskNotFound(subtask_id.to_string()));
            }
            task.set_list(payload::SUBTASKS, &subtasks)?;
            Ok(())
        })
        .await
    }

    // ── Dependencies ────────────────────────────────────────────────────

    /// Record that `task_id` depends on `depends_on`, which must be a
    /// different task somewhere on the board. Adding twice is a no-op.
    pub async fn add_dependency(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        depends_on: &TaskId,
    ) -> Result<(), BoardError> {
        if self.gate(session, "add_dependency").is_none() {
            return Ok(());
        }
        if task_id == depends_on {
            return Err(BoardError::SelfDependency(task_id.clone()));
        }
        if self.snapshot().find_task(depends_on).is_none() {
            return Err(BoardError::UnknownTask(depends_on.clone()));
        }
        self.modify_task(column_id, task_id, |task| {
            let mut dependencies: PayloadList<TaskId> = task.list(payload::DEPENDENCIES);
            if !dependencies.typed().any(|d| d == depends_on) {
                dependencies.push(depends_on.clone());
                task.set_list(payload::DEPENDENCIES, &dependencies)?;
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_dependency(
        &self,
        session: &Session,
        column_id: &ColumnId,
        task_id: &TaskId,
        depends_on: &TaskId,
    ) -> Result<(), BoardError> {
        if self.gate(session, "remove_dependency").is_none() {
            return Ok(());
        }
        self.modify_task(column_id, task_id, |task| {
            let mut dependencies: PayloadList<TaskId> = task.list(payload::DEPENDENCIES);
            dependencies.edit(|dependencies| dependencies.retain(|d| d != depends_on));
            task.set_list(payload::DEPENDENCIES, &dependencies)?;
            Ok(())
        })
        .await
    }
}
