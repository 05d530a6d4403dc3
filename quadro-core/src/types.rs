use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Title shown until someone renames the board.
pub const DEFAULT_BOARD_TITLE: &str = "Kanban Board";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Ids are strings everywhere, but older documents carry numeric task ids
/// (`Date.now()` style). Both shapes are read back as the same string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Unsigned(n) => n.to_string(),
            RawId::Signed(n) => n.to_string(),
            RawId::Float(n) => n.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                RawId::deserialize(d).map(|raw| Self(raw.into()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable column document id: either a slug of the title it was created
    /// with or a random UUID.
    ColumnId
);

string_id!(
    /// Stable task id. Never reused, never coerced to a number.
    TaskId
);

impl ColumnId {
    /// Slug form used when a column is created from a title:
    /// lowercase, accents stripped, whitespace runs collapsed to `-`.
    pub fn from_title(title: &str) -> Self {
        let folded: String = title
            .trim()
            .nfd()
            .filter(|c| c.is_ascii())
            .collect::<String>()
            .to_lowercase();
        Self(WHITESPACE_RE.replace_all(&folded, "-").into_owned())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Vote counters written by broken clients may be negative, fractional or
/// missing entirely; all of those collapse to a valid count.
fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().map(|f| f.max(0.0).floor() as u32))
            .unwrap_or(0),
        _ => 0,
    })
}

fn string_list_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn tasks_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Task>, D::Error> {
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// A unit of work. Its position is its index in the owning column's `tasks`.
///
/// Only the fields the core needs are typed. Everything else (labels, due
/// date, subtasks, comments, ...) rides along in `payload` untouched, in the
/// order it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "TaskId::generate")]
    pub id: TaskId,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub votes: u32,
    #[serde(default, deserialize_with = "string_list_or_empty")]
    pub voted_by: Vec<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            votes: 0,
            voted_by: Vec::new(),
            payload: Map::new(),
        }
    }
}

/// A named, ordered container of tasks. `meta` holds display fields
/// (`emoji`, `color`, `createdBy`, ...) the core never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default, deserialize_with = "tasks_or_empty")]
    pub tasks: Vec<Task>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>, title: impl Into<String>, order: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            order,
            tasks: Vec::new(),
            meta: Map::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn task_index(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == task_id)
    }
}

/// Read-only copy of the whole board at one point in time.
///
/// `columns` is kept in arrival order (the order documents were first seen
/// by the store); display order is derived by sorting on `Column::order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

fn default_title() -> String {
    DEFAULT_BOARD_TITLE.to_string()
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            title: default_title(),
            columns: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            title: default_title(),
            columns,
        }
    }

    pub fn column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| &c.id == column_id)
    }

    pub fn contains_column(&self, column_id: &ColumnId) -> bool {
        self.column(column_id).is_some()
    }

    /// Columns in display order: ascending `order`, ties by arrival order.
    pub fn ordered_columns(&self) -> Vec<&Column> {
        let mut ordered: Vec<&Column> = self.columns.iter().collect();
        ordered.sort_by_key(|c| c.order);
        ordered
    }

    /// Locate a task anywhere on the board.
    pub fn find_task(&self, task_id: &TaskId) -> Option<(&Column, usize)> {
        self.columns
            .iter()
            .find_map(|col| col.task_index(task_id).map(|idx| (col, idx)))
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_task_id_reads_as_string() {
        let task: Task = serde_json::from_value(json!({"id": 1700000000000u64, "content": "x"})).unwrap();
        assert_eq!(task.id.as_str(), "1700000000000");

        let back = serde_json::to_value(&task).unwrap();
        assert_eq!(back["id"], json!("1700000000000"));
    }

    #[test]
    fn test_missing_task_id_is_generated() {
        let task: Task = serde_json::from_value(json!({"content": "no id"})).unwrap();
        assert_eq!(task.id.as_str().len(), 36);
    }

    #[test]
    fn test_payload_preserved_in_order() {
        let raw = json!({
            "id": "t1",
            "content": "x",
            "votes": 5,
            "votedBy": ["a", "b", "c", "d", "e"],
            "zeta": 1,
            "labels": [{"id": "L1", "text": "bug", "color": "#dc3545"}],
            "alpha": {"nested": true}
        });
        let task: Task = serde_json::from_value(raw.clone()).unwrap();
        let keys: Vec<&String> = task.payload.keys().collect();
        assert_eq!(keys, vec!["zeta", "labels", "alpha"]);
        assert_eq!(serde_json::to_value(&task).unwrap(), raw);
    }

    #[test]
    fn test_broken_vote_fields_are_lenient() {
        let task: Task =
            serde_json::from_value(json!({"id": "t", "votes": -3, "votedBy": "nope"})).unwrap();
        assert_eq!(task.votes, 0);
        assert!(task.voted_by.is_empty());
    }

    #[test]
    fn test_column_tasks_default_to_empty() {
        let col: Column =
            serde_json::from_value(json!({"id": "todo", "title": "To Do", "order": 0, "tasks": null}))
                .unwrap();
        assert!(col.tasks.is_empty());

        let col: Column = serde_json::from_value(json!({"id": "todo", "emoji": "📝"})).unwrap();
        assert!(col.tasks.is_empty());
        assert_eq!(col.meta.get("emoji"), Some(&json!("📝")));
    }

    #[test]
    fn test_column_id_from_title() {
        assert_eq!(ColumnId::from_title("In Progress").as_str(), "in-progress");
        assert_eq!(ColumnId::from_title("  Em   Revisão ").as_str(), "em-revisao");
        assert_eq!(ColumnId::from_title("Concluído").as_str(), "concluido");
    }

    #[test]
    fn test_ordered_columns_ties_keep_arrival_order() {
        let snapshot = Snapshot::new(vec![
            Column::new("b", "B", 1),
            Column::new("a", "A", 0),
            Column::new("c", "C", 1),
        ]);
        let ids: Vec<&str> = snapshot.ordered_columns().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_task() {
        let snapshot = Snapshot::new(vec![
            Column::new("todo", "To Do", 0).with_tasks(vec![Task::new("t1", "a")]),
            Column::new("done", "Done", 1).with_tasks(vec![Task::new("t2", "b"), Task::new("t3", "c")]),
        ]);
        let (col, idx) = snapshot.find_task(&TaskId::from("t3")).unwrap();
        assert_eq!(col.id.as_str(), "done");
        assert_eq!(idx, 1);
        assert!(snapshot.find_task(&TaskId::from("nope")).is_none());
        assert_eq!(snapshot.task_count(), 3);
    }
}
