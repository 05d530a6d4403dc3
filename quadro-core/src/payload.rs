/// Typed views over the opaque task payload.
///
/// The reconciler never looks at these fields; only board operations that
/// edit a single task read or rewrite them, one key at a time. List fields
/// are edited element by element through `PayloadList`: elements this
/// version cannot decode keep their slot, and unknown keys on decodable
/// elements ride along in `extra`.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Task, TaskId};

pub const LABELS: &str = "labels";
pub const PRIORITY: &str = "priority";
pub const DUE_DATE: &str = "dueDate";
pub const DESCRIPTION: &str = "description";
pub const SUBTASKS: &str = "subtasks";
pub const DEPENDENCIES: &str = "dependencies";
pub const COMMENTS: &str = "comments";
pub const TIME_ENTRIES: &str = "timeEntries";
pub const CREATED_BY: &str = "createdBy";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_BY: &str = "updatedBy";
pub const UPDATED_AT: &str = "updatedAt";

/// Palette offered by the label editor.
pub const LABEL_COLORS: &[&str] = &[
    "#1a73e8", "#dc3545", "#28a745", "#ffc107", "#6f42c1", "#fd7e14", "#20c997", "#e83e8c",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeCategory {
    #[default]
    Development,
    Planning,
    Testing,
    Bugfix,
    Meeting,
    #[serde(other)]
    Other,
}

impl TimeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            TimeCategory::Development => "Development",
            TimeCategory::Planning => "Planning",
            TimeCategory::Testing => "Testing",
            TimeCategory::Bugfix => "Bug Fix",
            TimeCategory::Meeting => "Meeting",
            TimeCategory::Other => "Other",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            TimeCategory::Development => "#28a745",
            TimeCategory::Planning => "#17a2b8",
            TimeCategory::Testing => "#ffc107",
            TimeCategory::Bugfix => "#dc3545",
            TimeCategory::Meeting => "#6f42c1",
            TimeCategory::Other => "#6c757d",
        }
    }
}

/// One tracked interval. Times are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    #[serde(default)]
    pub category: TimeCategory,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub ongoing: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot<T> {
    Typed(T),
    Raw(Value),
}

/// A payload array decoded element by element. Elements that do not fit
/// `T` are kept as raw JSON in their original position and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadList<T> {
    slots: Vec<Slot<T>>,
}

impl<T: DeserializeOwned + Serialize> PayloadList<T> {
    /// A missing or non-array value reads as an empty list.
    pub fn decode(value: Option<&Value>) -> Self {
        let slots = match value {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match serde_json::from_value(item.clone()) {
                    Ok(typed) => Slot::Typed(typed),
                    Err(e) => {
                        log::debug!("[quadro.payload] Keeping undecodable element as is: {}", e);
                        Slot::Raw(item.clone())
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn typed(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Typed(typed) => Some(typed),
            Slot::Raw(_) => None,
        })
    }

    pub fn into_typed(self) -> Vec<T> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Typed(typed) => Some(typed),
                Slot::Raw(_) => None,
            })
            .collect()
    }

    pub fn push(&mut self, item: T) {
        self.slots.push(Slot::Typed(item));
    }

    /// Run `edit` over the decoded elements. Raw elements keep their slots;
    /// decoded elements refill the remaining slots in order and anything
    /// added lands at the end.
    pub fn edit<R>(&mut self, edit: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let mut typed = Vec::new();
        let mut layout = Vec::with_capacity(self.slots.len());
        for slot in self.slots.drain(..) {
            match slot {
                Slot::Typed(item) => {
                    typed.push(item);
                    layout.push(None);
                }
                Slot::Raw(raw) => layout.push(Some(raw)),
            }
        }

        let result = edit(&mut typed);

        let mut typed = typed.into_iter();
        for entry in layout {
            match entry {
                Some(raw) => self.slots.push(Slot::Raw(raw)),
                None => {
                    if let Some(item) = typed.next() {
                        self.slots.push(Slot::Typed(item));
                    }
                }
            }
        }
        self.slots.extend(typed.map(Slot::Typed));
        result
    }

    /// Drop every element whose id is `id`, decoded or raw. Returns whether
    /// anything was removed.
    pub fn remove_by_id(&mut self, id: &str, id_of: impl Fn(&T) -> &str) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| match slot {
            Slot::Typed(item) => id_of(item) != id,
            Slot::Raw(raw) => raw.get("id").and_then(Value::as_str) != Some(id),
        });
        self.slots.len() != before
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let items = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Typed(item) => serde_json::to_value(item),
                Slot::Raw(raw) => Ok(raw.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(items))
    }
}

impl Task {
    /// Decode one payload key. Missing or malformed values read as `None`.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_field<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.payload.insert(key.to_string(), value);
        Ok(())
    }

    pub fn clear_field(&mut self, key: &str) -> Option<Value> {
        self.payload.shift_remove(key)
    }

    /// Editable view of a list field.
    pub fn list<T: DeserializeOwned + Serialize>(&self, key: &str) -> PayloadList<T> {
        PayloadList::decode(self.payload.get(key))
    }

    pub fn set_list<T: DeserializeOwned + Serialize>(
        &mut self,
        key: &str,
        list: &PayloadList<T>,
    ) -> Result<(), serde_json::Error> {
        let value = list.to_value()?;
        self.payload.insert(key.to_string(), value);
        Ok(())
    }

    pub fn labels(&self) -> Vec<Label> {
        self.list(LABELS).into_typed()
    }

    pub fn priority(&self) -> Option<Priority> {
        self.field(PRIORITY)
    }

    /// Due dates are stored as ISO-8601 strings; anything unparsable counts
    /// as no due date.
    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        let raw: String = self.field(DUE_DATE)?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    pub fn subtasks(&self) -> Vec<Subtask> {
        self.list(SUBTASKS).into_typed()
    }

    pub fn dependencies(&self) -> Vec<TaskId> {
        self.list(DEPENDENCIES).into_typed()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.list(COMMENTS).into_typed()
    }

    pub fn time_entries(&self) -> Vec<TimeEntry> {
        self.list(TIME_ENTRIES).into_typed()
    }

    pub fn is_tracking(&self) -> bool {
        self.time_entries().iter().any(|e| e.ongoing)
    }
}
