/// Task filters for the board view.
///
/// Filters never feed into writes: a filtered snapshot is for display, and
/// moves are always planned against the unfiltered one.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::Priority;
use crate::types::{Snapshot, Task};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DueRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl DueRange {
    fn is_set(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    fn contains(&self, due: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| due >= from) && self.to.map_or(true, |to| due <= to)
    }
}

/// Criteria groups are AND'd together. Within a group any match passes:
/// one of the priorities, one of the labels, and for dates one of
/// in-range, overdue or no due date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    #[serde(default, rename = "priority")]
    pub priorities: Vec<Priority>,
    /// Label ids.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due_date: DueRange,
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub has_no_date: bool,
}

impl TaskFilter {
    pub fn is_active(&self) -> bool {
        self.active_count() > 0
    }

    /// Number of individual criteria switched on.
    pub fn active_count(&self) -> usize {
        self.priorities.len()
            + self.labels.len()
            + usize::from(self.due_date.from.is_some())
            + usize::from(self.due_date.to.is_some())
            + usize::from(self.overdue)
            + usize::from(self.has_no_date)
    }

    pub fn toggle_priority(&mut self, priority: Priority) {
        match self.priorities.iter().position(|p| *p == priority) {
            Some(pos) => {
                self.priorities.remove(pos);
            }
            None => self.priorities.push(priority),
        }
    }

    pub fn toggle_label(&mut self, label_id: &str) {
        match self.labels.iter().position(|l| l == label_id) {
            Some(pos) => {
                self.labels.remove(pos);
            }
            None => self.labels.push(label_id.to_string()),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if !self.priorities.is_empty() {
            match task.priority() {
                Some(p) if self.priorities.contains(&p) => {}
                _ => return false,
            }
        }

        if !self.labels.is_empty() && !task.labels().iter().any(|l| self.labels.contains(&l.id)) {
            return false;
        }

        let date_group = self.due_date.is_set() || self.overdue || self.has_no_date;
        if date_group {
            let due = task.due_date();
            let passes = match due {
                None => self.has_no_date,
                Some(due) => {
                    (self.due_date.is_set() && self.due_date.contains(due)) || (self.overdue && due < now)
                }
            };
            if !passes {
                return false;
            }
        }
        true
    }

    /// Copy of the snapshot with non-matching tasks removed from every
    /// column. Columns themselves are kept.
    pub fn apply(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Snapshot {
        let mut filtered = snapshot.clone();
        if self.is_active() {
            for column in &mut filtered.columns {
                column.tasks.retain(|t| self.matches(t, now));
            }
        }
        filtered
    }
}
