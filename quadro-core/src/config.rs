/// Configuration types shared by the core and the backend.
use serde::{Deserialize, Serialize};

use crate::reorder::reconcile::CrossColumnWrites;

/// An authenticated user. Only `id` takes part in votes and permissions;
/// the rest is carried into `createdBy`/`author` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }
}

/// Per-board behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSettings {
    /// How a task move across two columns is written.
    #[serde(default)]
    pub cross_column_writes: CrossColumnWrites,
    /// Renumber the remaining columns after a delete so orders stay dense.
    #[serde(default = "default_true")]
    pub compact_on_delete: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            cross_column_writes: CrossColumnWrites::default(),
            compact_on_delete: true,
        }
    }
}
