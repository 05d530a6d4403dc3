/// Events emitted after a store commits a write or reloads from disk.
use serde::{Deserialize, Serialize};

use crate::types::ColumnId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardChangeEvent {
    TitleChanged {
        title: String,
        version: u64,
    },
    ColumnWritten {
        column_id: ColumnId,
        version: u64,
    },
    ColumnOrdersWritten {
        column_ids: Vec<ColumnId>,
        version: u64,
    },
    ColumnDeleted {
        column_id: ColumnId,
        version: u64,
    },
    TasksWritten {
        column_ids: Vec<ColumnId>,
        version: u64,
    },
    /// The board file was rewritten by another process and re-read.
    Reloaded {
        version: u64,
    },
}

impl BoardChangeEvent {
    pub fn version(&self) -> u64 {
        match self {
            BoardChangeEvent::TitleChanged { version, .. }
            | BoardChangeEvent::ColumnWritten { version, .. }
            | BoardChangeEvent::ColumnOrdersWritten { version, .. }
            | BoardChangeEvent::ColumnDeleted { version, .. }
            | BoardChangeEvent::TasksWritten { version, .. }
            | BoardChangeEvent::Reloaded { version } => *version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = BoardChangeEvent::ColumnOrdersWritten {
            column_ids: vec![ColumnId::from("todo"), ColumnId::from("done")],
            version: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ColumnOrdersWritten");
        assert_eq!(json["column_ids"][1], "done");
        assert_eq!(event.version(), 7);
    }
}
