/// Event types emitted by the file watcher.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// SHA-256 fingerprint of file content, used for self-write detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    /// Compute SHA-256 fingerprint of content with normalized line endings.
    pub fn from_content(content: &str) -> Self {
        use sha2::{Digest, Sha256};
        let normalized = content.replace("\r\n", "\n");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Raw change to the watched board file, before self-write filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FileChangeEvent {
    Modified {
        #[serde(serialize_with = "serialize_path", deserialize_with = "deserialize_path")]
        path: PathBuf,
    },
    Created {
        #[serde(serialize_with = "serialize_path", deserialize_with = "deserialize_path")]
        path: PathBuf,
    },
    Deleted {
        #[serde(serialize_with = "serialize_path", deserialize_with = "deserialize_path")]
        path: PathBuf,
    },
}

impl FileChangeEvent {
    pub fn path(&self) -> &PathBuf {
        match self {
            FileChangeEvent::Modified { path }
            | FileChangeEvent::Created { path }
            | FileChangeEvent::Deleted { path } => path,
        }
    }
}

fn serialize_path<S: serde::Serializer>(path: &PathBuf, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&path.to_string_lossy())
}

fn deserialize_path<'de, D: serde::Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
    let s = String::deserialize(d)?;
    Ok(PathBuf::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let fp1 = ContentFingerprint::from_content("{\"title\":\"x\"}");
        let fp2 = ContentFingerprint::from_content("{\"title\":\"x\"}");
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_normalized_line_endings() {
        let fp1 = ContentFingerprint::from_content("{\n}");
        let fp2 = ContentFingerprint::from_content("{\r\n}");
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_event_path() {
        let event = FileChangeEvent::Deleted {
            path: PathBuf::from("/tmp/board.json"),
        };
        assert_eq!(event.path(), &PathBuf::from("/tmp/board.json"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["path"], "/tmp/board.json");
    }
}
