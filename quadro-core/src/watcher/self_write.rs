/// Recognizes watcher events caused by our own board-file writes.
///
/// Each write registers the fingerprint of the bytes it is about to put on
/// disk. When the watcher reports a change, the current file content is
/// fingerprinted; a match is consumed and the event ignored, anything else
/// came from another process and triggers a reload.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::types::ContentFingerprint;

/// Pending fingerprints older than this are dropped on cleanup.
const FINGERPRINT_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
pub struct SelfWriteTracker {
    pending: VecDeque<(ContentFingerprint, Instant)>,
}

impl SelfWriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, content: &str) {
        self.pending
            .push_back((ContentFingerprint::from_content(content), Instant::now()));
    }

    /// True (and the fingerprint is consumed) when `content` is one of our writes.
    pub fn check_and_consume(&mut self, content: &str) -> bool {
        let fingerprint = ContentFingerprint::from_content(content);
        match self.pending.iter().position(|(fp, _)| *fp == fingerprint) {
            Some(pos) => {
                self.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.pending
            .retain(|(_, registered_at)| now.duration_since(*registered_at) < FINGERPRINT_TTL);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
