/// Voter identity and toggle-vote semantics.
///
/// Authenticated users vote under their user id and may retract. Visitors
/// vote under a generated `visitor_...` id persisted on first use; their
/// votes are one-way, a second toggle does nothing.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::UserIdentity;
use crate::types::Task;

pub const VISITOR_PREFIX: &str = "visitor_";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Who is casting a vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VoterId {
    User(String),
    Visitor(String),
}

impl VoterId {
    /// Classify a raw id as stored in `votedBy`.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with(VISITOR_PREFIX) {
            VoterId::Visitor(raw)
        } else {
            VoterId::User(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VoterId::User(id) | VoterId::Visitor(id) => id,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, VoterId::Visitor(_))
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the current voter's id.
pub trait IdentityResolver {
    fn resolve_voter_id(&self) -> VoterId;

    fn is_anonymous(&self, voter: &VoterId) -> bool {
        voter.is_anonymous()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Added,
    Retracted,
    /// Visitor voting twice; the task is returned unchanged.
    Unchanged,
}

/// Make `votes == votedBy.len()` with no duplicate voter, keeping the
/// first occurrence of each id.
pub fn normalize_votes(task: &mut Task) {
    let mut seen = std::collections::HashSet::new();
    task.voted_by.retain(|id| seen.insert(id.clone()));
    task.votes = task.voted_by.len() as u32;
}

/// Toggle `voter`'s vote on a copy of `task`. The input is not modified.
pub fn toggle_vote(task: &Task, voter: &VoterId) -> (Task, VoteOutcome) {
    let mut next = task.clone();
    normalize_votes(&mut next);

    let present = next.voted_by.iter().any(|id| id == voter.as_str());
    let outcome = match (present, voter.is_anonymous()) {
        (true, true) => VoteOutcome::Unchanged,
        (true, false) => {
            next.voted_by.retain(|id| id != voter.as_str());
            VoteOutcome::Retracted
        }
        (false, _) => {
            next.voted_by.push(voter.as_str().to_string());
            VoteOutcome::Added
        }
    };
    next.votes = next.voted_by.len() as u32;
    (next, outcome)
}

pub fn has_voted(task: &Task, voter: &VoterId) -> bool {
    task.voted_by.iter().any(|id| id == voter.as_str())
}

/// Fresh anonymous id: `visitor_<unix millis>_<9 base-36 chars>`.
pub fn new_visitor_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut entropy = u128::from_le_bytes(*uuid::Uuid::new_v4().as_bytes());
    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        suffix.push(BASE36[(entropy % 36) as usize] as char);
        entropy /= 36;
    }
    format!("{}{}_{}", VISITOR_PREFIX, millis, suffix)
}

/// The caller of a board operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<UserIdentity>,
    voter: VoterId,
}

impl Session {
    pub fn authenticated(user: UserIdentity) -> Self {
        let voter = VoterId::User(user.id.clone());
        Self {
            user: Some(user),
            voter,
        }
    }

    pub fn visitor(visitor_id: impl Into<String>) -> Self {
        Self {
            user: None,
            voter: VoterId::Visitor(visitor_id.into()),
        }
    }

    /// A visitor with a freshly minted id.
    pub fn anonymous() -> Self {
        Self::visitor(new_visitor_id())
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl IdentityResolver for Session {
    fn resolve_voter_id(&self) -> VoterId {
        self.voter.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    #[serde(default)]
    visitor_id: Option<String>,
    #[serde(default)]
    user: Option<UserIdentity>,
}

/// Identity of a local client, kept in a small JSON file so the visitor id
/// survives restarts.
///
/// The HTTP server resolves visitors per request from the query string and
/// never reads this file. Clients embedding `quadro-core` directly keep it at
/// `<config dir>/quadro/identity.json` and hand [`VisitorIdentity::session`]
/// to the board service, so a repeat vote after a restart is recognised.
#[derive(Debug)]
pub struct VisitorIdentity {
    path: PathBuf,
    state: IdentityFile,
}

impl VisitorIdentity {
    /// Load the identity file, minting and saving a visitor id when the file
    /// is missing, unreadable or has none.
    pub fn load_or_create(path: &Path) -> io::Result<Self> {
        let mut state = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("[quadro.identity.load] Ignoring invalid identity file {}: {}", path.display(), e);
                IdentityFile::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => IdentityFile::default(),
            Err(e) => return Err(e),
        };

        let mut identity_changed = false;
        if state.visitor_id.is_none() {
            state.visitor_id = Some(new_visitor_id());
            identity_changed = true;
        }

        let identity = Self {
            path: path.to_path_buf(),
            state,
        };
        if identity_changed {
            identity.save()?;
            log::info!("[quadro.identity.create] New visitor identity at {}", path.display());
        }
        Ok(identity)
    }

    pub fn visitor_id(&self) -> &str {
        self.state.visitor_id.as_deref().unwrap_or_default()
    }

    pub fn sign_in(&mut self, user: UserIdentity) -> io::Result<()> {
        self.state.user = Some(user);
        self.save()
    }

    pub fn sign_out(&mut self) -> io::Result<()> {
        self.state.user = None;
        self.save()
    }

    pub fn session(&self) -> Session {
        match &self.state.user {
            Some(user) => Session::authenticated(user.clone()),
            None => Session::visitor(self.visitor_id()),
        }
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(io::Error::other)?;
        fs::write(&self.path, json)
    }
}

impl IdentityResolver for VisitorIdentity {
    fn resolve_voter_id(&self) -> VoterId {
        self.session().resolve_voter_id()
    }
}
