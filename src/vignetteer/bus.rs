//! Append-only conversation log shared by the pipeline agents.
//!
//! A [`ConversationLog`] is the message bus for one generation run: every
//! agent reads the full [`Turn`] history and appends exactly one new turn per
//! invocation. Turns are immutable once appended and carry a contiguous,
//! zero-based sequence number assigned by the log itself.
//!
//! The log is the serialization point for a run. Appends acquire the inner
//! lock without blocking; two callers appending to the same log at the same
//! time means the run is not being driven sequentially, and the loser gets a
//! [`BusError::Ordering`] instead of a silently interleaved history.
//!
//! # Example
//!
//! ```rust
//! use vignetteer::bus::{ConversationLog, TurnKind};
//! use vignetteer::agent::AgentRole;
//!
//! let log = ConversationLog::new("multiple sclerosis");
//! let turn = log
//!     .append(AgentRole::Maker, TurnKind::Draft, "A 31-year-old woman...")
//!     .unwrap();
//! assert_eq!(turn.seq, 0);
//! assert_eq!(log.history().len(), 1);
//! assert!(log.latest(TurnKind::Final).is_err());
//! ```

use crate::vignetteer::agent::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::{Mutex, TryLockError};
use uuid::Uuid;

/// Classification of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
    /// A vignette draft or revision from the Maker.
    Draft,
    /// An evaluator's assessment of the latest draft.
    Critique,
    /// The Labeler's diagnosis / content-outline classification.
    Label,
    /// The presentable artifact emitted by Show-Vignette; ends the run.
    Final,
    /// Orchestrator bookkeeping (topic seed, cancellation notes).
    System,
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnKind::Draft => "draft",
            TurnKind::Critique => "critique",
            TurnKind::Label => "label",
            TurnKind::Final => "final",
            TurnKind::System => "system",
        };
        write!(f, "{}", name)
    }
}

/// One immutable message in a conversation.
///
/// Sequence numbers are assigned by [`ConversationLog::append`] and form a
/// strictly increasing sequence starting at 0 within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Which agent produced this turn.
    pub role: AgentRole,
    /// Zero-based position in the conversation.
    pub seq: u64,
    /// Semantic classification of the turn.
    pub kind: TurnKind,
    /// Free-form text content.
    pub content: String,
    /// When the turn was appended.
    pub timestamp: DateTime<Utc>,
}

/// Errors surfaced by the conversation log.
#[derive(Debug, Clone)]
pub enum BusError {
    /// Concurrent unsynchronized append to one conversation.
    Ordering(String),
    /// No turn of the requested kind exists yet.
    NotFound(TurnKind),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Ordering(msg) => write!(f, "Ordering violation: {}", msg),
            BusError::NotFound(kind) => write!(f, "No '{}' turn in conversation", kind),
        }
    }
}

impl Error for BusError {}

/// Ordered, append-only turn history for one generation run.
///
/// Owns its turns. `append` assigns sequence numbers; `history` returns a
/// snapshot; `latest` finds the most recent turn of a kind. Nothing is ever
/// removed or edited.
pub struct ConversationLog {
    run_id: String,
    topic: String,
    turns: Mutex<Vec<Turn>>,
}

impl ConversationLog {
    /// Create an empty log for the given topic with a fresh run id.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            turns: Mutex::new(Vec::new()),
        }
    }

    /// Unique identifier of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The clinical topic this run was seeded with. Immutable.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append one turn, assigning it the next sequence number.
    ///
    /// Fails with [`BusError::Ordering`] if another append is in flight:
    /// the log refuses to block because overlapping appends mean the caller
    /// broke the one-call-at-a-time protocol.
    pub fn append(
        &self,
        role: AgentRole,
        kind: TurnKind,
        content: impl Into<String>,
    ) -> Result<Turn, BusError> {
        let mut turns = match self.turns.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(BusError::Ordering(format!(
                    "concurrent append to run {}",
                    self.run_id
                )))
            }
            Err(TryLockError::Poisoned(e)) => {
                return Err(BusError::Ordering(format!(
                    "conversation lock poisoned: {}",
                    e
                )))
            }
        };
        let turn = Turn {
            role,
            seq: turns.len() as u64,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        };
        turns.push(turn.clone());
        Ok(turn)
    }

    /// Ordered snapshot of the full turn history.
    ///
    /// Calling this twice without an intervening append yields identical
    /// sequences.
    pub fn history(&self) -> Vec<Turn> {
        match self.turns.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of turns appended so far.
    pub fn len(&self) -> usize {
        match self.turns.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// True if no turns have been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent turn of the given kind.
    pub fn latest(&self, kind: TurnKind) -> Result<Turn, BusError> {
        let turns = match self.turns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        turns
            .iter()
            .rev()
            .find(|t| t.kind == kind)
            .cloned()
            .ok_or(BusError::NotFound(kind))
    }
}

/// Find the most recent turn of a kind in a plain history slice.
///
/// Agents receive history as `&[Turn]` rather than a log handle, so they use
/// this instead of [`ConversationLog::latest`].
pub fn latest_of(history: &[Turn], kind: TurnKind) -> Option<&Turn> {
    history.iter().rev().find(|t| t.kind == kind)
}
