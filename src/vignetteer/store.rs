//! Persistence adapter for completed runs.
//!
//! A [`VignetteRecord`] is the durable summary of one completed conversation:
//! topic, the earliest draft, the final presented version, and the full turn
//! sequence. Records are created once per `DONE` run and never mutated.
//!
//! [`VignetteStore`] is the seam the host application implements or reuses:
//! [`JsonlVignetteStore`] persists records as newline-delimited JSON on disk
//! (one record per line, append-only), and [`MemoryVignetteStore`] keeps them
//! in process for tests and demos. Stores must tolerate concurrent
//! independent writes — one record per run, no cross-run coordination.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use vignetteer::store::{JsonlVignetteStore, VignetteStore};
//!
//! # async fn demo(record: vignetteer::store::VignetteRecord) -> Result<(), Box<dyn std::error::Error>> {
//! let store = JsonlVignetteStore::open(&PathBuf::from("vignettes.jsonl"))?;
//! let id = store.save(record).await?;
//! let listed = store.list("user-1").await?;
//! let fetched = store.get(&id).await?;
//! # Ok(())
//! # }
//! ```

use crate::vignetteer::bus::{Turn, TurnKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifier assigned by a store when a record is saved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a conversation could not be summarized into a record.
#[derive(Debug, Clone)]
pub enum RecordError {
    /// No draft-kind turn in the conversation.
    MissingDraft,
    /// No final-kind turn in the conversation.
    MissingFinal,
    /// Sequence numbers are not contiguous from 0.
    BrokenSequence { at: usize, found: u64 },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::MissingDraft => write!(f, "Conversation has no draft turn"),
            RecordError::MissingFinal => write!(f, "Conversation has no final turn"),
            RecordError::BrokenSequence { at, found } => write!(
                f,
                "Turn sequence broken at position {}: found seq {}",
                at, found
            ),
        }
    }
}

impl Error for RecordError {}

/// Durable summary of one completed generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VignetteRecord {
    /// User the run was executed for.
    pub user_id: String,
    /// Topic the run was seeded with.
    pub topic: String,
    /// Content of the earliest draft-kind turn.
    pub initial_vignette: String,
    /// Content of the last final-kind turn.
    pub final_vignette: String,
    /// The full ordered turn sequence.
    pub conversation: Vec<Turn>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl VignetteRecord {
    /// Build a record from a completed conversation, validating its
    /// invariants: contiguous zero-based sequence numbers, at least one draft
    /// turn (the earliest becomes the initial vignette) and at least one
    /// final turn (the last becomes the final vignette).
    pub fn from_turns(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        turns: Vec<Turn>,
    ) -> Result<Self, RecordError> {
        for (position, turn) in turns.iter().enumerate() {
            if turn.seq != position as u64 {
                return Err(RecordError::BrokenSequence {
                    at: position,
                    found: turn.seq,
                });
            }
        }
        let initial = turns
            .iter()
            .find(|t| t.kind == TurnKind::Draft)
            .ok_or(RecordError::MissingDraft)?
            .content
            .clone();
        let fin = turns
            .iter()
            .rev()
            .find(|t| t.kind == TurnKind::Final)
            .ok_or(RecordError::MissingFinal)?
            .content
            .clone();
        Ok(Self {
            user_id: user_id.into(),
            topic: topic.into(),
            initial_vignette: initial,
            final_vignette: fin,
            conversation: turns,
            created_at: Utc::now(),
        })
    }

    /// The full conversation serialized as pretty JSON, for display.
    pub fn conversation_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.conversation)
    }
}

/// Listing entry returned by [`VignetteStore::list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VignetteSummary {
    pub id: RecordId,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

/// Errors surfaced by store operations.
#[derive(Debug)]
pub enum StoreError {
    Io(String),
    Serde(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "I/O error: {}", msg),
            StoreError::Serde(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::NotFound(id) => write!(f, "No record with id {}", id),
        }
    }
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

/// Storage seam for completed runs.
///
/// Implementations guarantee a durable, once-only write per `save` and
/// retrieval by identifier; storage medium and schema are their concern.
#[async_trait]
pub trait VignetteStore: Send + Sync {
    /// Persist a record, returning the identifier assigned to it.
    async fn save(&self, record: VignetteRecord) -> Result<RecordId, StoreError>;

    /// Summaries of a user's records, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<VignetteSummary>, StoreError>;

    /// Fetch one record by identifier.
    async fn get(&self, id: &RecordId) -> Result<VignetteRecord, StoreError>;
}

/// On-disk row: a record plus its assigned id, one JSON line per row.
#[derive(Serialize, Deserialize)]
struct StoredRow {
    id: RecordId,
    #[serde(flatten)]
    record: VignetteRecord,
}

/// Append-only newline-delimited JSON store.
///
/// Rows already on disk are loaded at `open`; saves append one line and are
/// serialized through an async mutex, so independent runs can save
/// concurrently without interleaving lines.
pub struct JsonlVignetteStore {
    file_path: PathBuf,
    rows: Mutex<Vec<StoredRow>>,
}

impl JsonlVignetteStore {
    /// Open an existing store file or start a new one.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let rows = if path.exists() {
            let file = fs::File::open(path)?;
            let reader = BufReader::new(file);
            let mut loaded = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                loaded.push(serde_json::from_str::<StoredRow>(&line)?);
            }
            loaded
        } else {
            Vec::new()
        };
        Ok(Self {
            file_path: path.to_path_buf(),
            rows: Mutex::new(rows),
        })
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// True when the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VignetteStore for JsonlVignetteStore {
    async fn save(&self, record: VignetteRecord) -> Result<RecordId, StoreError> {
        let id = RecordId(Uuid::new_v4().to_string());
        let row = StoredRow {
            id: id.clone(),
            record,
        };
        let line = serde_json::to_string(&row)?;

        let mut rows = self.rows.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        file.sync_all()?;
        rows.push(row);
        Ok(id)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<VignetteSummary>, StoreError> {
        let rows = self.rows.lock().await;
        let mut summaries: Vec<VignetteSummary> = rows
            .iter()
            .filter(|row| row.record.user_id == user_id)
            .map(|row| VignetteSummary {
                id: row.id.clone(),
                topic: row.record.topic.clone(),
                created_at: row.record.created_at,
            })
            .collect();
        summaries.reverse(); // insertion order on disk is oldest first
        Ok(summaries)
    }

    async fn get(&self, id: &RecordId) -> Result<VignetteRecord, StoreError> {
        let rows = self.rows.lock().await;
        rows.iter()
            .find(|row| &row.id == id)
            .map(|row| row.record.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// In-process store for tests and demos.
#[derive(Default)]
pub struct MemoryVignetteStore {
    rows: Mutex<HashMap<RecordId, VignetteRecord>>,
    order: Mutex<Vec<RecordId>>,
}

impl MemoryVignetteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VignetteStore for MemoryVignetteStore {
    async fn save(&self, record: VignetteRecord) -> Result<RecordId, StoreError> {
        let id = RecordId(Uuid::new_v4().to_string());
        self.rows.lock().await.insert(id.clone(), record);
        self.order.lock().await.push(id.clone());
        Ok(id)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<VignetteSummary>, StoreError> {
        let rows = self.rows.lock().await;
        let order = self.order.lock().await;
        let mut summaries: Vec<VignetteSummary> = order
            .iter()
            .filter_map(|id| rows.get(id).map(|record| (id, record)))
            .filter(|(_, record)| record.user_id == user_id)
            .map(|(id, record)| VignetteSummary {
                id: id.clone(),
                topic: record.topic.clone(),
                created_at: record.created_at,
            })
            .collect();
        summaries.reverse();
        Ok(summaries)
    }

    async fn get(&self, id: &RecordId) -> Result<VignetteRecord, StoreError> {
        self.rows
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
