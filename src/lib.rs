//! # Vignetteer
//!
//! Vignetteer is a multi-agent pipeline for generating USMLE-style clinical
//! vignettes. Five role agents — Vignette-Maker, Neuro-Evaluator,
//! Vignette-Evaluator, Vignette-Labeler, and Show-Vignette — take turns over
//! an append-only conversation log, iteratively drafting and refining a
//! vignette until both evaluators accept it, after which it is labeled,
//! presented, and persisted.
//!
//! The crate provides layered abstractions for:
//!
//! * **Conversation log**: [`bus::ConversationLog`], the append-only,
//!   sequence-numbered turn history that serializes one run
//! * **Agents**: [`Agent`] policies per [`agent::AgentRole`], each producing
//!   exactly one [`bus::Turn`] per invocation from the shared history
//! * **Orchestration**: [`Orchestrator`], the state machine that sequences
//!   agent turns with a bounded revision loop, per-call timeouts and retries,
//!   and cooperative cancellation
//! * **Providers**: [`generation::TextGenerator`] implemented for
//!   OpenAI-compatible endpoints via [`clients::openai::OpenAIClient`]
//! * **Persistence**: [`store::VignetteStore`] with on-disk
//!   ([`store::JsonlVignetteStore`]) and in-memory implementations
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use vignetteer::clients::openai::{Model, OpenAIClient};
//! use vignetteer::store::{JsonlVignetteStore, VignetteStore};
//! use vignetteer::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vignetteer::init_logger();
//!
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = Arc::new(OpenAIClient::new_with_model_enum(&key, Model::Gpt4o));
//!     let orchestrator = Orchestrator::with_default_agents("usmle", "USMLE Pipeline", client);
//!
//!     let run = orchestrator.run("multiple sclerosis").await?;
//!     let record = run.into_record("user-1")?;
//!
//!     let store = JsonlVignetteStore::open(&PathBuf::from("vignettes.jsonl"))?;
//!     let id = store.save(record).await?;
//!     println!("saved vignette {}", id);
//!     Ok(())
//! }
//! ```
//!
//! Failed runs are never persisted: [`orchestrator::RunFailure`] carries the
//! structured reason and the partial turn history for diagnostics instead.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight opt-in for `RUST_LOG` driven diagnostics without forcing a
/// logging backend on embedding applications.
///
/// ```rust
/// vignetteer::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `vignetteer` module.
pub mod vignetteer;

// Re-exporting key items for easier external access.
pub use crate::vignetteer::agent::{self, Agent, AgentRole, Verdict};
pub use crate::vignetteer::bus::{self, ConversationLog, Turn, TurnKind};
pub use crate::vignetteer::clients;
pub use crate::vignetteer::config::{self, PipelineConfig};
pub use crate::vignetteer::generation::{self, Message, Role, TextGenerator, TokenUsage};
pub use crate::vignetteer::orchestrator::{
    self, CancelToken, CompletedRun, Orchestrator, RunError, RunFailure, RunState,
};
pub use crate::vignetteer::store::{
    self, JsonlVignetteStore, MemoryVignetteStore, RecordId, VignetteRecord, VignetteStore,
    VignetteSummary,
};
