//! Turn-taking state machine driving the five agents.
//!
//! An [`Orchestrator`] owns one agent per [`AgentRole`] plus a
//! [`PipelineConfig`] and runs the refinement protocol to completion:
//!
//! ```text
//! DRAFTING → NEURO_REVIEW → VIGNETTE_REVIEW → LABELING → PRESENTING → DONE
//!                 │                │
//!                 └──► REVISE ◄────┘        (evaluator requested changes)
//!                        │
//!                        └──► back to the review that requested it
//! ```
//!
//! A revision request sends the Maker a critique to address; the revised
//! draft then returns to the evaluator that objected, so every revision
//! request costs exactly one draft + one critique pair. A clean run appends
//! five turns (draft, neuro critique, vignette critique, label, final); a run
//! with N revisions appends 5 + 2N. Labeling is only reached once both
//! evaluators have accepted the current line of drafts.
//!
//! The revision loop is bounded by `max_revision_cycles`; hitting the budget
//! fails the run with [`RunError::BudgetExceeded`] instead of looping
//! forever. Each agent call is wrapped in `call_timeout` and retried up to
//! `generation_retries` extra times on failure; timeouts count as generation
//! failures. Runs can be cancelled cooperatively via a [`CancelToken`]; a
//! cancellation while a provider call is pending abandons that call's result
//! without appending a turn.
//!
//! One run is strictly sequential — the orchestrator blocks on each pending
//! agent call, and the conversation log's append is the serialization point.
//! Independent runs (distinct topics or users) may execute concurrently; they
//! share no mutable state.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vignetteer::clients::openai::{Model, OpenAIClient};
//! use vignetteer::orchestrator::Orchestrator;
//!
//! # async {
//! let client = Arc::new(OpenAIClient::new_with_model_enum("key", Model::Gpt4o));
//! let orchestrator = Orchestrator::with_default_agents("usmle", "USMLE Pipeline", client)
//!     .with_max_revision_cycles(5);
//!
//! match orchestrator.run("chest pain in a 45-year-old").await {
//!     Ok(run) => {
//!         let record = run.into_record("user-1").unwrap();
//!         println!("final: {}", record.final_vignette);
//!     }
//!     Err(failure) => eprintln!("run failed: {}", failure),
//! }
//! # };
//! ```

use crate::vignetteer::agent::{Agent, AgentError, AgentRole, TurnPayload, Verdict};
use crate::vignetteer::bus::{BusError, ConversationLog, Turn};
use crate::vignetteer::config::PipelineConfig;
use crate::vignetteer::generation::TextGenerator;
use crate::vignetteer::store::{RecordError, VignetteRecord};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// States of the refinement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Drafting,
    NeuroReview,
    VignetteReview,
    Revise,
    Labeling,
    Presenting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Drafting => "DRAFTING",
            RunState::NeuroReview => "NEURO_REVIEW",
            RunState::VignetteReview => "VIGNETTE_REVIEW",
            RunState::Revise => "REVISE",
            RunState::Labeling => "LABELING",
            RunState::Presenting => "PRESENTING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Terminal failure reasons for a run.
#[derive(Debug, Clone)]
pub enum RunError {
    /// An agent's generation call failed or timed out beyond the retry budget.
    Generation(String),
    /// Concurrent unsynchronized append to the run's conversation.
    Ordering(String),
    /// A required agent or turn kind was absent. Indicates a wiring error.
    NotFound(String),
    /// The revision loop hit `max_revision_cycles`.
    BudgetExceeded(usize),
    /// The run was cancelled between agent invocations.
    Cancelled,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Generation(msg) => write!(f, "Generation failed: {}", msg),
            RunError::Ordering(msg) => write!(f, "Ordering violation: {}", msg),
            RunError::NotFound(what) => write!(f, "Not found: {}", what),
            RunError::BudgetExceeded(cycles) => {
                write!(f, "Revision budget exhausted after {} cycles", cycles)
            }
            RunError::Cancelled => write!(f, "Run cancelled"),
        }
    }
}

impl Error for RunError {}

impl From<BusError> for RunError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Ordering(msg) => RunError::Ordering(msg),
            BusError::NotFound(kind) => RunError::NotFound(kind.to_string()),
        }
    }
}

/// A failed run: the structured reason plus the in-memory history up to the
/// failure point, for diagnostics. Partial runs are never persisted.
#[derive(Debug)]
pub struct RunFailure {
    /// State the machine was in when it failed.
    pub failed_in: RunState,
    /// Why the run failed.
    pub error: RunError,
    /// Turns appended before the failure.
    pub turns: Vec<Turn>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run failed in {} after {} turns: {}",
            self.failed_in,
            self.turns.len(),
            self.error
        )
    }
}

impl Error for RunFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// A completed run, ready to be handed to the persistence adapter.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub run_id: String,
    pub topic: String,
    pub turns: Vec<Turn>,
    /// How many revision cycles the evaluators requested.
    pub revision_cycles: usize,
}

impl CompletedRun {
    /// Derive the [`VignetteRecord`] for this run on behalf of a user.
    pub fn into_record(self, user_id: impl Into<String>) -> Result<VignetteRecord, RecordError> {
        VignetteRecord::from_turns(user_id, self.topic, self.turns)
    }
}

/// Cooperative cancellation flag for a run.
///
/// Cheap to clone; cancelling any clone cancels them all. The orchestrator
/// checks the token between agent invocations, so a cancellation during a
/// pending provider call abandons that call's result without appending a
/// turn.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the associated run.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives the five agents through the refinement protocol.
pub struct Orchestrator {
    /// Stable identifier used in logs.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    agents: HashMap<AgentRole, Agent>,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Create an orchestrator with no agents registered.
    ///
    /// All five roles must be added via [`add_agent`](Orchestrator::add_agent)
    /// before [`run`](Orchestrator::run) can succeed.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agents: HashMap::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Create an orchestrator with all five roles backed by one shared client
    /// and their default system prompts.
    pub fn with_default_agents(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn TextGenerator>,
    ) -> Self {
        let mut orchestrator = Self::new(id, name);
        for role in [
            AgentRole::Maker,
            AgentRole::NeuroEvaluator,
            AgentRole::VignetteEvaluator,
            AgentRole::Labeler,
            AgentRole::ShowVignette,
        ]
        .iter()
        {
            orchestrator.add_agent(Agent::for_role(*role, client.clone()));
        }
        orchestrator
    }

    /// Register an agent, replacing any previous agent for the same role.
    pub fn add_agent(&mut self, agent: Agent) {
        self.agents.insert(agent.role, agent);
    }

    /// Replace the whole configuration (builder pattern).
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the revision-loop budget (builder pattern).
    pub fn with_max_revision_cycles(mut self, cycles: usize) -> Self {
        self.config.max_revision_cycles = cycles;
        self
    }

    /// Override the per-call retry count (builder pattern).
    pub fn with_generation_retries(mut self, retries: usize) -> Self {
        self.config.generation_retries = retries;
        self
    }

    /// Override the per-call timeout (builder pattern).
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for a topic to completion or failure.
    pub async fn run(&self, topic: &str) -> Result<CompletedRun, RunFailure> {
        self.run_with_cancel(topic, CancelToken::new()).await
    }

    /// Run the pipeline with an external cancellation token.
    pub async fn run_with_cancel(
        &self,
        topic: &str,
        cancel: CancelToken,
    ) -> Result<CompletedRun, RunFailure> {
        let log = ConversationLog::new(topic);
        info!(
            "[{}] run {} started, topic: {}",
            self.id,
            log.run_id(),
            topic
        );

        let mut state = RunState::Drafting;
        let mut revision_cycles = 0usize;
        // Which review the next revised draft returns to.
        let mut resume_review = RunState::NeuroReview;

        let fail = |state: RunState, error: RunError, log: &ConversationLog| {
            warn!("[{}] run {} failed in {}: {}", self.id, log.run_id(), state, error);
            Err(RunFailure {
                failed_in: state,
                error,
                turns: log.history(),
            })
        };

        while state != RunState::Done {
            if cancel.is_cancelled() {
                return fail(state, RunError::Cancelled, &log);
            }
            debug!("[{}] run {} state {}", self.id, log.run_id(), state);

            match state {
                RunState::Drafting | RunState::Revise => {
                    if state == RunState::Revise {
                        revision_cycles += 1;
                        if revision_cycles >= self.config.max_revision_cycles {
                            return fail(
                                state,
                                RunError::BudgetExceeded(revision_cycles),
                                &log,
                            );
                        }
                    }
                    if let Err(e) = self.advance(AgentRole::Maker, topic, &log, &cancel).await {
                        return fail(state, e, &log);
                    }
                    state = if state == RunState::Drafting {
                        RunState::NeuroReview
                    } else {
                        resume_review
                    };
                }
                RunState::NeuroReview | RunState::VignetteReview => {
                    let role = if state == RunState::NeuroReview {
                        AgentRole::NeuroEvaluator
                    } else {
                        AgentRole::VignetteEvaluator
                    };
                    let turn = match self.advance(role, topic, &log, &cancel).await {
                        Ok(turn) => turn,
                        Err(e) => return fail(state, e, &log),
                    };
                    let verdict = Verdict::parse(&turn.content);
                    state = match (verdict, state) {
                        (Verdict::Accept, RunState::NeuroReview) => RunState::VignetteReview,
                        (Verdict::Accept, _) => RunState::Labeling,
                        (Verdict::Revise, review) => {
                            debug!(
                                "[{}] run {} revision requested by {}",
                                self.id,
                                log.run_id(),
                                role
                            );
                            resume_review = review;
                            RunState::Revise
                        }
                    };
                }
                RunState::Labeling => {
                    if let Err(e) = self.advance(AgentRole::Labeler, topic, &log, &cancel).await {
                        return fail(state, e, &log);
                    }
                    state = RunState::Presenting;
                }
                RunState::Presenting => {
                    if let Err(e) = self
                        .advance(AgentRole::ShowVignette, topic, &log, &cancel)
                        .await
                    {
                        return fail(state, e, &log);
                    }
                    state = RunState::Done;
                }
                RunState::Done | RunState::Failed => unreachable!("terminal state in loop"),
            }
        }

        info!(
            "[{}] run {} done: {} turns, {} revision cycles",
            self.id,
            log.run_id(),
            log.len(),
            revision_cycles
        );
        Ok(CompletedRun {
            run_id: log.run_id().to_string(),
            topic: topic.to_string(),
            turns: log.history(),
            revision_cycles,
        })
    }

    /// Invoke one agent with the timeout and retry budget applied.
    async fn call_agent(
        &self,
        role: AgentRole,
        topic: &str,
        log: &ConversationLog,
    ) -> Result<TurnPayload, RunError> {
        let agent = self
            .agents
            .get(&role)
            .ok_or_else(|| RunError::NotFound(format!("no agent registered for {}", role)))?;
        let history = log.history();

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome =
                match tokio::time::timeout(self.config.call_timeout, agent.act(topic, &history))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Generation(format!(
                        "{} timed out after {:?}",
                        agent.name, self.config.call_timeout
                    ))),
                };
            match outcome {
                Ok(payload) => return Ok(payload),
                // A missing prerequisite turn is a protocol bug, not a flaky
                // provider; retrying cannot fix it.
                Err(AgentError::MissingTurn(kind)) => {
                    return Err(RunError::NotFound(format!(
                        "{} found no '{}' turn to act on",
                        agent.name, kind
                    )))
                }
                Err(AgentError::Generation(msg)) => {
                    if attempt > self.config.generation_retries {
                        return Err(RunError::Generation(format!(
                            "{} failed after {} attempts: {}",
                            agent.name, attempt, msg
                        )));
                    }
                    warn!(
                        "[{}] {} attempt {} failed, retrying: {}",
                        self.id, agent.name, attempt, msg
                    );
                }
            }
        }
    }

    /// Invoke one agent and append its turn.
    ///
    /// A cancellation raised while the call was pending abandons the call's
    /// result: nothing is appended and the run fails with
    /// [`RunError::Cancelled`].
    async fn advance(
        &self,
        role: AgentRole,
        topic: &str,
        log: &ConversationLog,
        cancel: &CancelToken,
    ) -> Result<Turn, RunError> {
        let payload = self.call_agent(role, topic, log).await?;
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let turn = log.append(role, payload.kind, payload.content)?;
        debug!(
            "[{}] run {} turn {} appended: {} {}",
            self.id,
            log.run_id(),
            turn.seq,
            role,
            turn.kind
        );
        Ok(turn)
    }
}
