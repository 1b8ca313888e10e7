//! The five pipeline roles.
//!
//! Each [`Agent`] pairs a role-specific policy with a [`TextGenerator`]
//! client. Given the conversation history it produces exactly one prospective
//! turn ([`TurnPayload`]); the conversation log assigns the sequence number
//! when the orchestrator appends it.
//!
//! Evaluator critiques end with a machine-readable marker,
//! `VERDICT: ACCEPT` or `VERDICT: REVISE`, which [`Verdict::parse`] extracts.
//! A critique without a marker counts as a revision request.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vignetteer::agent::{Agent, AgentRole};
//! use vignetteer::clients::openai::{Model, OpenAIClient};
//!
//! let client = Arc::new(OpenAIClient::new_with_model_enum("key", Model::Gpt4o));
//! let maker = Agent::for_role(AgentRole::Maker, client)
//!     .with_name("Vignette-Maker");
//! ```

use crate::vignetteer::bus::{latest_of, Turn, TurnKind};
use crate::vignetteer::generation::{Message, Role, TextGenerator};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The five pipeline roles, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    /// Drafts the vignette and revises it per critiques.
    Maker,
    /// Reviews neurological and anatomical plausibility.
    NeuroEvaluator,
    /// Reviews NBME item-writing style and exam-format quality.
    VignetteEvaluator,
    /// Classifies the accepted vignette (diagnosis / content outline).
    Labeler,
    /// Packages draft + label into the presentable final turn.
    ShowVignette,
}

impl AgentRole {
    /// Display name matching the original agent roster.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Maker => "Vignette-Maker",
            AgentRole::NeuroEvaluator => "Neuro-Evaluator",
            AgentRole::VignetteEvaluator => "Vignette-Evaluator",
            AgentRole::Labeler => "Vignette-Labeler",
            AgentRole::ShowVignette => "Show-Vignette",
        }
    }

    /// Kind of turn this role appends.
    pub fn turn_kind(&self) -> TurnKind {
        match self {
            AgentRole::Maker => TurnKind::Draft,
            AgentRole::NeuroEvaluator | AgentRole::VignetteEvaluator => TurnKind::Critique,
            AgentRole::Labeler => TurnKind::Label,
            AgentRole::ShowVignette => TurnKind::Final,
        }
    }

    /// Default system prompt for the role.
    fn default_system_prompt(&self) -> &'static str {
        match self {
            AgentRole::Maker => MAKER_PROMPT,
            AgentRole::NeuroEvaluator => NEURO_EVALUATOR_PROMPT,
            AgentRole::VignetteEvaluator => VIGNETTE_EVALUATOR_PROMPT,
            AgentRole::Labeler => LABELER_PROMPT,
            AgentRole::ShowVignette => SHOW_VIGNETTE_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

const MAKER_PROMPT: &str = "You are responsible for creating and refining clinical vignettes for USMLE STEP 1. \
When you receive a topic, create a clinically accurate vignette with a stem, a lead-in question, \
and 5 answer choices. When you receive reviewer feedback, revise the current draft to address \
every point raised while keeping the same format. \
Format the output exactly as follows:\n\
{\n\
   'question': ['string'],\n\
   'correct_answer': ['string'],\n\
   'incorrect_answers': ['string'],\n\
   'rationales': ['string'],\n\
   'usmle_content_outline': ['string'],\n\
}";

const NEURO_EVALUATOR_PROMPT: &str = "As a neurology expert, evaluate: \
(1) anatomical accuracy of the case, \
(2) correlation between symptoms and proposed lesion locations, \
(3) accuracy of the laterality of the symptoms and lesion location, \
(4) accuracy of neurological exam findings. \
Provide detailed feedback on any neurological inconsistencies. \
End your review with exactly one line: 'VERDICT: ACCEPT' if the vignette is \
clinically sound as written, or 'VERDICT: REVISE' if it needs changes.";

const VIGNETTE_EVALUATOR_PROMPT: &str = "As an NBME standards expert, evaluate whether the vignette \
follows NBME item-writing style guidelines, whether the distractors are plausible and educational, \
and whether the question tests appropriate clinical reasoning. \
Provide specific feedback for any violations of NBME standards. \
End your review with exactly one line: 'VERDICT: ACCEPT' if the vignette meets \
the standards as written, or 'VERDICT: REVISE' if it needs changes.";

const LABELER_PROMPT: &str = "Properly classify the vignette according to the NBME content outline. \
State the tested diagnosis and the content-outline category it belongs to.";

const SHOW_VIGNETTE_PROMPT: &str = "Your role is to present the final revised vignette after all \
improvements have been made. Combine the accepted vignette and its classification into one \
clean, presentable version.";

/// Evaluator decision extracted from a critique turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Revise,
}

impl Verdict {
    /// Parse the verdict marker out of critique text.
    ///
    /// The last marker in the text wins; text with no marker is treated as a
    /// revision request.
    pub fn parse(content: &str) -> Verdict {
        let upper = content.to_uppercase();
        let accept = upper.rfind("VERDICT: ACCEPT");
        let revise = upper.rfind("VERDICT: REVISE");
        match (accept, revise) {
            (Some(a), Some(r)) => {
                if a > r {
                    Verdict::Accept
                } else {
                    Verdict::Revise
                }
            }
            (Some(_), None) => Verdict::Accept,
            _ => Verdict::Revise,
        }
    }
}

/// A prospective turn produced by an agent, before the log assigns it a
/// sequence number.
#[derive(Debug, Clone)]
pub struct TurnPayload {
    pub kind: TurnKind,
    pub content: String,
}

/// Errors surfaced by a single agent invocation.
#[derive(Debug)]
pub enum AgentError {
    /// The text-generation call failed or timed out.
    Generation(String),
    /// The history lacks a turn this role needs to act on.
    MissingTurn(TurnKind),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Generation(msg) => write!(f, "Generation failed: {}", msg),
            AgentError::MissingTurn(kind) => {
                write!(f, "History has no '{}' turn to act on", kind)
            }
        }
    }
}

impl Error for AgentError {}

/// A role-specific policy bound to a text-generation client.
///
/// Stateless between invocations: everything an agent knows comes from the
/// history slice passed to [`act`](Agent::act).
pub struct Agent {
    /// Role this agent plays in the protocol.
    pub role: AgentRole,
    /// Display name used in logs.
    pub name: String,
    client: Arc<dyn TextGenerator>,
    system_prompt: String,
}

impl Agent {
    /// Create an agent for a role with that role's default system prompt.
    pub fn for_role(role: AgentRole, client: Arc<dyn TextGenerator>) -> Self {
        Self {
            role,
            name: role.display_name().to_string(),
            client,
            system_prompt: role.default_system_prompt().to_string(),
        }
    }

    /// Override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the role's default system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Model behind this agent, for logging.
    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Produce exactly one new turn from the current history.
    ///
    /// Builds the role-specific context, calls the provider once, and wraps
    /// the output in a [`TurnPayload`]. Does not retry; the orchestrator owns
    /// the retry and timeout budget.
    pub async fn act(&self, topic: &str, history: &[Turn]) -> Result<TurnPayload, AgentError> {
        let context = self.build_context(topic, history)?;
        let content = self
            .client
            .generate(&self.system_prompt, &context)
            .await
            .map_err(|e| AgentError::Generation(e.to_string()))?;
        if content.trim().is_empty() {
            return Err(AgentError::Generation(format!(
                "{} produced empty output",
                self.name
            )));
        }
        Ok(TurnPayload {
            kind: self.role.turn_kind(),
            content,
        })
    }

    fn build_context(&self, topic: &str, history: &[Turn]) -> Result<Vec<Message>, AgentError> {
        match self.role {
            AgentRole::Maker => Ok(self.maker_context(topic, history)),
            AgentRole::NeuroEvaluator | AgentRole::VignetteEvaluator => {
                let draft =
                    latest_of(history, TurnKind::Draft).ok_or(AgentError::MissingTurn(TurnKind::Draft))?;
                Ok(vec![Message::new(
                    Role::User,
                    format!(
                        "Topic: {}\n\nVignette under review:\n{}\n\nProvide your review.",
                        topic, draft.content
                    ),
                )])
            }
            AgentRole::Labeler => {
                let draft =
                    latest_of(history, TurnKind::Draft).ok_or(AgentError::MissingTurn(TurnKind::Draft))?;
                Ok(vec![Message::new(
                    Role::User,
                    format!(
                        "Topic: {}\n\nAccepted vignette:\n{}\n\nClassify it.",
                        topic, draft.content
                    ),
                )])
            }
            AgentRole::ShowVignette => {
                let draft =
                    latest_of(history, TurnKind::Draft).ok_or(AgentError::MissingTurn(TurnKind::Draft))?;
                let label =
                    latest_of(history, TurnKind::Label).ok_or(AgentError::MissingTurn(TurnKind::Label))?;
                Ok(vec![Message::new(
                    Role::User,
                    format!(
                        "Topic: {}\n\nAccepted vignette:\n{}\n\nClassification:\n{}\n\nPresent the final version.",
                        topic, draft.content, label.content
                    ),
                )])
            }
        }
    }

    fn maker_context(&self, topic: &str, history: &[Turn]) -> Vec<Message> {
        match latest_of(history, TurnKind::Draft) {
            None => vec![Message::new(
                Role::User,
                format!(
                    "Create a USMLE STEP 1 clinical vignette about: {}",
                    topic
                ),
            )],
            Some(draft) => {
                // Revision: feed back the prior draft and the critique that
                // requested changes.
                let critique = latest_of(history, TurnKind::Critique)
                    .map(|t| t.content.as_str())
                    .unwrap_or("(no written critique available)");
                vec![
                    Message::new(Role::Assistant, draft.content.clone()),
                    Message::new(
                        Role::User,
                        format!(
                            "Reviewer feedback on the vignette above:\n{}\n\nRevise the vignette to address this feedback. Keep the required format.",
                            critique
                        ),
                    ),
                ]
            }
        }
    }
}
