use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vignetteer::agent::{Agent, AgentRole};
use vignetteer::bus::TurnKind;
use vignetteer::generation::{GenerateError, Message, TextGenerator};
use vignetteer::orchestrator::{CancelToken, Orchestrator, RunError, RunState};
use vignetteer::store::MemoryVignetteStore;
use vignetteer::VignetteStore;

/// Mock client that always replies with the same text.
struct StaticClient {
    response: String,
}

impl StaticClient {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for StaticClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "static-mock"
    }
}

/// Mock client that walks through scripted responses, repeating the last one.
struct SequenceClient {
    responses: Vec<String>,
    calls: AtomicUsize,
}

impl SequenceClient {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for SequenceClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len() - 1);
        Ok(self.responses[index].clone())
    }

    fn model_name(&self) -> &str {
        "sequence-mock"
    }
}

/// Mock client that fails a fixed number of times before succeeding.
struct FlakyClient {
    failures: usize,
    calls: AtomicUsize,
    response: String,
}

impl FlakyClient {
    fn new(failures: usize, response: &str) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            response: response.to_string(),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FlakyClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(format!("simulated provider outage (call {})", call).into())
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        "flaky-mock"
    }
}

/// Mock client that hangs longer than any reasonable test timeout.
struct SlowClient;

#[async_trait]
impl TextGenerator for SlowClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("too late".to_string())
    }

    fn model_name(&self) -> &str {
        "slow-mock"
    }
}

/// Mock client that cancels a shared token while handling its call.
struct CancellingClient {
    token: CancelToken,
    response: String,
}

#[async_trait]
impl TextGenerator for CancellingClient {
    async fn generate(
        &self,
        _system_prompt: &str,
        _context: &[Message],
    ) -> Result<String, GenerateError> {
        self.token.cancel();
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "cancelling-mock"
    }
}

const ACCEPT: &str = "Sound reasoning throughout. VERDICT: ACCEPT";
const REVISE: &str = "The laterality is inconsistent. VERDICT: REVISE";

fn pipeline(
    maker: Arc<dyn TextGenerator>,
    neuro: Arc<dyn TextGenerator>,
    vignette: Arc<dyn TextGenerator>,
    labeler: Arc<dyn TextGenerator>,
    presenter: Arc<dyn TextGenerator>,
) -> Orchestrator {
    let mut orchestrator = Orchestrator::new("test-pipeline", "Test Pipeline");
    orchestrator.add_agent(Agent::for_role(AgentRole::Maker, maker));
    orchestrator.add_agent(Agent::for_role(AgentRole::NeuroEvaluator, neuro));
    orchestrator.add_agent(Agent::for_role(AgentRole::VignetteEvaluator, vignette));
    orchestrator.add_agent(Agent::for_role(AgentRole::Labeler, labeler));
    orchestrator.add_agent(Agent::for_role(AgentRole::ShowVignette, presenter));
    orchestrator
}

#[tokio::test]
async fn test_clean_run_appends_exactly_five_turns() {
    let orchestrator = pipeline(
        StaticClient::new("the draft"),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("Dx: multiple sclerosis"),
        StaticClient::new("the final vignette"),
    );

    let run = orchestrator.run("multiple sclerosis").await.unwrap();

    assert_eq!(run.turns.len(), 5);
    assert_eq!(run.revision_cycles, 0);
    let kinds: Vec<TurnKind> = run.turns.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TurnKind::Draft,
            TurnKind::Critique,
            TurnKind::Critique,
            TurnKind::Label,
            TurnKind::Final
        ]
    );
    for (position, turn) in run.turns.iter().enumerate() {
        assert_eq!(turn.seq, position as u64);
    }
}

#[tokio::test]
async fn test_end_to_end_chest_pain_scenario() {
    let orchestrator = pipeline(
        StaticClient::new("A 45-year-old man presents with crushing substernal chest pain..."),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("Diagnosis: unstable angina"),
        StaticClient::new("FINAL: A 45-year-old man presents... Answer: unstable angina"),
    );

    let run = orchestrator.run("chest pain in a 45-year-old").await.unwrap();
    let record = run.into_record("user-7").unwrap();

    assert!(!record.initial_vignette.is_empty());
    assert!(record.initial_vignette.contains("45-year-old"));
    assert_eq!(
        record.final_vignette,
        "FINAL: A 45-year-old man presents... Answer: unstable angina"
    );
    assert_eq!(record.conversation.len(), 5);
    assert_eq!(record.topic, "chest pain in a 45-year-old");
    assert!(record.conversation[3].content.contains("unstable angina"));

    // Completed runs round-trip through the persistence seam.
    let store = MemoryVignetteStore::new();
    let id = store.save(record).await.unwrap();
    let fetched = store.get(&id).await.unwrap();
    assert_eq!(fetched.user_id, "user-7");
    let listed = store.list("user-7").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].topic, "chest pain in a 45-year-old");
}

#[tokio::test]
async fn test_single_revision_adds_one_draft_critique_pair() {
    let orchestrator = pipeline(
        SequenceClient::new(&["draft v1", "draft v2"]),
        SequenceClient::new(&[REVISE, ACCEPT]),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    );

    let run = orchestrator.run("stroke").await.unwrap();

    // 5 + 2 * 1 revisions
    assert_eq!(run.turns.len(), 7);
    assert_eq!(run.revision_cycles, 1);
    let kinds: Vec<TurnKind> = run.turns.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TurnKind::Draft,
            TurnKind::Critique,
            TurnKind::Draft,
            TurnKind::Critique,
            TurnKind::Critique,
            TurnKind::Label,
            TurnKind::Final
        ]
    );
    assert_eq!(run.turns[2].content, "draft v2");
}

#[tokio::test]
async fn test_revisions_from_both_evaluators_cost_two_turns_each() {
    let orchestrator = pipeline(
        SequenceClient::new(&["draft v1", "draft v2", "draft v3"]),
        SequenceClient::new(&[REVISE, ACCEPT]),
        SequenceClient::new(&[REVISE, ACCEPT]),
        StaticClient::new("label"),
        StaticClient::new("final"),
    )
    .with_max_revision_cycles(5);

    let run = orchestrator.run("stroke").await.unwrap();

    // 5 + 2 * 2 revisions
    assert_eq!(run.turns.len(), 9);
    assert_eq!(run.revision_cycles, 2);
    // The vignette evaluator's revision returns to the vignette evaluator,
    // not back to the start of the review sequence.
    let critique_roles: Vec<AgentRole> = run
        .turns
        .iter()
        .filter(|t| t.kind == TurnKind::Critique)
        .map(|t| t.role)
        .collect();
    assert_eq!(
        critique_roles,
        vec![
            AgentRole::NeuroEvaluator,
            AgentRole::NeuroEvaluator,
            AgentRole::VignetteEvaluator,
            AgentRole::VignetteEvaluator
        ]
    );
}

#[tokio::test]
async fn test_revision_budget_exhaustion_fails_the_run() {
    let orchestrator = pipeline(
        StaticClient::new("draft"),
        StaticClient::new(REVISE),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    )
    .with_max_revision_cycles(3);

    let failure = orchestrator.run("stroke").await.unwrap_err();

    match failure.error {
        RunError::BudgetExceeded(cycles) => assert_eq!(cycles, 3),
        other => panic!("expected BudgetExceeded, got {}", other),
    }
    assert_eq!(failure.failed_in, RunState::Revise);
    // Two full draft+critique pairs landed before the third request hit the
    // budget: d,c, d,c, d,c.
    assert_eq!(failure.turns.len(), 6);
}

#[tokio::test]
async fn test_generation_failures_are_retried_then_succeed() {
    let maker = FlakyClient::new(2, "draft");
    let orchestrator = pipeline(
        maker.clone(),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    )
    .with_generation_retries(2);

    let run = orchestrator.run("topic").await.unwrap();
    assert_eq!(run.turns.len(), 5);
    assert_eq!(maker.call_count(), 3); // two failures + one success
}

#[tokio::test]
async fn test_generation_failures_beyond_retry_budget_fail_the_run() {
    let maker = FlakyClient::new(usize::MAX, "never");
    let orchestrator = pipeline(
        maker.clone(),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    )
    .with_generation_retries(1);

    let failure = orchestrator.run("topic").await.unwrap_err();

    match &failure.error {
        RunError::Generation(msg) => assert!(msg.contains("simulated provider outage")),
        other => panic!("expected Generation, got {}", other),
    }
    assert_eq!(failure.failed_in, RunState::Drafting);
    assert!(failure.turns.is_empty());
    assert_eq!(maker.call_count(), 2); // first attempt + one retry
}

#[tokio::test]
async fn test_timeouts_count_as_generation_failures() {
    let orchestrator = pipeline(
        Arc::new(SlowClient),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    )
    .with_generation_retries(0)
    .with_call_timeout(Duration::from_millis(50));

    let failure = orchestrator.run("topic").await.unwrap_err();

    match &failure.error {
        RunError::Generation(msg) => assert!(msg.contains("timed out")),
        other => panic!("expected Generation, got {}", other),
    }
}

#[tokio::test]
async fn test_pre_cancelled_run_appends_nothing() {
    let orchestrator = pipeline(
        StaticClient::new("draft"),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    );

    let token = CancelToken::new();
    token.cancel();
    let failure = orchestrator
        .run_with_cancel("topic", token)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, RunError::Cancelled));
    assert!(failure.turns.is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_call_abandons_the_pending_result() {
    let token = CancelToken::new();
    let orchestrator = pipeline(
        StaticClient::new("draft"),
        Arc::new(CancellingClient {
            token: token.clone(),
            response: ACCEPT.to_string(),
        }),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    );

    let failure = orchestrator
        .run_with_cancel("topic", token)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, RunError::Cancelled));
    // The critique produced by the call that raised the cancellation is
    // abandoned; only the draft appended before it remains.
    assert_eq!(failure.turns.len(), 1);
    assert_eq!(failure.turns[0].kind, TurnKind::Draft);
    assert_eq!(failure.failed_in, RunState::NeuroReview);
}

#[tokio::test]
async fn test_missing_agent_is_a_not_found_failure() {
    let orchestrator = Orchestrator::new("empty", "No Agents");
    let failure = orchestrator.run("topic").await.unwrap_err();

    match &failure.error {
        RunError::NotFound(what) => assert!(what.contains("Vignette-Maker")),
        other => panic!("expected NotFound, got {}", other),
    }
    assert_eq!(failure.failed_in, RunState::Drafting);
}

#[tokio::test]
async fn test_independent_runs_proceed_concurrently() {
    let orchestrator = Arc::new(pipeline(
        StaticClient::new("draft"),
        StaticClient::new(ACCEPT),
        StaticClient::new(ACCEPT),
        StaticClient::new("label"),
        StaticClient::new("final"),
    ));

    let mut handles = Vec::new();
    for i in 0..4 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.run(&format!("topic {}", i)).await
        }));
    }

    for handle in handles {
        let run = handle.await.unwrap().unwrap();
        assert_eq!(run.turns.len(), 5);
    }
}
