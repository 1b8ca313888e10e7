//! End-to-end vignette generation demo.
//!
//! Runs the full five-agent pipeline on one clinical topic: the Vignette-Maker
//! drafts, the Neuro-Evaluator and Vignette-Evaluator review (requesting
//! revisions until both accept), the Vignette-Labeler classifies, and
//! Show-Vignette produces the presentable version. The completed run is then
//! persisted to a newline-delimited JSON store on disk.
//!
//! To run this example, set your OpenAI API key:
//! export OPENAI_API_KEY=your_openai_key
//!
//! Then run: cargo run --example generate_vignette
//!
//! Optional: RUST_LOG=debug for per-turn pipeline logging.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vignetteer::clients::openai::{Model, OpenAIClient};
use vignetteer::store::{JsonlVignetteStore, VignetteStore};
use vignetteer::Orchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    vignetteer::init_logger();

    let key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!("Warning: OPENAI_API_KEY not set. Using placeholder.");
        "placeholder_key".to_string()
    });

    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "multiple sclerosis".to_string());
    let user_id = "demo-user";

    println!("=== Vignetteer Pipeline Demo ===");
    println!("Topic: {}\n", topic);

    let client = Arc::new(OpenAIClient::new_with_model_enum(&key, Model::Gpt4o));
    let orchestrator = Orchestrator::with_default_agents("usmle", "USMLE Vignette Pipeline", client)
        .with_max_revision_cycles(3)
        .with_call_timeout(Duration::from_secs(120));

    match orchestrator.run(&topic).await {
        Ok(run) => {
            println!(
                "Run {} completed after {} revision cycle(s) and {} turns.\n",
                run.run_id,
                run.revision_cycles,
                run.turns.len()
            );
            for turn in &run.turns {
                println!("--- [{}] {} ---", turn.kind, turn.role.display_name());
                println!("{}\n", turn.content);
            }

            let record = run.into_record(user_id)?;
            let store = JsonlVignetteStore::open(&PathBuf::from("vignettes.jsonl"))?;
            let id = store.save(record).await?;
            println!("Saved vignette {} to vignettes.jsonl", id);

            println!("\nVignettes on file for {}:", user_id);
            for summary in store.list(user_id).await? {
                println!("  {}  {}  ({})", summary.id, summary.topic, summary.created_at);
            }
        }
        Err(failure) => {
            eprintln!(
                "Run failed in {}: {}. This is expected if OPENAI_API_KEY is not set.",
                failure.failed_in, failure.error
            );
            if !failure.turns.is_empty() {
                eprintln!("Partial history ({} turns) was not persisted.", failure.turns.len());
            }
        }
    }

    Ok(())
}
