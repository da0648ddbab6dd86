//! Demo CLI for the idea-refinement workflow orchestrator.
//!
//! This binary is a thin wrapper, not part of the core's contract surface
//! (spec.md §6) — it wires a `ModelProvider` (mock, by default, or an HTTP
//! router when `--router-url` is given) to a `WorkflowOrchestrator` and
//! prints the resulting `CandidateResult` list as JSON.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ideaforge::{
    BroadcastProgressSink, HttpModelProvider, InMemoryCache, MockProvider, ProviderBatchOps,
    ProviderInferenceEngine, ProviderMultiDimEvaluator, WorkflowOptions, WorkflowOrchestrator,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Topic to generate and refine ideas for.
    #[arg(long)]
    topic: String,

    /// Constraints/context for the run (<= 1000 chars).
    #[arg(long, default_value = "")]
    context: String,

    /// Number of top candidates to return (1-5).
    #[arg(long, default_value_t = 3)]
    num_top_candidates: usize,

    /// Base URL of an OpenAI-style chat-completions router. When omitted, a
    /// deterministic mock provider is used instead.
    #[arg(long)]
    router_url: Option<String>,

    /// Model name to request from the router.
    #[arg(long, default_value = "gpt-4")]
    model: String,

    /// Enable the logical-inference side branch.
    #[arg(long, default_value_t = false)]
    logical_inference: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let mut opts = WorkflowOptions::default();
    opts.num_top_candidates = args.num_top_candidates.clamp(1, 5);
    opts.logical_inference = args.logical_inference;

    let progress = Arc::new(ideaforge::BroadcastProgressSink::new());
    let mut subscriber = progress.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            info!(fraction = event.fraction, "{}", event.message);
        }
    });

    let candidates = if let Some(router_url) = args.router_url {
        run_with_provider(
            Arc::new(HttpModelProvider::new(router_url, args.model)),
            &args.topic,
            &args.context,
            &opts,
            progress.clone(),
        )
        .await?
    } else {
        run_with_provider(Arc::new(demo_mock_provider()), &args.topic, &args.context, &opts, progress.clone())
            .await?
    };

    println!("{}", serde_json::to_string_pretty(&candidates)?);
    Ok(())
}

async fn run_with_provider<P>(
    provider: Arc<P>,
    topic: &str,
    context: &str,
    opts: &WorkflowOptions,
    progress: Arc<BroadcastProgressSink>,
) -> Result<Vec<ideaforge::CandidateResult>>
where
    P: ideaforge::ModelProvider + 'static,
{
    let temperature = 0.7;
    let orchestrator = WorkflowOrchestrator::new(
        ProviderBatchOps::new(provider.clone()),
        ProviderMultiDimEvaluator::new(provider.clone(), temperature),
        ProviderInferenceEngine::new(provider, temperature),
        Arc::new(InMemoryCache::new()),
        progress,
    );

    Ok(orchestrator.run(topic, context, opts).await?)
}

fn demo_mock_provider() -> MockProvider {
    MockProvider::new("A solid idea with clear next steps.")
}
