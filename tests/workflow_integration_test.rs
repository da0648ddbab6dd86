//! End-to-end scenarios driving `WorkflowOrchestrator::run` against
//! deterministic mock providers. Each test is one of the seed scenarios a
//! full pipeline run must satisfy: happy-path ordering, novelty dedup,
//! parser resilience, stage-local timeout fallback, the re-evaluation
//! bias-prevention invariant, and cancellation on the global deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ideaforge::batch::{ADVOCATE_FALLBACK, SKEPTIC_FALLBACK};
use ideaforge::cache::InMemoryCache;
use ideaforge::error::{ProviderError, WorkflowError};
use ideaforge::progress::NullProgressSink;
use ideaforge::provider::{GenerateRequest, GenerateResponse, MockProvider, ModelProvider};
use ideaforge::state::{FailureKind, FailureStage, WorkflowOptions};
use ideaforge::{ProviderBatchOps, ProviderInferenceEngine, ProviderMultiDimEvaluator, WorkflowOrchestrator};

const TRAFFIC_IDEAS: &str = r#"[
    {"title":"Bike lane network","description":"protected lanes on arterial roads","key_features":["low cost"]},
    {"title":"Bus rapid transit","description":"dedicated bus lanes downtown","key_features":[]},
    {"title":"Congestion pricing","description":"toll the city center at peak hours","key_features":[]},
    {"title":"Carpool incentives","description":"HOV lanes and parking discounts","key_features":[]},
    {"title":"Remote work subsidy","description":"employer credits for fewer commutes","key_features":[]}
]"#;

const TRAFFIC_SCORES: &str =
    "score: 9, comment: strong\nscore: 7, comment: solid\nscore: 5, comment: ok\nscore: 4, comment: meh\nscore: 2, comment: weak\n";

fn base_opts() -> WorkflowOptions {
    let mut opts = WorkflowOptions::default();
    opts.num_top_candidates = 2;
    opts.multi_dimensional = false;
    opts.logical_inference = false;
    opts.cache_enabled = false;
    opts.enable_novelty_filter = false;
    opts
}

fn orchestrator_for(
    provider: Arc<MockProvider>,
) -> WorkflowOrchestrator<
    ProviderBatchOps<Arc<MockProvider>>,
    ProviderMultiDimEvaluator<Arc<MockProvider>>,
    ProviderInferenceEngine<Arc<MockProvider>>,
    InMemoryCache,
    NullProgressSink,
> {
    WorkflowOrchestrator::new(
        ProviderBatchOps::new(provider.clone()),
        ProviderMultiDimEvaluator::new(provider.clone(), 0.3),
        ProviderInferenceEngine::new(provider, 0.5),
        Arc::new(InMemoryCache::new()),
        Arc::new(NullProgressSink),
    )
}

#[tokio::test]
async fn happy_path_orders_top_candidates_by_score() {
    let provider = Arc::new(
        MockProvider::new("")
            .with_response("Generate exactly", TRAFFIC_IDEAS)
            .with_response("Evaluate each of the following", TRAFFIC_SCORES)
            .with_response("build the strongest case", r#"["Protected lanes cut injuries","Dedicated lanes move more riders per hour"]"#)
            .with_response("critically analyze it", r#"["Needs road space from cars","Ridership is uncertain"]"#)
            .with_response("produce an improved version", r#"["Bike lane network with protected intersections","Bus rapid transit with signal priority"]"#),
    );
    let orchestrator = orchestrator_for(provider);

    let candidates = orchestrator
        .run("Reduce urban traffic", "limited city budget", &base_opts())
        .await
        .expect("run should succeed");

    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].idea.display().contains("Bike lane network"));
    assert_eq!(candidates[0].initial_score, 9.0);
    assert!(candidates[1].idea.display().contains("Bus rapid transit"));
    assert_eq!(candidates[1].initial_score, 7.0);
    assert_eq!(candidates[0].advocacy, "Protected lanes cut injuries");
    assert_eq!(candidates[0].skepticism, "Needs road space from cars");
    assert!(candidates[0].improved_idea.display().contains("protected intersections"));
    assert!(candidates[0].partial_failures.is_empty());
}

#[tokio::test]
async fn novelty_filter_drops_exact_duplicate_before_selection() {
    let ideas = r#"[
        {"title":"Build rooftop solar gardens","description":"","key_features":[]},
        {"title":"Build rooftop solar gardens!","description":"","key_features":[]},
        {"title":"Expand district heating","description":"","key_features":[]}
    ]"#;
    let provider = Arc::new(
        MockProvider::new("")
            .with_response("Generate exactly", ideas)
            .with_response("Evaluate each of the following", "score: 8, comment: a\nscore: 8, comment: b\nscore: 6, comment: c\n")
            .with_response("build the strongest case", r#"["case a","case b","case c"]"#)
            .with_response("critically analyze it", r#"["risk a","risk b","risk c"]"#)
            .with_response("produce an improved version", r#"["improved a","improved b","improved c"]"#),
    );
    let mut opts = base_opts();
    opts.num_top_candidates = 3;
    opts.enable_novelty_filter = true;
    let orchestrator = orchestrator_for(provider);

    let candidates = orchestrator.run("Energy transition", "", &opts).await.expect("run should succeed");

    // Three ideas generated, one is an exact duplicate after normalization —
    // only two distinct ideas should survive to be scored and returned, even
    // though three candidates were requested.
    assert_eq!(candidates.len(), 2);
}

#[tokio::test]
async fn evaluator_resilience_parses_key_value_text_and_pads_missing_records() {
    // Only one score/comment record for two ideas: `parse_records` must pad
    // the missing second record rather than fail the batch.
    let ideas = r#"[
        {"title":"Idea one","description":"","key_features":[]},
        {"title":"Idea two","description":"","key_features":[]}
    ]"#;
    let provider = Arc::new(
        MockProvider::new("")
            .with_response("Generate exactly", ideas)
            .with_response("Evaluate each of the following", "score: 7, comment: good\n")
            .with_response("build the strongest case", r#"["case one","case two"]"#)
            .with_response("critically analyze it", r#"["risk one","risk two"]"#)
            .with_response("produce an improved version", r#"["improved one","improved two"]"#),
    );
    let mut opts = base_opts();
    opts.num_top_candidates = 2;
    let orchestrator = orchestrator_for(provider);

    let candidates = orchestrator.run("Topic", "", &opts).await.expect("run should succeed");

    assert_eq!(candidates.len(), 2);
    let scores: Vec<f64> = candidates.iter().map(|c| c.initial_score).collect();
    assert!(scores.contains(&7.0));
    // The idea with no matching record gets the missing-evaluation fallback.
    let missing = candidates.iter().find(|c| c.initial_score == 0.0).expect("one padded record");
    assert_eq!(missing.initial_critique, "Evaluation missing");
}

struct SlowSkepticProvider;

#[async_trait]
impl ModelProvider for SlowSkepticProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        if request.prompt.contains("critically analyze it") {
            // Longer than the orchestrator's fixed skeptic-phase timeout;
            // the paused clock below fast-forwards through this wait.
            tokio::time::sleep(Duration::from_secs(60)).await;
            return Ok(GenerateResponse { text: String::new(), tokens_used: 0 });
        }
        let text = if request.prompt.contains("Generate exactly") {
            TRAFFIC_IDEAS
        } else if request.prompt.contains("Evaluate each of the following") {
            TRAFFIC_SCORES
        } else if request.prompt.contains("build the strongest case") {
            r#"["case a","case b"]"#
        } else if request.prompt.contains("produce an improved version") {
            r#"["improved a","improved b"]"#
        } else {
            ""
        };
        Ok(GenerateResponse { text: text.to_string(), tokens_used: 0 })
    }
}

#[tokio::test(start_paused = true)]
async fn skeptic_timeout_falls_back_and_records_a_failure_note() {
    let orchestrator = WorkflowOrchestrator::new(
        ProviderBatchOps::new(SlowSkepticProvider),
        ProviderMultiDimEvaluator::new(SlowSkepticProvider, 0.3),
        ProviderInferenceEngine::new(SlowSkepticProvider, 0.5),
        Arc::new(InMemoryCache::new()),
        Arc::new(NullProgressSink),
    );

    let candidates = orchestrator
        .run("Reduce urban traffic", "budget constrained", &base_opts())
        .await
        .expect("run should still complete via fallback");

    assert_eq!(candidates.len(), 2);
    for candidate in &candidates {
        assert_eq!(candidate.skepticism, SKEPTIC_FALLBACK);
        assert_ne!(candidate.advocacy, ADVOCATE_FALLBACK);
        assert!(candidate
            .partial_failures
            .iter()
            .any(|f| f.stage == FailureStage::Skepticism && f.kind == FailureKind::TimeoutError));
    }
}

#[tokio::test]
async fn re_evaluation_reuses_original_context_without_bias_language() {
    let context = "must work for a mid-sized coastal city";
    let provider = Arc::new(
        MockProvider::new("")
            .with_response("Generate exactly", TRAFFIC_IDEAS)
            .with_response("Evaluate each of the following", TRAFFIC_SCORES)
            .with_response("build the strongest case", r#"["case a","case b"]"#)
            .with_response("critically analyze it", r#"["risk a","risk b"]"#)
            .with_response(
                "produce an improved version",
                r#"["Bike lane network with protected intersections","Bus rapid transit with signal priority"]"#,
            ),
    );
    let orchestrator = orchestrator_for(provider.clone());

    orchestrator.run("Reduce urban traffic", context, &base_opts()).await.expect("run should succeed");

    let prompts = provider.recorded_prompts();
    let evaluate_prompts: Vec<&String> =
        prompts.iter().filter(|p| p.contains("Evaluate each of the following")).collect();

    // One call for the initial evaluation, one for re-evaluating the
    // improved ideas — both must carry the exact original context string.
    assert_eq!(evaluate_prompts.len(), 2);
    for prompt in &evaluate_prompts {
        assert!(prompt.contains(context));
        let lowered = prompt.to_lowercase();
        assert!(!lowered.contains("improved"));
        assert!(!lowered.contains("enhanced"));
        assert!(!lowered.contains("refined"));
    }
}

struct AlwaysSlowProvider;

#[async_trait]
impl ModelProvider for AlwaysSlowProvider {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(GenerateResponse { text: String::new(), tokens_used: 0 })
    }
}

#[tokio::test(start_paused = true)]
async fn global_deadline_cancels_run_and_surfaces_timeout() {
    let orchestrator = WorkflowOrchestrator::new(
        ProviderBatchOps::new(AlwaysSlowProvider),
        ProviderMultiDimEvaluator::new(AlwaysSlowProvider, 0.3),
        ProviderInferenceEngine::new(AlwaysSlowProvider, 0.5),
        Arc::new(InMemoryCache::new()),
        Arc::new(NullProgressSink),
    );
    let mut opts = base_opts();
    opts.timeout = Duration::from_millis(500);

    let result = orchestrator.run("Topic that never finishes", "", &opts).await;

    assert!(matches!(result, Err(WorkflowError::Timeout { phase: "Run" })));
}

#[tokio::test]
async fn rejects_empty_topic_before_any_provider_call() {
    let provider = Arc::new(MockProvider::new("should never be called"));
    let orchestrator = orchestrator_for(provider.clone());

    let result = orchestrator.run("", "", &base_opts()).await;

    assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    assert!(provider.recorded_prompts().is_empty());
}
