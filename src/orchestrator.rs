//! The pipeline state machine (spec.md §4.10): sequences generation →
//! evaluate → select-top-K → (advocate ‖ skeptic) → improve → re-evaluate →
//! assemble. Owns concurrency, timeouts, partial-failure policy, progress
//! emission, and cache lookup/write.
//!
//! Grounded on `debate/orchestrator.rs`'s phase/error shape and
//! `modes/deepthink.rs::execute_strategies`'s `Semaphore` + `JoinSet`
//! bounded fan-out, wrapped in `modes/runner.rs`'s timeout/cancellation idiom.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::{ADVOCATE_FALLBACK, BatchAgentOps, SKEPTIC_FALLBACK};
use crate::cache::{Cache, workflow_cache_key};
use crate::error::{BatchError, WorkflowError};
use crate::evaluator::MultiDimensionalEvaluator;
use crate::inference::LogicalInferenceEngine;
use crate::novelty::{NoveltyFilter, is_meaningful_improvement};
use crate::progress::ProgressSink;
use crate::state::{
    CandidateResult, EvaluatedIdea, FailureKind, FailureNote, FailureStage, IdeaText,
    TemperaturePolicyOption, WorkflowOptions,
};
use crate::temperature::{Stage as TempStage, TemperaturePolicy};

const GENERATE_IDEAS_TIMEOUT: Duration = Duration::from_secs(60);
const EVALUATE_TIMEOUT: Duration = Duration::from_secs(30);
const ADVOCATE_TIMEOUT: Duration = Duration::from_secs(30);
const SKEPTIC_TIMEOUT: Duration = Duration::from_secs(30);
const IMPROVE_TIMEOUT: Duration = Duration::from_secs(45);
const RE_EVALUATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bundles the four collaborators the orchestrator depends on, so that
/// `Run(topic, context, opts)` stays a single call per spec.md §2/§6.
pub struct WorkflowOrchestrator<B, E, I, C, S> {
    batch_ops: B,
    multi_dim: E,
    inference: I,
    cache: Arc<C>,
    progress: Arc<S>,
}

impl<B, E, I, C, S> WorkflowOrchestrator<B, E, I, C, S>
where
    B: BatchAgentOps,
    E: MultiDimensionalEvaluator,
    I: LogicalInferenceEngine,
    C: Cache,
    S: ProgressSink,
{
    pub fn new(batch_ops: B, multi_dim: E, inference: I, cache: Arc<C>, progress: Arc<S>) -> Self {
        Self { batch_ops, multi_dim, inference, cache, progress }
    }

    pub async fn run(
        &self,
        topic: &str,
        context: &str,
        opts: &WorkflowOptions,
    ) -> Result<Vec<CandidateResult>, WorkflowError> {
        if topic.trim().is_empty() || topic.len() > 500 {
            return Err(WorkflowError::Configuration(
                "topic must be 1-500 chars".to_string(),
            ));
        }
        if context.len() > 1000 {
            return Err(WorkflowError::Configuration("context must be <= 1000 chars".to_string()));
        }
        opts.validate()?;

        info!(topic, num_top_candidates = opts.num_top_candidates, "workflow run starting");
        let cancel = CancellationToken::new();
        let result = timeout(opts.timeout, self.run_inner(topic, context, opts, &cancel)).await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                cancel.cancel();
                self.progress.emit("global deadline exceeded", 0.0);
                Err(WorkflowError::Timeout { phase: "Run" })
            }
        }
    }

    async fn run_inner(
        &self,
        topic: &str,
        context: &str,
        opts: &WorkflowOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateResult>, WorkflowError> {
        let cache_key = if opts.cache_enabled {
            Some(workflow_cache_key(topic, context, &options_fingerprint(opts)))
        } else {
            None
        };
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get_workflow(key).await {
                if let Ok(candidates) = serde_json::from_str::<Vec<CandidateResult>>(&cached) {
                    self.progress.emit("cache hit", 1.0);
                    return Ok(candidates);
                }
            }
        }

        let temperature_policy = TemperaturePolicy::from_option(&opts.temperature_policy)
            .map_err(|e| WorkflowError::Configuration(e.to_string()))?;

        self.progress.emit("generating ideas", 0.05);
        let n_requested = (opts.num_top_candidates + 2).max(5);
        let ideas = timeout(
            GENERATE_IDEAS_TIMEOUT,
            self.batch_ops.generate_ideas(
                topic,
                context,
                n_requested,
                temperature_policy.temperature_for(TempStage::IdeaGeneration),
            ),
        )
        .await
        .map_err(|_| WorkflowError::Timeout { phase: "GenerateIdeas" })?
        .map_err(|e| WorkflowError::InvariantViolation(format!("idea generation failed: {e}")))?;

        if ideas.is_empty() {
            self.progress.emit("no ideas generated", 0.0);
            return Err(WorkflowError::InvariantViolation("no ideas generated".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let ideas = if opts.enable_novelty_filter {
            self.progress.emit("filtering duplicates", 0.12);
            let mut filter = NoveltyFilter::new(opts.novelty_similarity_threshold);
            let filtered = filter.filter_all(&ideas);
            if filtered.is_empty() {
                return Err(WorkflowError::InvariantViolation("no novel ideas".to_string()));
            }
            filtered
        } else {
            ideas
        };

        self.progress.emit("evaluating ideas", 0.2);
        let evaluated = self.evaluate_phase(&ideas, topic, context, &temperature_policy).await;
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        self.progress.emit("selecting top candidates", 0.3);
        let top_k = select_top_k(evaluated, opts.num_top_candidates);

        let semaphore = Arc::new(Semaphore::new(opts.max_concurrent_agents));

        let multi_dim_future = async {
            if opts.multi_dimensional {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.multi_dim.evaluate_batch(&idea_texts(&top_k), topic, context).await.ok()
            } else {
                None
            }
        };
        let logical_future = async {
            if opts.logical_inference {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.inference
                    .analyze_batch(&idea_texts(&top_k), topic, context, opts.analysis_type)
                    .await
                    .ok()
            } else {
                None
            }
        };

        self.progress.emit("running advocate and skeptic", 0.45);
        let advocate_skeptic_future = self.advocate_then_skeptic(
            &top_k,
            topic,
            context,
            &temperature_policy,
            &semaphore,
        );

        let (multi_dim_scores, logical_results, (advocacy, skepticism, mut failures)) =
            tokio::join!(multi_dim_future, logical_future, advocate_skeptic_future);

        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        self.progress.emit("improving ideas", 0.65);
        let improved_ideas = self
            .improve_phase(&top_k, &advocacy, &skepticism, context, &temperature_policy)
            .await;

        self.progress.emit("re-evaluating improved ideas", 0.8);
        let (improved_scores, improved_critiques) = self
            .re_evaluate_phase(
                &improved_ideas,
                &top_k,
                topic,
                context,
                &temperature_policy,
                &mut failures,
            )
            .await;

        let improved_multi_dim = if opts.multi_dimensional {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            self.multi_dim.evaluate_batch(&improved_ideas, topic, context).await.ok()
        } else {
            None
        };

        self.progress.emit("assembling results", 0.95);
        let candidates = assemble(
            &top_k,
            &advocacy,
            &skepticism,
            &improved_ideas,
            &improved_scores,
            &improved_critiques,
            multi_dim_scores,
            improved_multi_dim,
            logical_results,
            opts.logical_inference_confidence_threshold,
            failures,
        );

        if let Some(key) = &cache_key {
            if let Ok(serialized) = serde_json::to_string(&candidates) {
                self.cache.put_workflow(key, serialized, Duration::from_secs(3600)).await;
            }
        }

        self.progress.emit("done", 1.0);
        Ok(candidates)
    }

    async fn evaluate_phase(
        &self,
        ideas: &[IdeaText],
        topic: &str,
        context: &str,
        temperature_policy: &TemperaturePolicy,
    ) -> Vec<EvaluatedIdea> {
        let result = timeout(
            EVALUATE_TIMEOUT,
            self.batch_ops.evaluate_batch(
                ideas,
                topic,
                context,
                temperature_policy.temperature_for(TempStage::Evaluation),
            ),
        )
        .await;

        match result {
            Ok(Ok(evaluations)) => ideas
                .iter()
                .zip(evaluations)
                .map(|(idea, eval)| {
                    if eval.is_placeholder {
                        EvaluatedIdea::missing(idea.clone())
                    } else {
                        EvaluatedIdea::new(idea.clone(), eval.score, eval.comment)
                    }
                })
                .collect(),
            _ => {
                warn!("evaluate phase failed or timed out; falling back to unscored ideas");
                ideas
                    .iter()
                    .take(ideas.len())
                    .map(|idea| EvaluatedIdea::new(idea.clone(), 0.0, "CriticAgent failed"))
                    .collect()
            }
        }
    }

    async fn advocate_then_skeptic(
        &self,
        top_k: &[EvaluatedIdea],
        topic: &str,
        context: &str,
        temperature_policy: &TemperaturePolicy,
        semaphore: &Arc<Semaphore>,
    ) -> (Vec<String>, Vec<String>, Vec<FailureNote>) {
        let mut failures = Vec::new();

        let advocate_pairs: Vec<(IdeaText, String)> =
            top_k.iter().map(|c| (c.text.clone(), c.critique.clone())).collect();

        let advocacy = {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            match timeout(
                ADVOCATE_TIMEOUT,
                self.batch_ops.advocate_batch(
                    &advocate_pairs,
                    topic,
                    context,
                    temperature_policy.temperature_for(TempStage::Advocacy),
                ),
            )
            .await
            {
                Ok(Ok(texts)) => texts,
                Ok(Err(e)) => {
                    failures.push(FailureNote::new(
                        FailureStage::Advocacy,
                        failure_kind_for(&e),
                        e.to_string(),
                    ));
                    vec![ADVOCATE_FALLBACK.to_string(); top_k.len()]
                }
                Err(_) => {
                    failures.push(FailureNote::new(
                        FailureStage::Advocacy,
                        FailureKind::TimeoutError,
                        "advocate batch timed out".to_string(),
                    ));
                    vec![ADVOCATE_FALLBACK.to_string(); top_k.len()]
                }
            }
        };

        // Skeptic receives the advocacy text, so it necessarily runs after
        // advocate completes (DESIGN.md Open Question resolution #2).
        let skeptic_pairs: Vec<(IdeaText, String)> = top_k
            .iter()
            .zip(&advocacy)
            .map(|(c, adv)| (c.text.clone(), adv.clone()))
            .collect();

        let skepticism = {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            match timeout(
                SKEPTIC_TIMEOUT,
                self.batch_ops.skepticize_batch(
                    &skeptic_pairs,
                    topic,
                    context,
                    temperature_policy.temperature_for(TempStage::Skepticism),
                ),
            )
            .await
            {
                Ok(Ok(texts)) => texts,
                Ok(Err(e)) => {
                    failures.push(FailureNote::new(
                        FailureStage::Skepticism,
                        failure_kind_for(&e),
                        e.to_string(),
                    ));
                    vec![SKEPTIC_FALLBACK.to_string(); top_k.len()]
                }
                Err(_) => {
                    failures.push(FailureNote::new(
                        FailureStage::Skepticism,
                        FailureKind::TimeoutError,
                        "skeptic batch timed out".to_string(),
                    ));
                    vec![SKEPTIC_FALLBACK.to_string(); top_k.len()]
                }
            }
        };

        (advocacy, skepticism, failures)
    }

    async fn improve_phase(
        &self,
        top_k: &[EvaluatedIdea],
        advocacy: &[String],
        skepticism: &[String],
        context: &str,
        temperature_policy: &TemperaturePolicy,
    ) -> Vec<IdeaText> {
        let quads: Vec<(IdeaText, String, String, String)> = top_k
            .iter()
            .zip(advocacy)
            .zip(skepticism)
            .map(|((c, adv), skep)| (c.text.clone(), c.critique.clone(), adv.clone(), skep.clone()))
            .collect();

        match timeout(
            IMPROVE_TIMEOUT,
            self.batch_ops.improve_batch(
                &quads,
                context,
                temperature_policy.temperature_for(TempStage::Evaluation),
            ),
        )
        .await
        {
            Ok(Ok(results)) => results.into_iter().map(|r| IdeaText::new(r.improved_idea)).collect(),
            _ => {
                warn!("improve phase failed or timed out; falling back to original ideas");
                top_k.iter().map(|c| c.text.clone()).collect()
            }
        }
    }

    async fn re_evaluate_phase(
        &self,
        improved_ideas: &[IdeaText],
        top_k: &[EvaluatedIdea],
        topic: &str,
        context: &str,
        temperature_policy: &TemperaturePolicy,
        failures: &mut Vec<FailureNote>,
    ) -> (Vec<f64>, Vec<String>) {
        // Bias-prevention invariant (spec.md §3/§4.10/§8): reuse the original
        // context string verbatim, never mention that these are "improved".
        let result = timeout(
            RE_EVALUATE_TIMEOUT,
            self.batch_ops.evaluate_batch(
                improved_ideas,
                topic,
                context,
                temperature_policy.temperature_for(TempStage::Evaluation),
            ),
        )
        .await;

        match result {
            Ok(Ok(evaluations)) => {
                let mut scores = Vec::with_capacity(top_k.len());
                let mut critiques = Vec::with_capacity(top_k.len());
                for (original, eval) in top_k.iter().zip(evaluations) {
                    let mut critique = eval.comment;
                    if eval.score < original.score - 1.0 {
                        critique = format!("{critique} (regression noted vs. original score)");
                    }
                    scores.push(eval.score);
                    critiques.push(critique);
                }
                (scores, critiques)
            }
            Ok(Err(e)) => {
                failures.push(FailureNote::new(
                    FailureStage::ReEvaluation,
                    failure_kind_for(&e),
                    e.to_string(),
                ));
                let scores = top_k.iter().map(|c| c.score).collect();
                let critiques = top_k.iter().map(|_| "Re-evaluation unavailable".to_string()).collect();
                (scores, critiques)
            }
            Err(_) => {
                failures.push(FailureNote::new(
                    FailureStage::ReEvaluation,
                    FailureKind::TimeoutError,
                    "re-evaluation timed out".to_string(),
                ));
                let scores = top_k.iter().map(|c| c.score).collect();
                let critiques = top_k.iter().map(|_| "Re-evaluation unavailable".to_string()).collect();
                (scores, critiques)
            }
        }
    }
}

/// Maps a batch-call failure to the `FailureNote` kind it should be recorded
/// as, preserving the transient/parse/permanent distinction `BatchError`
/// already carries (see `BatchError::is_retriable`).
fn failure_kind_for(err: &BatchError) -> FailureKind {
    match err {
        BatchError::Transient(_) => FailureKind::TransientProviderError,
        BatchError::Timeout(_) => FailureKind::TransientProviderError,
        BatchError::Parse(_) => FailureKind::ParseError,
        BatchError::Permanent(_) => FailureKind::PermanentProviderError,
    }
}

fn idea_texts(ideas: &[EvaluatedIdea]) -> Vec<IdeaText> {
    ideas.iter().map(|i| i.text.clone()).collect()
}

fn options_fingerprint(opts: &WorkflowOptions) -> String {
    let temp = match &opts.temperature_policy {
        TemperaturePolicyOption::Preset(name) => format!("preset:{name}"),
        TemperaturePolicyOption::Base(base) => format!("base:{base}"),
    };
    format!(
        "k={};novelty={}@{};temp={};reasoning={};multidim={};inference={}@{:?}@{}",
        opts.num_top_candidates,
        opts.enable_novelty_filter,
        opts.novelty_similarity_threshold,
        temp,
        opts.enhanced_reasoning,
        opts.multi_dimensional,
        opts.logical_inference,
        opts.analysis_type,
        opts.logical_inference_confidence_threshold,
    )
}

/// Stable sort by score descending, tie-break by original index.
fn select_top_k(evaluated: Vec<EvaluatedIdea>, k: usize) -> Vec<EvaluatedIdea> {
    let mut indexed: Vec<(usize, EvaluatedIdea)> = evaluated.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(ia.cmp(ib))
    });
    indexed.into_iter().take(k).map(|(_, idea)| idea).collect()
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    top_k: &[EvaluatedIdea],
    advocacy: &[String],
    skepticism: &[String],
    improved_ideas: &[IdeaText],
    improved_scores: &[f64],
    improved_critiques: &[String],
    multi_dim_scores: Option<Vec<crate::state::MultiDimScore>>,
    improved_multi_dim: Option<Vec<crate::state::MultiDimScore>>,
    logical_results: Option<Vec<crate::state::InferenceResult>>,
    logical_confidence_threshold: f64,
    shared_failures: Vec<FailureNote>,
) -> Vec<CandidateResult> {
    let mut multi_dim_iter = multi_dim_scores.into_iter().flatten();
    let mut improved_multi_dim_iter = improved_multi_dim.into_iter().flatten();
    let mut logical_iter = logical_results.into_iter().flatten();

    top_k
        .iter()
        .enumerate()
        .map(|(i, original)| {
            let improved_idea = improved_ideas[i].clone();
            let improved_score = improved_scores[i];
            let score_delta = improved_score - original.score;
            let (is_meaningful_improvement, similarity_score) = is_meaningful_improvement(
                original.text.display(),
                improved_idea.display(),
                score_delta,
            );

            let logical = logical_iter.next().filter(|r| r.confidence() >= logical_confidence_threshold);

            CandidateResult {
                idea: original.text.clone(),
                initial_score: original.score,
                initial_critique: original.critique.clone(),
                advocacy: advocacy.get(i).cloned().unwrap_or_default(),
                skepticism: skepticism.get(i).cloned().unwrap_or_default(),
                improved_idea,
                improved_score,
                improved_critique: improved_critiques[i].clone(),
                score_delta,
                is_meaningful_improvement,
                similarity_score,
                multi_dim: multi_dim_iter.next(),
                improved_multi_dim: improved_multi_dim_iter.next(),
                logical,
                partial_failures: shared_failures.clone(),
                assembled_at: chrono::Utc::now(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_top_k_orders_by_score_desc_with_index_tiebreak() {
        let ideas = vec![
            EvaluatedIdea::new(IdeaText::new("a"), 5.0, "x"),
            EvaluatedIdea::new(IdeaText::new("b"), 9.0, "x"),
            EvaluatedIdea::new(IdeaText::new("c"), 9.0, "x"),
            EvaluatedIdea::new(IdeaText::new("d"), 7.0, "x"),
        ];
        let top = select_top_k(ideas, 2);
        assert_eq!(top[0].text.display(), "b");
        assert_eq!(top[1].text.display(), "c");
    }
}
