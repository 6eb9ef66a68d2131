//! Golden-scenario replay for the query orchestration core: the seven
//! literal end-to-end scenarios and the quantified invariants, replayed
//! directly against the in-process components rather than a recorded
//! transcript corpus.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use common::config::{AppConfig, RerankBackendKind};
use common::error::AppError;
use common::model::{
    AccessMode, ConversationTurn, DemoDocument, EnvelopePolicy, GraphEdge, IngestionJob, JobStage,
    JobStatus, RetrievalHit, RoutePath, ToolStatus, TurnRole,
};
use common::providers::{CriticModel, DeterministicCritic, DeterministicEmbeddingProvider, DocumentStore};
use common::store::RuntimeStore;
use ingestion_worker::IngestionWorker;
use orchestrator::Orchestrator;
use retrieval_engine::RetrievalEngine;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl ScenarioOutcome {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, passed: true, detail: detail.into() }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, passed: false, detail: detail.into() }
    }
}

/// Wires the real components together over a shared in-memory store, seeded
/// with the demo corpus the literal scenarios reference.
pub struct Harness {
    pub store: Arc<RuntimeStore>,
    pub orchestrator: Orchestrator,
    pub ingestion: IngestionWorker,
    snapshot_path: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.snapshot_path);
    }
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(RuntimeStore::memory());
        seed_demo_corpus(&store);

        let embedding_provider: Arc<dyn common::providers::EmbeddingProvider> =
            Arc::new(DeterministicEmbeddingProvider::new(32));
        let engine = RetrievalEngine::new(
            store.clone(),
            embedding_provider.clone(),
            None,
            None,
            None,
            RerankBackendKind::Heuristic,
            None,
        );
        let orchestrator = Orchestrator::new(
            store.clone(),
            engine,
            Arc::new(DeterministicCritic) as Arc<dyn CriticModel>,
            AppConfig::default(),
        );

        let snapshot_path = std::env::temp_dir().join(format!("evaluations-{}.json", Uuid::new_v4()));
        let ingestion = IngestionWorker::new(store.clone(), embedding_provider, None, snapshot_path.clone());
        ingestion.start().await.expect("ingestion worker starts against an empty snapshot");

        Self { store, orchestrator, ingestion, snapshot_path }
    }

    /// A second orchestrator sharing this harness's store but with a
    /// caller-supplied config, for scenarios that need a non-default budget.
    fn orchestrator_with_config(&self, config: AppConfig) -> Orchestrator {
        let engine = RetrievalEngine::new(
            self.store.clone(),
            Arc::new(DeterministicEmbeddingProvider::new(32)),
            None,
            None,
            None,
            RerankBackendKind::Heuristic,
            None,
        );
        Orchestrator::new(self.store.clone(), engine, Arc::new(DeterministicCritic), config)
    }
}

fn seed_demo_corpus(store: &RuntimeStore) {
    let docs = vec![DemoDocument {
        source: "alpha-notes.txt".to_string(),
        chunk_id: "demo-doc-1".to_string(),
        content: "Project Alpha is a retrieval service with document and graph dependencies."
            .to_string(),
    }];
    let edges = vec![
        GraphEdge {
            source: "project alpha".to_string(),
            relationship: "depends_on".to_string(),
            target: "common-lib".to_string(),
            evidence: "Cargo.toml manifest".to_string(),
        },
        GraphEdge {
            source: "project alpha".to_string(),
            relationship: "depends_on".to_string(),
            target: "retrieval-engine".to_string(),
            evidence: "workspace member".to_string(),
        },
        GraphEdge {
            source: "dick johnson is dead".to_string(),
            relationship: "directed_by".to_string(),
            target: "kirsten johnson".to_string(),
            evidence: "film credits".to_string(),
        },
    ];
    store.seed_demo_corpus(docs, edges);
}

/// A `DocumentStore` that always fails, used to exercise the backend
/// degradation scenario without a real vector store.
struct FailingDocumentStore;

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn match_chunks(
        &self,
        _user_token: &str,
        _query_vector: &[f32],
        _k: usize,
        _threshold: f32,
    ) -> Result<Vec<RetrievalHit>, AppError> {
        Err(AppError::Internal("connection refused".to_string()))
    }

    async fn upsert_chunk(&self, _user_token: &str, _hit: RetrievalHit) -> Result<(), AppError> {
        Err(AppError::Internal("connection refused".to_string()))
    }

    async fn count_chunks(&self, _user_token: &str) -> Result<usize, AppError> {
        Err(AppError::Internal("connection refused".to_string()))
    }
}

// -- literal end-to-end scenarios --

pub async fn scenario_greeting_shortcut(harness: &Harness) -> ScenarioOutcome {
    let name = "greeting_shortcut";
    let outcome = harness
        .orchestrator
        .handle_query("hello", "scenario-1", None, None, None, AccessMode::Demo)
        .await;

    let checks = [
        outcome.decisions.iter().any(|d| d.tool_name == "router"),
        outcome.envelope.policy == EnvelopePolicy::NeedsContext,
        outcome.envelope.confidence == common::model::Confidence::Low,
        outcome.envelope.citations.is_empty(),
    ];
    if checks.iter().all(|c| *c) {
        ScenarioOutcome::pass(name, "greeting routed direct, needs_context, no citations")
    } else {
        ScenarioOutcome::fail(name, format!("policy={:?} citations={}", outcome.envelope.policy, outcome.envelope.citations.len()))
    }
}

pub async fn scenario_aggregate_count(harness: &Harness) -> ScenarioOutcome {
    let name = "aggregate_count";
    let outcome = harness
        .orchestrator
        .handle_query(
            "count total project dependencies",
            "scenario-2",
            None,
            None,
            None,
            AccessMode::Demo,
        )
        .await;

    let content = outcome.envelope.answer.clone();
    let format_ok = content.contains("documents=") && content.contains("graph_edges=") && content.contains("total=");
    if outcome.envelope.citations.len() == 1 && format_ok {
        ScenarioOutcome::pass(name, content)
    } else {
        ScenarioOutcome::fail(name, format!("citations={} answer={content}", outcome.envelope.citations.len()))
    }
}

pub async fn scenario_graph_lookup(harness: &Harness) -> ScenarioOutcome {
    let name = "graph_lookup";
    let outcome = harness
        .orchestrator
        .handle_query(
            "show graph dependencies for project alpha",
            "scenario-3",
            None,
            None,
            None,
            AccessMode::Demo,
        )
        .await;

    let route_ok = matches!(outcome.trace.route, RoutePath::Graph | RoutePath::Hybrid);
    let citation_ok = !outcome.envelope.citations.is_empty();
    let policy_ok = outcome.envelope.policy == EnvelopePolicy::Grounded;
    let confidence_ok = matches!(
        outcome.envelope.confidence,
        common::model::Confidence::Medium | common::model::Confidence::High
    );

    if route_ok && citation_ok && policy_ok && confidence_ok {
        ScenarioOutcome::pass(name, format!("confidence={:?}, citations={}", outcome.envelope.confidence, outcome.envelope.citations.len()))
    } else {
        ScenarioOutcome::fail(
            name,
            format!(
                "policy={:?} confidence={:?} citations={}",
                outcome.envelope.policy,
                outcome.envelope.confidence,
                outcome.envelope.citations.len()
            ),
        )
    }
}

pub async fn scenario_follow_up_resolution(harness: &Harness) -> ScenarioOutcome {
    let name = "follow_up_resolution";
    let thread_id = "scenario-4";
    harness
        .orchestrator
        .handle_query(
            "who directed dick johnson is dead on netflix",
            thread_id,
            None,
            None,
            None,
            AccessMode::Demo,
        )
        .await;

    let follow_up = harness
        .orchestrator
        .handle_query(
            "what about that relationship evidence?",
            thread_id,
            None,
            None,
            None,
            AccessMode::Demo,
        )
        .await;

    let resolved_ok = follow_up.resolved_question.contains("Follow-up context from prior user turn");
    let decision_ok = follow_up.decisions.iter().any(|d| d.tool_name == "memory_resolver");

    if resolved_ok && decision_ok {
        ScenarioOutcome::pass(name, follow_up.resolved_question)
    } else {
        ScenarioOutcome::fail(name, format!("resolved_question={}", follow_up.resolved_question))
    }
}

pub async fn scenario_planner_budget_block(harness: &Harness) -> ScenarioOutcome {
    let name = "planner_budget_block";
    let mut config = AppConfig::default();
    config.planner_max_steps = 1;
    let orch = harness.orchestrator_with_config(config);

    let outcome = orch
        .handle_query(
            "what is the relationship between project alpha and common-lib",
            "scenario-5",
            None,
            None,
            None,
            AccessMode::Demo,
        )
        .await;

    let policy_ok = outcome.envelope.policy == EnvelopePolicy::PlannerBudgetExceeded;
    let citations_ok = outcome.envelope.citations.is_empty();
    let decisions_ok = outcome.decisions.len() == 1 && outcome.decisions[0].status == ToolStatus::Blocked;

    if policy_ok && citations_ok && decisions_ok {
        ScenarioOutcome::pass(name, "single blocked planner decision, no citations")
    } else {
        ScenarioOutcome::fail(
            name,
            format!("policy={:?} decisions={}", outcome.envelope.policy, outcome.decisions.len()),
        )
    }
}

pub async fn scenario_backend_degradation(_harness: &Harness) -> ScenarioOutcome {
    let name = "backend_degradation";
    let store = Arc::new(RuntimeStore::memory());
    seed_demo_corpus(&store);

    let engine = RetrievalEngine::new(
        store,
        Arc::new(DeterministicEmbeddingProvider::new(32)),
        Some(Arc::new(FailingDocumentStore)),
        None,
        None,
        RerankBackendKind::Heuristic,
        None,
    );

    let bundle = engine
        .retrieve(RoutePath::Document, "tell me about project alpha", None, Some("user-token"), None)
        .await;
    let envelope = response_policy::build_envelope(&bundle, "tell me about project alpha");

    let degraded_ok = bundle.degraded;
    let tag_ok = bundle.backend_failures.iter().any(|f| f.starts_with("supabase:"));
    let policy_ok = if bundle.hits.is_empty() {
        envelope.policy == EnvelopePolicy::InfraDegraded
    } else {
        envelope.policy == EnvelopePolicy::DegradedAnswer
    };

    if degraded_ok && tag_ok && policy_ok {
        ScenarioOutcome::pass(name, format!("failures={:?} policy={:?}", bundle.backend_failures, envelope.policy))
    } else {
        ScenarioOutcome::fail(
            name,
            format!("degraded={} failures={:?} policy={:?}", bundle.degraded, bundle.backend_failures, envelope.policy),
        )
    }
}

pub async fn scenario_ingestion_lifecycle(harness: &Harness) -> ScenarioOutcome {
    let name = "ingestion_lifecycle";
    let user_id = "scenario-7-user";
    let content = "Quarterly retrieval audit notes for project alpha and its dependencies."
        .repeat(10)
        .into_bytes();

    let job_id = match harness
        .ingestion
        .enqueue("audit.txt".to_string(), "text/plain".to_string(), user_id.to_string(), content, None)
        .await
    {
        Ok(id) => id,
        Err(e) => return ScenarioOutcome::fail(name, format!("enqueue failed: {e}")),
    };

    let job = match wait_for_terminal_job(&harness.store, &job_id).await {
        Some(job) => job,
        None => return ScenarioOutcome::fail(name, "job never reached a terminal status"),
    };

    if job.status != JobStatus::Success || job.stage != JobStage::Completed {
        return ScenarioOutcome::fail(name, format!("status={:?} stage={:?}", job.status, job.stage));
    }

    let outcome = harness
        .orchestrator
        .handle_query(
            "summarize my uploaded audit document",
            "scenario-7",
            Some(user_id),
            None,
            None,
            AccessMode::Authenticated,
        )
        .await;

    let matched = outcome
        .envelope
        .citations
        .iter()
        .any(|c| c.source_id.starts_with(&format!("{job_id}-")));

    if matched {
        ScenarioOutcome::pass(name, format!("job {job_id} completed and is citable"))
    } else {
        ScenarioOutcome::fail(
            name,
            format!("no citation referenced job {job_id}: citations={:?}", outcome.envelope.citations),
        )
    }
}

async fn wait_for_terminal_job(store: &RuntimeStore, job_id: &str) -> Option<IngestionJob> {
    for _ in 0..200 {
        if let Some(job) = store.get_job(job_id) {
            if matches!(job.status, JobStatus::Success | JobStatus::Failed) {
                return Some(job);
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    None
}

pub async fn run_all_scenarios(harness: &Harness) -> Vec<ScenarioOutcome> {
    vec![
        scenario_greeting_shortcut(harness).await,
        scenario_aggregate_count(harness).await,
        scenario_graph_lookup(harness).await,
        scenario_follow_up_resolution(harness).await,
        scenario_planner_budget_block(harness).await,
        scenario_backend_degradation(harness).await,
        scenario_ingestion_lifecycle(harness).await,
    ]
}

// -- quantified invariants --

pub fn invariant_count_hint_routes_aggregate() -> ScenarioOutcome {
    let name = "invariant:count_hint_implies_aggregate";
    let questions = [
        "how many documents do I have",
        "count my files",
        "what is the total number of edges",
        "give me the number of chunks",
    ];
    let all_aggregate = questions.iter().all(|q| router::classify(q).path == RoutePath::Aggregate);
    if all_aggregate {
        ScenarioOutcome::pass(name, "every count-hint question routed to aggregate")
    } else {
        ScenarioOutcome::fail(name, "a count-hint question did not route to aggregate")
    }
}

pub fn invariant_degraded_matches_failures() -> ScenarioOutcome {
    let name = "invariant:degraded_iff_backend_failures_nonempty";
    let clean = common::model::RetrievalBundle::new(RoutePath::Document, Vec::new(), Vec::new(), "none");
    let dirty = common::model::RetrievalBundle::new(
        RoutePath::Document,
        Vec::new(),
        vec!["supabase:timeout".to_string()],
        "none",
    );
    if !clean.degraded && dirty.degraded {
        ScenarioOutcome::pass(name, "degraded flag tracks backend_failures emptiness")
    } else {
        ScenarioOutcome::fail(name, "degraded flag diverged from backend_failures emptiness")
    }
}

pub async fn invariant_hits_sorted_and_unique(harness: &Harness) -> ScenarioOutcome {
    let name = "invariant:hits_sorted_desc_and_unique_source_ids";
    let engine = RetrievalEngine::new(
        harness.store.clone(),
        Arc::new(DeterministicEmbeddingProvider::new(32)),
        None,
        None,
        None,
        RerankBackendKind::Heuristic,
        None,
    );
    let bundle = engine
        .retrieve(RoutePath::Graph, "show graph dependencies for project alpha", None, None, None)
        .await;

    let mut seen = std::collections::HashSet::new();
    let unique = bundle.hits.iter().all(|h| seen.insert(h.source_id.clone()));
    let sorted = bundle.hits.windows(2).all(|w| w[0].score >= w[1].score);

    if unique && sorted {
        ScenarioOutcome::pass(name, "hits sorted descending with unique source ids")
    } else {
        ScenarioOutcome::fail(name, "hits were unsorted or contained duplicate source ids")
    }
}

pub fn invariant_low_confidence_policies_have_no_citations() -> ScenarioOutcome {
    let name = "invariant:low_confidence_policies_have_no_citations";
    let direct = response_policy::build_envelope(
        &common::model::RetrievalBundle::new(RoutePath::Direct, Vec::new(), Vec::new(), "none"),
        "hi",
    );
    let low_evidence = response_policy::build_envelope(
        &common::model::RetrievalBundle::new(RoutePath::Document, Vec::new(), Vec::new(), "score_normalization_v2"),
        "q",
    );
    let infra_degraded = response_policy::build_envelope(
        &common::model::RetrievalBundle::new(
            RoutePath::Document,
            Vec::new(),
            vec!["supabase:timeout".to_string()],
            "score_normalization_v2",
        ),
        "q",
    );

    let all_ok = [&direct, &low_evidence, &infra_degraded].iter().all(|e| {
        e.citations.is_empty() && e.confidence == common::model::Confidence::Low
    });

    if all_ok {
        ScenarioOutcome::pass(name, "needs_context/low_evidence/infra_degraded carry no citations and low confidence")
    } else {
        ScenarioOutcome::fail(name, "a low-confidence policy carried citations or non-low confidence")
    }
}

pub fn invariant_degraded_answer_never_high_confidence() -> ScenarioOutcome {
    let name = "invariant:degraded_answer_never_high_confidence";
    let hit = RetrievalHit {
        source_id: "a".to_string(),
        score: 0.99,
        content: "content".to_string(),
        source_type: common::model::SourceType::PrivateDocument,
        location: "loc".to_string(),
    };
    let bundle = common::model::RetrievalBundle::new(
        RoutePath::Document,
        vec![hit],
        vec!["supabase:timeout".to_string()],
        "score_normalization_v2",
    );
    let envelope = response_policy::build_envelope(&bundle, "q");
    if envelope.policy == EnvelopePolicy::DegradedAnswer && envelope.confidence != common::model::Confidence::High {
        ScenarioOutcome::pass(name, "a near-perfect score under degradation still capped below high")
    } else {
        ScenarioOutcome::fail(name, format!("confidence={:?}", envelope.confidence))
    }
}

pub fn invariant_ingestion_job_consistency() -> ScenarioOutcome {
    let name = "invariant:ingestion_job_stage_status_consistency";
    let mut success = IngestionJob::new("j1".into(), "a.txt".into(), "text/plain".into(), "u1".into());
    success.stage = JobStage::Completed;
    success.status = JobStatus::Success;

    let mut failed = IngestionJob::new("j2".into(), "a.txt".into(), "text/plain".into(), "u1".into());
    failed.stage = JobStage::Failed;
    failed.status = JobStatus::Failed;
    failed.error_message = Some("boom".into());

    let queued = IngestionJob::new("j3".into(), "a.txt".into(), "text/plain".into(), "u1".into());

    if success.is_consistent() && failed.is_consistent() && queued.is_consistent() {
        ScenarioOutcome::pass(name, "success/failed/queued jobs are all internally consistent")
    } else {
        ScenarioOutcome::fail(name, "a job's stage/status pairing was inconsistent")
    }
}

pub fn invariant_turns_preserve_append_order() -> ScenarioOutcome {
    let name = "invariant:conversation_turns_preserve_order";
    let store = RuntimeStore::memory();
    store.append_turn("t", TurnRole::User, "one".into());
    store.append_turn("t", TurnRole::Assistant, "two".into());
    store.append_turn("t", TurnRole::User, "three".into());

    let turns: Vec<ConversationTurn> = store.recent_turns("t", 10);
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    if contents == ["one", "two", "three"] {
        ScenarioOutcome::pass(name, "turns observed in append order")
    } else {
        ScenarioOutcome::fail(name, format!("observed order: {contents:?}"))
    }
}

pub async fn invariant_same_semantic_key_same_bundle(harness: &Harness) -> ScenarioOutcome {
    let name = "invariant:same_semantic_key_same_bundle";
    let engine = RetrievalEngine::new(
        harness.store.clone(),
        Arc::new(DeterministicEmbeddingProvider::new(32)),
        None,
        None,
        None,
        RerankBackendKind::Heuristic,
        None,
    );

    let a = engine.retrieve(RoutePath::Document, "project alpha notes", None, None, None).await;
    let b = engine.retrieve(RoutePath::Document, "Project Alpha Notes!", None, None, None).await;

    let equal = a.hits.len() == b.hits.len()
        && a.rerank_strategy == b.rerank_strategy
        && a.hits.iter().zip(&b.hits).all(|(x, y)| x.source_id == y.source_id);

    if equal {
        ScenarioOutcome::pass(name, "paraphrases sharing a semantic key returned equal bundles")
    } else {
        ScenarioOutcome::fail(name, "paraphrases sharing a semantic key returned different bundles")
    }
}

pub async fn invariant_repeated_retrieve_is_idempotent(harness: &Harness) -> ScenarioOutcome {
    let name = "invariant:repeated_retrieve_is_idempotent";
    let engine = RetrievalEngine::new(
        harness.store.clone(),
        Arc::new(DeterministicEmbeddingProvider::new(32)),
        None,
        None,
        None,
        RerankBackendKind::Heuristic,
        None,
    );

    let a = engine.retrieve(RoutePath::Document, "project alpha notes", None, None, None).await;
    let b = engine.retrieve(RoutePath::Document, "project alpha notes", None, None, None).await;

    if a.hits.len() == b.hits.len() && a.rerank_strategy == b.rerank_strategy && a.degraded == b.degraded {
        ScenarioOutcome::pass(name, "identical retrieve calls returned an equal cached bundle")
    } else {
        ScenarioOutcome::fail(name, "identical retrieve calls returned diverging bundles")
    }
}

pub async fn run_all_invariants(harness: &Harness) -> Vec<ScenarioOutcome> {
    vec![
        invariant_count_hint_routes_aggregate(),
        invariant_degraded_matches_failures(),
        invariant_hits_sorted_and_unique(harness).await,
        invariant_low_confidence_policies_have_no_citations(),
        invariant_degraded_answer_never_high_confidence(),
        invariant_ingestion_job_consistency(),
        invariant_turns_preserve_append_order(),
        invariant_same_semantic_key_same_bundle(harness).await,
        invariant_repeated_retrieve_is_idempotent(harness).await,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_scenarios_pass() {
        let harness = Harness::new().await;
        let outcomes = run_all_scenarios(&harness).await;
        for outcome in &outcomes {
            assert!(outcome.passed, "{}: {}", outcome.name, outcome.detail);
        }
    }

    #[tokio::test]
    async fn all_invariants_hold() {
        let harness = Harness::new().await;
        let outcomes = run_all_invariants(&harness).await;
        for outcome in &outcomes {
            assert!(outcome.passed, "{}: {}", outcome.name, outcome.detail);
        }
    }
}
