//! The orchestrator: drives the tool plan as a small DAG, with parallel
//! document/graph branches in the hybrid case, and dispatches the critic
//! refinement loop. Each stage of the DAG is recorded as a `ToolDecision`
//! rather than a raw timing, so a trace shows what ran and how it fared.

use std::sync::Arc;
use std::time::Instant;

use common::config::AppConfig;
use common::model::{
    AccessMode, AnswerEnvelope, Confidence, QueryTrace, RoutePath, ToolDecision, ToolStatus,
    TurnRole,
};
use common::providers::CriticModel;
use common::store::RuntimeStore;
use memory::MemoryService;
use retrieval_engine::RetrievalEngine;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct QueryOutcome {
    pub envelope: AnswerEnvelope,
    pub decisions: Vec<ToolDecision>,
    pub trace: QueryTrace,
    pub resolved_question: String,
}

pub struct Orchestrator {
    store: Arc<RuntimeStore>,
    engine: RetrievalEngine,
    critic_model: Arc<dyn CriticModel>,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<RuntimeStore>,
        engine: RetrievalEngine,
        critic_model: Arc<dyn CriticModel>,
        config: AppConfig,
    ) -> Self {
        Self { store, engine, critic_model, config }
    }

    #[instrument(skip(self, question), fields(thread_id))]
    pub async fn handle_query(
        &self,
        question: &str,
        thread_id: &str,
        user_id: Option<&str>,
        user_token: Option<&str>,
        runtime_key: Option<&str>,
        access_mode: AccessMode,
    ) -> QueryOutcome {
        let started = Instant::now();
        let mut decisions = Vec::new();

        let memory = MemoryService::new(&self.store);
        let (resolved_question, follow_up_note) =
            memory.resolve_follow_up_question(thread_id, question);
        if let Some(note) = &follow_up_note {
            decisions.push(ToolDecision::new("memory_resolver", note.clone(), 0, ToolStatus::Ok));
        }

        let route_decision = if router::is_greeting(&resolved_question) {
            common::model::RouteDecision {
                path: RoutePath::Direct,
                reason: "greeting fast path".to_string(),
            }
        } else {
            router::classify(&resolved_question)
        };

        let plan = planner::plan_for(route_decision.path);

        if planner::exceeds_budget(&plan, self.config.planner_max_steps) {
            decisions.push(ToolDecision::new(
                "planner",
                format!("plan of {} steps exceeds budget {}", plan.len(), self.config.planner_max_steps),
                started.elapsed().as_millis() as u64,
                ToolStatus::Blocked,
            ));
            let envelope = response_policy::budget_exceeded_envelope();
            let trace = self.record_trace(route_decision.path, envelope.confidence, access_mode, started);
            return QueryOutcome { envelope, decisions, trace, resolved_question };
        }

        decisions.push(ToolDecision::new(
            "planner",
            format!("{} steps within budget", plan.len()),
            0,
            ToolStatus::Ok,
        ));
        decisions.push(ToolDecision::new("router", route_decision.reason.clone(), 0, ToolStatus::Ok));

        let retrieval_started = Instant::now();
        let mut bundle = self
            .engine
            .retrieve(route_decision.path, &resolved_question, user_id, user_token, runtime_key)
            .await;
        let retrieval_ms = retrieval_started.elapsed().as_millis() as u64;

        match route_decision.path {
            RoutePath::Hybrid => {
                decisions.push(ToolDecision::new("document_branch", "hybrid document branch", retrieval_ms, ToolStatus::Ok));
                decisions.push(ToolDecision::new("graph_branch", "hybrid graph branch", retrieval_ms, ToolStatus::Ok));
                decisions.push(ToolDecision::new("merge_retrieval", "hybrid merge + rerank", retrieval_ms, ToolStatus::Ok));
            }
            RoutePath::Direct => {
                decisions.push(ToolDecision::new("single_retrieval", "no retrieval for direct route", retrieval_ms, ToolStatus::Skipped));
            }
            _ => {
                decisions.push(ToolDecision::new("single_retrieval", format!("{:?} retrieval", route_decision.path), retrieval_ms, ToolStatus::Ok));
            }
        }

        let mut envelope = response_policy::build_envelope(&bundle, &resolved_question);
        decisions.push(ToolDecision::new("synthesis", format!("policy={:?}", envelope.policy), 0, ToolStatus::Ok));

        if matches!(route_decision.path, RoutePath::Document | RoutePath::Graph) {
            let critic_started = Instant::now();
            let verdict = critic::evaluate(
                self.critic_model.as_ref(),
                &resolved_question,
                route_decision.path,
                bundle.top_score(),
                bundle.hits.len(),
            )
            .await;
            decisions.push(ToolDecision::new(
                "critic",
                verdict.reason.clone(),
                critic_started.elapsed().as_millis() as u64,
                ToolStatus::Ok,
            ));

            if verdict.should_refine && self.config.critic_max_refinements > 0 {
                if let Some(target) = critic::refinement_target(route_decision.path) {
                    let refine_started = Instant::now();
                    bundle = self
                        .engine
                        .retrieve_refined(target, &resolved_question, user_id, user_token, runtime_key)
                        .await;
                    decisions.push(
                        ToolDecision::new(
                            "retrieval_refine",
                            format!("refined {:?} -> {:?}", route_decision.path, target),
                            refine_started.elapsed().as_millis() as u64,
                            ToolStatus::Ok,
                        )
                        .with_attempt(1),
                    );
                    envelope = response_policy::build_envelope(&bundle, &resolved_question);
                    decisions.push(ToolDecision::new(
                        "synthesis",
                        format!("policy={:?} (post-refine)", envelope.policy),
                        0,
                        ToolStatus::Ok,
                    ));
                }
            }
        }

        memory.append_turn(thread_id, TurnRole::User, resolved_question.clone());
        memory.append_turn(thread_id, TurnRole::Assistant, envelope.answer.clone());

        let trace = self.record_trace(route_decision.path, envelope.confidence, access_mode, started);
        info!(trace_id = %trace.trace_id, route = ?trace.route, latency_ms = trace.latency_ms, "query handled");

        QueryOutcome { envelope, decisions, trace, resolved_question }
    }

    fn record_trace(
        &self,
        route: RoutePath,
        confidence: Confidence,
        access_mode: AccessMode,
        started: Instant,
    ) -> QueryTrace {
        let trace = QueryTrace {
            trace_id: Uuid::new_v4().to_string(),
            route,
            confidence,
            access_mode,
            latency_ms: started.elapsed().as_millis() as u64,
        };
        self.store.push_trace(trace.clone());
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::{DemoDocument, EnvelopePolicy, GraphEdge};
    use common::providers::{DeterministicCritic, DeterministicEmbeddingProvider};
    use retrieval_engine::RetrievalEngine;

    fn build(store: Arc<RuntimeStore>) -> Orchestrator {
        let engine = RetrievalEngine::new(
            store.clone(),
            Arc::new(DeterministicEmbeddingProvider::new(16)),
            None,
            None,
            None,
            common::config::RerankBackendKind::Heuristic,
            None,
        );
        Orchestrator::new(store, engine, Arc::new(DeterministicCritic), AppConfig::default())
    }

    #[tokio::test]
    async fn greeting_short_circuits_to_direct() {
        let store = Arc::new(RuntimeStore::memory());
        let orch = build(store);
        let outcome = orch
            .handle_query("Hello there", "t1", None, None, None, AccessMode::Demo)
            .await;
        assert_eq!(outcome.envelope.policy, EnvelopePolicy::NeedsContext);
        assert!(outcome.decisions.iter().any(|d| d.tool_name == "router"));
    }

    #[tokio::test]
    async fn count_question_is_aggregate_and_grounded() {
        let store = Arc::new(RuntimeStore::memory());
        store.seed_demo_corpus(
            vec![DemoDocument { source: "s".into(), chunk_id: "c1".into(), content: "hello".into() }],
            vec![GraphEdge { source: "a".into(), relationship: "r".into(), target: "b".into(), evidence: "e".into() }],
        );
        let orch = build(store);
        let outcome = orch
            .handle_query("how many documents do I have", "t1", None, None, None, AccessMode::Demo)
            .await;
        assert_eq!(outcome.envelope.policy, EnvelopePolicy::Grounded);
        assert_eq!(outcome.envelope.citations.len(), 1);
    }

    #[tokio::test]
    async fn budget_exceeded_short_circuits_before_retrieval() {
        let store = Arc::new(RuntimeStore::memory());
        let mut config = AppConfig::default();
        config.planner_max_steps = 0;
        let engine = RetrievalEngine::new(
            store.clone(),
            Arc::new(DeterministicEmbeddingProvider::new(16)),
            None,
            None,
            None,
            common::config::RerankBackendKind::Heuristic,
            None,
        );
        let orch = Orchestrator::new(store, engine, Arc::new(DeterministicCritic), config);
        let outcome = orch
            .handle_query("summarize my file", "t1", None, None, None, AccessMode::Demo)
            .await;
        assert_eq!(outcome.envelope.policy, EnvelopePolicy::PlannerBudgetExceeded);
        assert!(outcome.envelope.citations.is_empty());
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(outcome.decisions[0].status, common::model::ToolStatus::Blocked);
    }

    #[tokio::test]
    async fn memory_turns_accumulate_across_queries() {
        let store = Arc::new(RuntimeStore::memory());
        let orch = build(store.clone());
        orch.handle_query("hello", "t1", None, None, None, AccessMode::Demo).await;
        orch.handle_query("hi again", "t1", None, None, None, AccessMode::Demo).await;
        let turns = store.recent_turns("t1", 10);
        assert_eq!(turns.len(), 4);
    }
}
