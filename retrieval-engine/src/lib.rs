//! The retrieval engine: combines the document and graph backends,
//! manages the query-embedding and retrieval caches, applies reranking, and
//! degrades to local seeded data on backend failure.

mod local;
pub mod reranking;

use std::sync::Arc;

use common::config::RerankBackendKind;
use common::model::{RetrievalBundle, RetrievalHit, RoutePath, SourceType};
use common::providers::{DocumentStore, EmbeddingProvider, GraphStore};
use common::scoring;
use common::semantic_key::{cache_key, semantic_key};
use common::store::RuntimeStore;
use tracing::{debug, instrument, warn};

use reranking::{LlmReranker, RerankOutcome};

pub struct RetrievalEngine {
    store: Arc<RuntimeStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    document_store: Option<Arc<dyn DocumentStore>>,
    graph_store: Option<Arc<dyn GraphStore>>,
    llm_reranker: Option<Arc<dyn LlmReranker>>,
    rerank_backend: RerankBackendKind,
    rerank_model: Option<String>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<RuntimeStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        document_store: Option<Arc<dyn DocumentStore>>,
        graph_store: Option<Arc<dyn GraphStore>>,
        llm_reranker: Option<Arc<dyn LlmReranker>>,
        rerank_backend: RerankBackendKind,
        rerank_model: Option<String>,
    ) -> Self {
        Self {
            store,
            embedding_provider,
            document_store,
            graph_store,
            llm_reranker,
            rerank_backend,
            rerank_model,
        }
    }

    #[instrument(skip(self, query), fields(route = ?route))]
    pub async fn retrieve(
        &self,
        route: RoutePath,
        query: &str,
        user_id: Option<&str>,
        user_token: Option<&str>,
        runtime_key: Option<&str>,
    ) -> RetrievalBundle {
        let key = self.cache_key_for(route, user_id, query);

        if let Some(cached) = self.store.get_cached_bundle(&key) {
            debug!(cache_key = %key, "retrieval cache hit");
            return cached;
        }

        let bundle = self.compute_bundle(route, query, user_id, user_token, runtime_key, 8).await;
        self.store.put_cached_bundle(key, bundle.clone());
        bundle
    }

    /// Re-runs retrieval for a critic-triggered refinement attempt.
    ///
    /// Skips the cache read: the entry at this key was populated by the
    /// attempt the critic just judged too weak, and returning it verbatim
    /// would make a same-route refinement (document->hybrid is a different
    /// route and so a different key, but graph->graph is not) a no-op. The
    /// candidate pool is widened before reranking, and the cache entry is
    /// then overwritten with the refined bundle so a repeat of the same
    /// question doesn't regress to the stale result.
    #[instrument(skip(self, query), fields(route = ?route))]
    pub async fn retrieve_refined(
        &self,
        route: RoutePath,
        query: &str,
        user_id: Option<&str>,
        user_token: Option<&str>,
        runtime_key: Option<&str>,
    ) -> RetrievalBundle {
        let key = self.cache_key_for(route, user_id, query);
        let bundle = self.compute_bundle(route, query, user_id, user_token, runtime_key, 16).await;
        self.store.put_cached_bundle(key, bundle.clone());
        bundle
    }

    fn cache_key_for(&self, route: RoutePath, user_id: Option<&str>, query: &str) -> String {
        cache_key(
            route_label(route),
            user_id,
            query,
            rerank_backend_label(self.rerank_backend),
            self.rerank_model.as_deref(),
        )
    }

    async fn compute_bundle(
        &self,
        route: RoutePath,
        query: &str,
        user_id: Option<&str>,
        user_token: Option<&str>,
        runtime_key: Option<&str>,
        candidate_limit: usize,
    ) -> RetrievalBundle {
        match route {
            RoutePath::Direct => RetrievalBundle::new(route, Vec::new(), Vec::new(), "none"),
            RoutePath::Document => {
                let (hits, failures) =
                    self.document_branch(query, user_id, user_token, candidate_limit).await;
                let (reranked, strategy) = self.rerank(query, hits, 5, runtime_key).await;
                RetrievalBundle::new(route, reranked, failures, strategy)
            }
            RoutePath::Graph => {
                let (hits, failures) = self.graph_branch(query, candidate_limit).await;
                let (reranked, strategy) = self.rerank(query, hits, 5, runtime_key).await;
                RetrievalBundle::new(route, reranked, failures, strategy)
            }
            RoutePath::Hybrid => {
                let hybrid_limit = candidate_limit + 2;
                let (doc_result, graph_result) = tokio::join!(
                    self.document_branch(query, user_id, user_token, hybrid_limit),
                    self.graph_branch(query, hybrid_limit),
                );
                let (doc_hits, mut failures) = doc_result;
                let (graph_hits, graph_failures) = graph_result;
                failures.extend(graph_failures);

                let mut combined = doc_hits;
                combined.extend(graph_hits);
                let (reranked, strategy) = self.rerank(query, combined, 6, runtime_key).await;
                RetrievalBundle::new(route, reranked, failures, strategy)
            }
            RoutePath::Aggregate => {
                let (document_count, mut failures) =
                    self.count_documents(user_id, user_token).await;
                let (graph_edge_count, graph_failures) = self.count_edges().await;
                failures.extend(graph_failures);

                let hit = RetrievalHit {
                    source_id: "aggregate-count".to_string(),
                    score: 1.0,
                    content: format!(
                        "Aggregate count: documents={document_count}, graph_edges={graph_edge_count}, total={}",
                        document_count + graph_edge_count
                    ),
                    source_type: SourceType::Aggregate,
                    location: "aggregate://counts".to_string(),
                };
                RetrievalBundle::new(route, vec![hit], failures, "aggregate_count")
            }
        }
    }

    async fn document_branch(
        &self,
        query: &str,
        user_id: Option<&str>,
        user_token: Option<&str>,
        limit: usize,
    ) -> (Vec<RetrievalHit>, Vec<String>) {
        let mut failures = Vec::new();

        if let (Some(store), Some(token)) = (&self.document_store, user_token) {
            let cache_key = semantic_key(query);
            let embedding = match self.store.get_query_embedding(&cache_key) {
                Some(v) => Some(v),
                None => match self.embedding_provider.embed_query(query).await {
                    Ok(v) => {
                        self.store.put_query_embedding(cache_key, v.clone());
                        Some(v)
                    }
                    Err(e) => {
                        warn!(error = %e, "embedding failed, falling back to local scoring");
                        None
                    }
                },
            };

            if let Some(vector) = embedding {
                match store.match_chunks(token, &vector, limit, 0.0).await {
                    Ok(hits) if !hits.is_empty() => return (hits, failures),
                    Ok(_) => {}
                    Err(e) => {
                        failures.push(format!("supabase:{e}"));
                    }
                }
            }
        }

        let user_id = user_id.unwrap_or("");
        let hits = local::local_document_hits(&self.store, query, user_id, limit);
        (hits, failures)
    }

    async fn graph_branch(&self, query: &str, limit: usize) -> (Vec<RetrievalHit>, Vec<String>) {
        let mut failures = Vec::new();

        if let Some(store) = &self.graph_store {
            match store.search(query, limit).await {
                Ok(hits) if !hits.is_empty() => {
                    let normalised = normalise_group(hits);
                    return (normalised, failures);
                }
                Ok(_) => {}
                Err(e) => failures.push(format!("neo4j:{e}")),
            }
        }

        let hits = local::local_graph_hits(&self.store, query, limit);
        (hits, failures)
    }

    async fn count_documents(
        &self,
        user_id: Option<&str>,
        user_token: Option<&str>,
    ) -> (usize, Vec<String>) {
        let mut failures = Vec::new();
        if let (Some(store), Some(token)) = (&self.document_store, user_token) {
            match store.count_chunks(token).await {
                Ok(n) => return (n, failures),
                Err(e) => failures.push(format!("supabase:{e}")),
            }
        }
        (self.store.chunk_count_for_user(user_id.unwrap_or("")), failures)
    }

    async fn count_edges(&self) -> (usize, Vec<String>) {
        let mut failures = Vec::new();
        if let Some(store) = &self.graph_store {
            match store.count_edges().await {
                Ok(n) => return (n, failures),
                Err(e) => failures.push(format!("neo4j:{e}")),
            }
        }
        (self.store.shared_graph_edges().len(), failures)
    }

    /// Reranking: default `score_normalization_v2`; optional
    /// `llm_rerank_v1` when configured and a runtime key is present, falling
    /// back to the heuristic on any failure or empty response.
    async fn rerank(
        &self,
        query: &str,
        hits: Vec<RetrievalHit>,
        limit: usize,
        runtime_key: Option<&str>,
    ) -> (Vec<RetrievalHit>, String) {
        if hits.is_empty() {
            return (hits, "score_normalization_v2".to_string());
        }

        if matches!(self.rerank_backend, RerankBackendKind::Llm) {
            if let (Some(reranker), Some(key)) = (&self.llm_reranker, runtime_key) {
                let candidates: Vec<RetrievalHit> = hits.iter().take(12).cloned().collect();
                match reranker.rerank(query, &candidates, key).await {
                    Ok(RerankOutcome { hits: scored }) if !scored.is_empty() => {
                        let mut out = scoring::sort_by_score_desc(scored);
                        out.truncate(limit);
                        return (out, "llm_rerank_v1".to_string());
                    }
                    _ => {
                        debug!("llm rerank unavailable or empty, falling back to heuristic");
                    }
                }
            }
        }

        let mut out = scoring::score_normalization_v2(query, hits);
        out.truncate(limit);
        (out, "score_normalization_v2".to_string())
    }
}

fn normalise_group(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    let normalised = scoring::min_max_normalize(&scores);
    let scored: Vec<RetrievalHit> = hits
        .into_iter()
        .zip(normalised)
        .map(|(mut h, s)| {
            h.score = s;
            h
        })
        .collect();
    let sorted = scoring::sort_by_score_desc(scored);
    scoring::dedupe_by_source_id_keep_first(sorted)
}

fn route_label(route: RoutePath) -> &'static str {
    match route {
        RoutePath::Direct => "direct",
        RoutePath::Document => "document",
        RoutePath::Graph => "graph",
        RoutePath::Hybrid => "hybrid",
        RoutePath::Aggregate => "aggregate",
    }
}

fn rerank_backend_label(backend: RerankBackendKind) -> &'static str {
    match backend {
        RerankBackendKind::Heuristic => "heuristic",
        RerankBackendKind::Llm => "llm",
    }
}

/// Degrades a "high" confidence hint to "medium" when the bundle carries any
/// backend failure.
pub fn degrade_confidence_if_needed(bundle: &RetrievalBundle, would_be_high: bool) -> bool {
    !(bundle.degraded && would_be_high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::providers::DeterministicEmbeddingProvider;

    fn engine(store: Arc<RuntimeStore>) -> RetrievalEngine {
        RetrievalEngine::new(
            store,
            Arc::new(DeterministicEmbeddingProvider::new(16)),
            None,
            None,
            None,
            RerankBackendKind::Heuristic,
            None,
        )
    }

    #[tokio::test]
    async fn direct_route_returns_empty_bundle() {
        let store = Arc::new(RuntimeStore::memory());
        let bundle = engine(store).retrieve(RoutePath::Direct, "hello", None, None, None).await;
        assert!(bundle.hits.is_empty());
        assert!(!bundle.degraded);
    }

    #[tokio::test]
    async fn aggregate_route_returns_single_hit_with_counts() {
        let store = Arc::new(RuntimeStore::memory());
        store.seed_demo_corpus(
            Vec::new(),
            vec![common::model::GraphEdge {
                source: "a".into(),
                relationship: "rel".into(),
                target: "b".into(),
                evidence: "e".into(),
            }],
        );
        let bundle =
            engine(store).retrieve(RoutePath::Aggregate, "how many things", None, None, None).await;
        assert_eq!(bundle.hits.len(), 1);
        assert_eq!(bundle.hits[0].source_type, SourceType::Aggregate);
        assert_eq!(bundle.hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn repeated_query_hits_cache() {
        let store = Arc::new(RuntimeStore::memory());
        let eng = engine(store);
        let a = eng.retrieve(RoutePath::Document, "find my notes", Some("u1"), None, None).await;
        let b = eng.retrieve(RoutePath::Document, "Find My Notes", Some("u1"), None, None).await;
        assert_eq!(a.hits.len(), b.hits.len());
        assert_eq!(a.rerank_strategy, b.rerank_strategy);
    }

    #[tokio::test]
    async fn bundle_hits_are_sorted_and_unique() {
        let store = Arc::new(RuntimeStore::memory());
        store.seed_demo_corpus(
            vec![
                common::model::DemoDocument {
                    source: "doc1".into(),
                    chunk_id: "c1".into(),
                    content: "rust programming language overview".into(),
                },
                common::model::DemoDocument {
                    source: "doc2".into(),
                    chunk_id: "c2".into(),
                    content: "unrelated cooking recipe".into(),
                },
            ],
            Vec::new(),
        );
        let bundle =
            engine(store).retrieve(RoutePath::Document, "rust programming", None, None, None).await;
        let mut seen = std::collections::HashSet::new();
        for hit in &bundle.hits {
            assert!(seen.insert(hit.source_id.clone()), "duplicate source_id");
        }
        for window in bundle.hits.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }
}
