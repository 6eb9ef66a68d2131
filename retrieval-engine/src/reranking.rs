//! `llm_rerank_v1`: an optional LLM-backed reranker. The concrete LLM
//! client is an external collaborator; this module only defines the
//! seam the engine calls through.

use async_trait::async_trait;
use common::error::AppError;
use common::model::RetrievalHit;

pub struct RerankOutcome {
    pub hits: Vec<RetrievalHit>,
}

#[async_trait]
pub trait LlmReranker: Send + Sync {
    /// Scores up to `candidates.len()` (already capped to 12 by the caller)
    /// hits against `query`, using `runtime_key` as the credential. Returned
    /// scores must be bound to `[0, 1]`; any `source_id` not present in the
    /// response is dropped by the caller.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RetrievalHit],
        runtime_key: &str,
    ) -> Result<RerankOutcome, AppError>;
}
