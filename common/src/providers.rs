//! Backend interface shapes. Concrete remote drivers (a real vector
//! store, graph store, or LLM) are external collaborators; this
//! crate only defines the seams and a deterministic local fallback for each.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::model::{CriticVerdict, RetrievalHit, RoutePath};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError>;
    fn dimensions(&self) -> usize;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn match_chunks(
        &self,
        user_token: &str,
        query_vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievalHit>, AppError>;
    async fn upsert_chunk(&self, user_token: &str, hit: RetrievalHit) -> Result<(), AppError>;
    async fn count_chunks(&self, user_token: &str) -> Result<usize, AppError>;
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>, AppError>;
    async fn count_edges(&self) -> Result<usize, AppError>;
    async fn close(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait CriticModel: Send + Sync {
    async fn evaluate(
        &self,
        question: &str,
        route: RoutePath,
        top_score: f32,
        hit_count: usize,
    ) -> Result<CriticVerdict, AppError>;
}

/// Deterministic fallback embedding provider: hashes the text into a
/// fixed-dimension unit vector. Used whenever `embedding_backend =
/// deterministic` or a remote provider is unavailable; also the default in
/// tests since it needs no network access.
pub struct DeterministicEmbeddingProvider {
    dimensions: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut out = vec![0.0_f32; self.dimensions];
        let mut counter: u32 = 0;
        let mut filled = 0;
        while filled < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if filled >= self.dimensions {
                    break;
                }
                // map byte into [-1, 1]
                out[filled] = (*byte as f32 / 255.0) * 2.0 - 1.0;
                filled += 1;
            }
            counter += 1;
        }
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(self.embed_one(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic critic: refine when route is document/graph
/// and evidence is weak. Offered here as a `CriticModel` impl so the
/// orchestrator can depend uniformly on the trait.
pub struct DeterministicCritic;

#[async_trait]
impl CriticModel for DeterministicCritic {
    async fn evaluate(
        &self,
        _question: &str,
        route: RoutePath,
        top_score: f32,
        hit_count: usize,
    ) -> Result<CriticVerdict, AppError> {
        let should_refine = matches!(route, RoutePath::Document | RoutePath::Graph)
            && (top_score < 0.35 || hit_count < 2);
        let reason = if should_refine {
            "weak evidence: low top score or few hits".to_string()
        } else {
            "evidence sufficient".to_string()
        };
        Ok(CriticVerdict { should_refine, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedding_is_stable() {
        let provider = DeterministicEmbeddingProvider::new(32);
        let a = provider.embed_query("hello world").await.unwrap();
        let b = provider.embed_query("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn deterministic_embedding_varies_by_text() {
        let provider = DeterministicEmbeddingProvider::new(16);
        let a = provider.embed_query("alpha").await.unwrap();
        let b = provider.embed_query("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn deterministic_critic_refines_on_weak_evidence() {
        let critic = DeterministicCritic;
        let verdict = critic.evaluate("q", RoutePath::Document, 0.1, 1).await.unwrap();
        assert!(verdict.should_refine);

        let verdict = critic.evaluate("q", RoutePath::Document, 0.9, 5).await.unwrap();
        assert!(!verdict.should_refine);

        let verdict = critic.evaluate("q", RoutePath::Direct, 0.0, 0).await.unwrap();
        assert!(!verdict.should_refine);
    }
}
