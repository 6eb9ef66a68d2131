//! The critic / refinement loop.

use common::error::AppError;
use common::model::{CriticVerdict, RoutePath};
use common::providers::CriticModel;
use tracing::{debug, warn};

/// Wraps a `CriticModel`; on provider error or malformed output, behaves as
/// "do not refine".
pub async fn evaluate(
    model: &dyn CriticModel,
    question: &str,
    route: RoutePath,
    top_score: f32,
    hit_count: usize,
) -> CriticVerdict {
    match model.evaluate(question, route, top_score, hit_count).await {
        Ok(verdict) => verdict,
        Err(AppError::Critic(msg)) => {
            warn!(error = %msg, "critic returned malformed output, not refining");
            CriticVerdict { should_refine: false, reason: "critic failure: not refining".into() }
        }
        Err(e) => {
            warn!(error = %e, "critic provider error, not refining");
            CriticVerdict { should_refine: false, reason: "critic failure: not refining".into() }
        }
    }
}

/// The route to refine *to*. Routes outside `{document, graph}` never
/// refine, callers should not call this unless `should_refine` was true.
///
/// `document` refines to `hybrid`; `graph` refines to `graph` again with a
/// larger candidate pool (the caller widens the retrieval limit on this
/// attempt via `RetrievalEngine::retrieve_refined`, this function only names
/// the target route).
pub fn refinement_target(current: RoutePath) -> Option<RoutePath> {
    match current {
        RoutePath::Document => Some(RoutePath::Hybrid),
        RoutePath::Graph => Some(RoutePath::Graph),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::providers::DeterministicCritic;

    #[tokio::test]
    async fn refines_on_weak_document_evidence() {
        let verdict = evaluate(&DeterministicCritic, "q", RoutePath::Document, 0.1, 1).await;
        assert!(verdict.should_refine);
    }

    #[test]
    fn document_refines_to_hybrid() {
        assert_eq!(refinement_target(RoutePath::Document), Some(RoutePath::Hybrid));
    }

    #[test]
    fn graph_refines_to_graph() {
        assert_eq!(refinement_target(RoutePath::Graph), Some(RoutePath::Graph));
    }

    #[test]
    fn direct_never_refines() {
        assert_eq!(refinement_target(RoutePath::Direct), None);
        assert_eq!(refinement_target(RoutePath::Hybrid), None);
        assert_eq!(refinement_target(RoutePath::Aggregate), None);
    }
}
