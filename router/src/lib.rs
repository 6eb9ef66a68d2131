//! The router: a pure classifier over a lowercased question.

use common::cues;
use common::model::{RouteDecision, RoutePath};
use tracing::debug;

const GREETING_PREFIXES: &[&str] = &["hello", "hi", "hey", "good morning", "good afternoon"];

/// True when the question is a greeting that never reaches retrieval; the
/// orchestrator returns this as a `direct` fast path without calling
/// `classify`.
pub fn is_greeting(question: &str) -> bool {
    let lowered = question.trim().to_lowercase();
    GREETING_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

/// Classifies a question into a route, preserving the ordering fixed by
/// Precedence: count hint first, then graph+document, then graph alone, then
/// document alone, else direct.
pub fn classify(question: &str) -> RouteDecision {
    let lowered = question.to_lowercase();

    let decision = if cues::any_count_hint(&lowered) {
        RouteDecision { path: RoutePath::Aggregate, reason: "count-oriented request".into() }
    } else if cues::any_graph_hint(&lowered) && cues::any_document_hint(&lowered) {
        RouteDecision { path: RoutePath::Hybrid, reason: "references graph and files".into() }
    } else if cues::any_graph_hint(&lowered) {
        RouteDecision { path: RoutePath::Graph, reason: "graph-oriented request".into() }
    } else if cues::any_document_hint(&lowered) {
        RouteDecision { path: RoutePath::Document, reason: "document-oriented request".into() }
    } else {
        RouteDecision { path: RoutePath::Direct, reason: "no retrieval hint matched".into() }
    };

    debug!(route = ?decision.path, reason = %decision.reason, "classified question");
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_hint_wins_over_everything() {
        let d = classify("how many files and relationships do I have");
        assert_eq!(d.path, RoutePath::Aggregate);
    }

    #[test]
    fn graph_and_document_is_hybrid() {
        let d = classify("what relationship does this document have to the graph");
        assert_eq!(d.path, RoutePath::Hybrid);
    }

    #[test]
    fn graph_alone() {
        let d = classify("what is the relationship between these two entities");
        assert_eq!(d.path, RoutePath::Graph);
    }

    #[test]
    fn document_alone() {
        let d = classify("summarize the uploaded file");
        assert_eq!(d.path, RoutePath::Document);
    }

    #[test]
    fn direct_fallback() {
        let d = classify("what's the weather like");
        assert_eq!(d.path, RoutePath::Direct);
    }

    #[test]
    fn greeting_detected() {
        assert!(is_greeting("Hello there!"));
        assert!(!is_greeting("how many documents"));
    }
}
