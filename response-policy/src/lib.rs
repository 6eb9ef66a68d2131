//! The response policy: maps a `RetrievalBundle` to an `AnswerEnvelope`.

use common::cues;
use common::model::{
    AnswerEnvelope, Citation, Confidence, EnvelopePolicy, RetrievalBundle, RoutePath, SourceType,
};
use retrieval_engine::degrade_confidence_if_needed;

const MAX_CITATIONS: usize = 5;

pub fn build_envelope(bundle: &RetrievalBundle, query: &str) -> AnswerEnvelope {
    if bundle.route == RoutePath::Direct {
        return AnswerEnvelope {
            answer: "I need retrieval evidence to answer that.".to_string(),
            confidence: Confidence::Low,
            citations: Vec::new(),
            policy: EnvelopePolicy::NeedsContext,
            action: "ask a question that references your documents or the graph".to_string(),
        };
    }

    if bundle.hits.is_empty() {
        return if bundle.degraded {
            AnswerEnvelope {
                answer: format!(
                    "Retrieval infrastructure unavailable ({}).",
                    bundle.backend_failures.join(", ")
                ),
                confidence: Confidence::Low,
                citations: Vec::new(),
                policy: EnvelopePolicy::InfraDegraded,
                action: "retry shortly".to_string(),
            }
        } else {
            AnswerEnvelope {
                answer: "No matching evidence was found.".to_string(),
                confidence: Confidence::Low,
                citations: Vec::new(),
                policy: EnvelopePolicy::LowEvidence,
                action: "upload a document or rephrase the question".to_string(),
            }
        };
    }

    let top_score = bundle.top_score();
    let would_be_high = top_score >= 0.75;
    let confidence = if !degrade_confidence_if_needed(bundle, would_be_high) {
        Confidence::Medium
    } else {
        confidence_from_score(top_score)
    };

    let summary = summarize(bundle, query);
    let evidence = evidence_bullets(bundle);
    let citations = citations_from(bundle);

    if bundle.degraded {
        AnswerEnvelope {
            answer: format!("Warning: answer may be incomplete due to degraded retrieval.\n{summary}\n{evidence}"),
            confidence,
            citations,
            policy: EnvelopePolicy::DegradedAnswer,
            action: "verify with a follow-up query once infrastructure recovers".to_string(),
        }
    } else {
        AnswerEnvelope {
            answer: format!("{summary}\n{evidence}"),
            confidence,
            citations,
            policy: EnvelopePolicy::Grounded,
            action: "ask a follow-up or refine the query".to_string(),
        }
    }
}

pub fn budget_exceeded_envelope() -> AnswerEnvelope {
    AnswerEnvelope {
        answer: "The planner step budget was exceeded for this request.".to_string(),
        confidence: Confidence::Low,
        citations: Vec::new(),
        policy: EnvelopePolicy::PlannerBudgetExceeded,
        action: "raise the planner budget or simplify the question".to_string(),
    }
}

fn confidence_from_score(score: f32) -> Confidence {
    if score >= 0.75 {
        Confidence::High
    } else if score >= 0.40 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn summarize(bundle: &RetrievalBundle, query: &str) -> String {
    match bundle.route {
        RoutePath::Aggregate => bundle.hits.first().map(|h| h.content.clone()).unwrap_or_default(),
        RoutePath::Graph | RoutePath::Hybrid => {
            let lowered = query.to_lowercase();
            match cues::detect(&lowered) {
                Some(cue) => format!("Matched on the '{cue}' relationship."),
                None => "Top evidence from graph retrieval".to_string(),
            }
        }
        RoutePath::Document => "Top evidence from document retrieval".to_string(),
        RoutePath::Direct => String::new(),
    }
}

fn evidence_bullets(bundle: &RetrievalBundle) -> String {
    bundle
        .hits
        .iter()
        .take(MAX_CITATIONS)
        .map(|h| format!("- {} ({})", h.content, h.location))
        .collect::<Vec<_>>()
        .join("\n")
}

fn citations_from(bundle: &RetrievalBundle) -> Vec<Citation> {
    bundle
        .hits
        .iter()
        .take(MAX_CITATIONS)
        .map(|h| Citation { source_id: h.source_id.clone(), location: h.location.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::RetrievalHit;

    fn hit(id: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            source_id: id.into(),
            score,
            content: "content".into(),
            source_type: SourceType::PrivateDocument,
            location: "loc".into(),
        }
    }

    #[test]
    fn direct_route_is_needs_context() {
        let bundle = RetrievalBundle::new(RoutePath::Direct, Vec::new(), Vec::new(), "none");
        let env = build_envelope(&bundle, "hi");
        assert_eq!(env.policy, EnvelopePolicy::NeedsContext);
        assert_eq!(env.confidence, Confidence::Low);
        assert!(env.citations.is_empty());
    }

    #[test]
    fn empty_hits_degraded_is_infra_degraded() {
        let bundle = RetrievalBundle::new(
            RoutePath::Document,
            Vec::new(),
            vec!["supabase:timeout".into()],
            "score_normalization_v2",
        );
        let env = build_envelope(&bundle, "q");
        assert_eq!(env.policy, EnvelopePolicy::InfraDegraded);
        assert!(env.citations.is_empty());
    }

    #[test]
    fn empty_hits_not_degraded_is_low_evidence() {
        let bundle =
            RetrievalBundle::new(RoutePath::Document, Vec::new(), Vec::new(), "score_normalization_v2");
        let env = build_envelope(&bundle, "q");
        assert_eq!(env.policy, EnvelopePolicy::LowEvidence);
        assert_eq!(env.confidence, Confidence::Low);
    }

    #[test]
    fn degraded_with_hits_never_high() {
        let bundle = RetrievalBundle::new(
            RoutePath::Document,
            vec![hit("a", 0.99)],
            vec!["supabase:timeout".into()],
            "score_normalization_v2",
        );
        let env = build_envelope(&bundle, "q");
        assert_eq!(env.policy, EnvelopePolicy::DegradedAnswer);
        assert_ne!(env.confidence, Confidence::High);
    }

    #[test]
    fn grounded_high_confidence() {
        let bundle = RetrievalBundle::new(
            RoutePath::Document,
            vec![hit("a", 0.9)],
            Vec::new(),
            "score_normalization_v2",
        );
        let env = build_envelope(&bundle, "q");
        assert_eq!(env.policy, EnvelopePolicy::Grounded);
        assert_eq!(env.confidence, Confidence::High);
        assert_eq!(env.citations.len(), 1);
    }

    #[test]
    fn citations_capped_at_five() {
        let hits: Vec<RetrievalHit> = (0..10).map(|i| hit(&format!("h{i}"), 0.8)).collect();
        let bundle = RetrievalBundle::new(RoutePath::Document, hits, Vec::new(), "score_normalization_v2");
        let env = build_envelope(&bundle, "q");
        assert_eq!(env.citations.len(), 5);
    }
}
