//! Local token-overlap fallback scoring, used when no remote backend is
//! configured or the remote call failed/returned nothing.

use common::cues;
use common::model::{RetrievalHit, SourceType};
use common::scoring::lexical_overlap_score;
use common::store::RuntimeStore;

/// Scores the user's private chunks (if any) by lexical overlap with the
/// query; when the user has no chunks (or is unauthenticated), scores the
/// shared demo corpus instead.
pub fn local_document_hits(
    store: &RuntimeStore,
    query: &str,
    user_id: &str,
    limit: usize,
) -> Vec<RetrievalHit> {
    let chunks = store.chunks_for_user(user_id);
    let mut hits: Vec<RetrievalHit> = if !chunks.is_empty() {
        chunks
            .into_iter()
            .map(|chunk| RetrievalHit {
                source_id: chunk.chunk_id,
                score: lexical_overlap_score(query, &chunk.content),
                content: chunk.content,
                source_type: SourceType::PrivateDocument,
                location: format!("{}#{}", chunk.metadata.source, chunk.metadata.offset_start),
            })
            .collect()
    } else {
        store
            .shared_demo_documents()
            .into_iter()
            .map(|doc| RetrievalHit {
                source_id: doc.chunk_id,
                score: lexical_overlap_score(query, &doc.content),
                content: doc.content,
                source_type: SourceType::DemoDocument,
                location: doc.source,
            })
            .collect()
    };

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

/// Scores seeded graph edges by lexical overlap, boosted when the query
/// contains a recognised cue (director/actor/genre/country/rating) that
/// matches the edge's relationship.
pub fn local_graph_hits(store: &RuntimeStore, query: &str, limit: usize) -> Vec<RetrievalHit> {
    let lowered = query.to_lowercase();
    let cue = cues::detect(&lowered);

    let mut hits: Vec<RetrievalHit> = store
        .shared_graph_edges()
        .into_iter()
        .map(|edge| {
            let content = format!("{} {} {} ({})", edge.source, edge.relationship, edge.target, edge.evidence);
            let mut score = lexical_overlap_score(query, &content);
            if let Some(cue) = cue {
                if edge.relationship.to_lowercase().contains(cue) {
                    score = (score + 0.25).min(1.0);
                }
            }
            RetrievalHit {
                source_id: format!("{}->{}->{}", edge.source, edge.relationship, edge.target),
                score,
                content,
                source_type: SourceType::SharedGraph,
                location: "graph://local".to_string(),
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::GraphEdge;

    #[test]
    fn cue_boosts_matching_edge() {
        let store = RuntimeStore::memory();
        store.seed_demo_corpus(
            Vec::new(),
            vec![
                GraphEdge {
                    source: "Nolan".into(),
                    relationship: "director_of".into(),
                    target: "Inception".into(),
                    evidence: "credits".into(),
                },
                GraphEdge {
                    source: "Unrelated".into(),
                    relationship: "genre_of".into(),
                    target: "Something".into(),
                    evidence: "tag".into(),
                },
            ],
        );
        let hits = local_graph_hits(&store, "who is the director of Inception", 5);
        assert_eq!(hits[0].source_id, "Nolan->director_of->Inception");
    }
}
