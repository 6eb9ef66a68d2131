//! Score normalisation and lexical-overlap helpers for scoring plain
//! `RetrievalHit` values.

use std::collections::{HashMap, HashSet};

use crate::model::{RetrievalHit, SourceType};

pub fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Min-max normalises a slice of scores into `[0, 1]`. Degenerate ranges
/// (all equal, empty, or non-finite) normalise to `1.0` for every entry
/// rather than dividing by zero.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let finite: Vec<f32> = scores.iter().map(|s| if s.is_finite() { *s } else { 0.0 }).collect();
    let min = finite.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = finite.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !(max - min).is_finite() || (max - min).abs() < f32::EPSILON {
        return finite.iter().map(|_| 1.0).collect();
    }
    finite.iter().map(|s| clamp_unit((s - min) / (max - min))).collect()
}

/// Lexical overlap between query and content: fraction of unique query
/// tokens (alphanumeric, lowercase) present in the content.
pub fn lexical_overlap_score(query: &str, content: &str) -> f32 {
    let query_tokens: HashSet<String> = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content);
    let overlap = query_tokens.intersection(&content_tokens).count();
    clamp_unit(overlap as f32 / query_tokens.len() as f32)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `score_normalization_v2`: group hits by `source_type`, min-max
/// normalise each group, then blend 0.7 normalised-semantic + 0.3 lexical.
pub fn score_normalization_v2(query: &str, hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut by_group: HashMap<SourceType, Vec<usize>> = HashMap::new();
    for (idx, hit) in hits.iter().enumerate() {
        by_group.entry(hit.source_type).or_default().push(idx);
    }

    let mut normalised = vec![0.0_f32; hits.len()];
    for indices in by_group.values() {
        let raw: Vec<f32> = indices.iter().map(|&i| hits[i].score).collect();
        let norm = min_max_normalize(&raw);
        for (pos, &idx) in indices.iter().enumerate() {
            normalised[idx] = norm[pos];
        }
    }

    let mut blended: Vec<RetrievalHit> = hits
        .into_iter()
        .enumerate()
        .map(|(idx, mut hit)| {
            let lexical = lexical_overlap_score(query, &hit.content);
            hit.score = clamp_unit(0.7 * normalised[idx] + 0.3 * lexical);
            hit
        })
        .collect();

    blended.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    dedupe_by_source_id_keep_first(blended)
}

/// Removes duplicate `source_id`s, keeping the first occurrence (callers
/// sort by score descending first, so "first" means "highest score").
pub fn dedupe_by_source_id_keep_first(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.source_id.clone()))
        .collect()
}

pub fn sort_by_score_desc(mut hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32, st: SourceType) -> RetrievalHit {
        RetrievalHit {
            source_id: id.to_string(),
            score,
            content: "rust graph retrieval".to_string(),
            source_type: st,
            location: "loc".to_string(),
        }
    }

    #[test]
    fn min_max_handles_degenerate_range() {
        let out = min_max_normalize(&[0.5, 0.5, 0.5]);
        assert_eq!(out, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn min_max_empty() {
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn dedupe_keeps_first() {
        let hits = vec![hit("a", 0.9, SourceType::PrivateDocument), hit("a", 0.1, SourceType::PrivateDocument)];
        let out = dedupe_by_source_id_keep_first(hits);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn lexical_overlap_is_unit_ranged() {
        let s = lexical_overlap_score("rust graph", "the rust ecosystem has a graph crate");
        assert!(s > 0.0 && s <= 1.0);
    }
}
