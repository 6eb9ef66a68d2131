//! Cache-key canonicalisation: paraphrases that differ only in
//! ordering, casing or trivial words must share a cache entry.

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "of", "in", "on", "at", "to",
    "for", "and", "or", "do", "does", "did", "what", "which", "who", "whom",
    "this", "that", "these", "those", "please", "me", "my",
];

/// Lowercases, keeps only alphanumeric tokens, strips stop words, sorts the
/// remaining tokens, and joins them with a single space.
pub fn semantic_key(query: &str) -> String {
    let mut tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_owned)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Builds the full retrieval-cache key: route, user id, semantic key of the
/// query, rerank backend, and rerank model, joined with `|`.
pub fn cache_key(
    route: &str,
    user_id: Option<&str>,
    query: &str,
    rerank_backend: &str,
    rerank_model: Option<&str>,
) -> String {
    format!(
        "{route}|{}|{}|{rerank_backend}|{}",
        user_id.unwrap_or(""),
        semantic_key(query),
        rerank_model.unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paraphrases_collapse() {
        assert_eq!(
            semantic_key("What is the director of Inception?"),
            semantic_key("director Inception")
        );
    }

    #[test]
    fn order_and_case_insensitive() {
        assert_eq!(semantic_key("Rust Graph"), semantic_key("graph rust"));
    }

    #[test]
    fn cache_key_field_order() {
        let k = cache_key("document", Some("u1"), "hello world", "heuristic", None);
        assert_eq!(k, "document|u1|hello world|heuristic|");
    }
}
