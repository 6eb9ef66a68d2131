//! Word-boundary hint matching used by the router and the graph branch.

const GRAPH_HINTS: &[&str] = &[
    "relationship", "related", "connection", "graph", "network", "linked",
];
const DOCUMENT_HINTS: &[&str] = &[
    "document", "file", "upload", "pdf", "attachment", "note",
];
const COUNT_HINTS: &[&str] = &["how many", "count", "number of", "total"];

/// Cues the graph branch and the response-policy summary extraction both
/// recognise.
pub const QUESTION_CUES: &[&str] = &["director", "actor", "genre", "country", "rating"];

/// Splits on non-alphanumeric boundaries, the same tokenisation
/// `common::scoring` and `common::semantic_key` use.
fn tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect()
}

/// True when `needle` occurs in `haystack` on whole-token boundaries, so
/// `"graph"` does not match inside `"photograph"` and `"document"` does not
/// match inside `"documentation"`. `needle` may itself be a multi-word phrase
/// (e.g. "how many"), matched as a contiguous run of tokens.
fn contains_word_boundary(haystack: &str, needle: &str) -> bool {
    let needle_tokens = tokens(needle);
    if needle_tokens.is_empty() {
        return false;
    }
    tokens(haystack).windows(needle_tokens.len()).any(|w| w == needle_tokens.as_slice())
}

pub fn any_count_hint(lowered: &str) -> bool {
    COUNT_HINTS.iter().any(|h| contains_word_boundary(lowered, h))
}

pub fn any_graph_hint(lowered: &str) -> bool {
    GRAPH_HINTS.iter().any(|h| contains_word_boundary(lowered, h))
}

pub fn any_document_hint(lowered: &str) -> bool {
    DOCUMENT_HINTS.iter().any(|h| contains_word_boundary(lowered, h))
}

/// Returns the first recognised question cue (director/actor/genre/...),
/// used both by the graph branch (to boost candidates) and by the response
/// policy (to pick a summary extraction strategy).
pub fn detect(lowered: &str) -> Option<&'static str> {
    QUESTION_CUES.iter().find(|c| contains_word_boundary(lowered, c)).copied()
}

const FOLLOW_UP_HINTS: &[&str] = &[
    "that movie", "this movie", "that doc", "this doc", "that file", "this file",
    "that relationship", "that result", "those findings",
];

pub fn any_follow_up_hint(lowered: &str) -> bool {
    FOLLOW_UP_HINTS.iter().any(|h| contains_word_boundary(lowered, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_count_hint() {
        assert!(any_count_hint("how many documents do i have"));
        assert!(!any_count_hint("what movie is this"));
    }

    #[test]
    fn detects_cue() {
        assert_eq!(detect("who is the director of this film"), Some("director"));
        assert_eq!(detect("nothing special here"), None);
    }

    #[test]
    fn detects_follow_up() {
        assert!(any_follow_up_hint("tell me more about that movie"));
        assert!(!any_follow_up_hint("tell me about a new topic"));
    }

    #[test]
    fn respects_word_boundaries() {
        assert!(!any_graph_hint("she developed the photograph in the darkroom"));
        assert!(!any_document_hint("the documentation needs an update"));
        assert!(!any_document_hint("please denote the change in the notebook"));
        assert!(any_graph_hint("show me the relationship graph"));
        assert!(any_document_hint("attach the pdf document"));
    }
}
