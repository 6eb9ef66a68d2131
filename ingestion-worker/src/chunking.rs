//! Sliding-window chunker: `chunk_size=600` chars, `overlap=120`
//! chars, offsets relative to a running global counter, empty snippets
//! dropped.

pub struct Window {
    pub content: String,
    pub offset_start: usize,
    pub offset_end: usize,
}

pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Window> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let snippet: String = chars[start..end].iter().collect();
        let trimmed = snippet.trim();
        if !trimmed.is_empty() {
            windows.push(Window {
                content: trimmed.to_string(),
                offset_start: start,
                offset_end: end,
            });
        }
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_monotonic_and_overlap() {
        let text = "a".repeat(1500);
        let windows = chunk_text(&text, 600, 120);
        assert!(windows.len() >= 3);
        for pair in windows.windows(2) {
            assert!(pair[1].offset_start > pair[0].offset_start);
            assert!(pair[1].offset_start < pair[0].offset_end);
        }
    }

    #[test]
    fn empty_input_yields_no_windows() {
        assert!(chunk_text("", 600, 120).is_empty());
    }

    #[test]
    fn whitespace_only_snippet_is_dropped() {
        let windows = chunk_text("   ", 600, 120);
        assert!(windows.is_empty());
    }

    #[test]
    fn short_text_is_a_single_window() {
        let windows = chunk_text("hello world", 600, 120);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].content, "hello world");
        assert_eq!(windows[0].offset_start, 0);
    }
}
