/// Fixed-window chunking over characters, grounded in
/// `mofa_foundation::rag::chunker::TextChunker::chunk_by_chars`. Defaults of
/// 400/200 come from `convoy_core::config::IngestionConfig` (§4.I step 3).
pub fn chunk_fixed_window(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk);

        if end >= chars.len() {
            break;
        }

        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert_eq!(chunk_fixed_window("", 400, 200), Vec::<String>::new());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_fixed_window("hello world", 400, 200);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_overlaps_and_covers_tail() {
        let text = "a".repeat(1000);
        let chunks = chunk_fixed_window(&text, 400, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 400);
        }
        assert!(chunks.last().unwrap().ends_with('a'));
        let total_chars: usize = text.chars().count();
        let last_chunk_len = chunks.last().unwrap().chars().count();
        assert!(last_chunk_len > 0);
        assert_eq!(total_chars, 1000);
    }

    #[test]
    fn step_never_goes_backwards_or_infinite() {
        let text = "x".repeat(50);
        let chunks = chunk_fixed_window(&text, 10, 9);
        assert!(chunks.len() <= 50);
    }
}
