//! Sentence-aware text chunking.
//!
//! Chunks never exceed `max_chars` characters and always end on a char
//! boundary, so concatenating them in order gives back the input exactly.
//! Within each window the cut is placed after the latest sentence end; if
//! that would leave a chunk shorter than 30% of the window the cut moves to
//! the latest comma or space, and a window with neither is hard-cut.

const SENTENCE_DELIMITERS: [&str; 7] = [". ", "? ", "! ", ".\n", "?\n", "!\n", "\n"];

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Empty input yields no chunks. A `max_chars` of zero is treated as one.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let window_end = match rest.char_indices().nth(max_chars) {
            Some((byte_index, _)) => byte_index,
            None => {
                chunks.push(rest);
                break;
            }
        };
        let cut = cut_point(&rest[..window_end]);
        let (chunk, tail) = rest.split_at(cut);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}

/// Byte offset (within `window`) after which to cut. Always in `1..=window.len()`.
fn cut_point(window: &str) -> usize {
    let sentence_cut = SENTENCE_DELIMITERS
        .iter()
        .filter_map(|delimiter| window.rfind(delimiter).map(|i| i + delimiter.len()))
        .max();
    let min_cut = window.len() * 3 / 10;

    match sentence_cut {
        Some(cut) if cut >= min_cut => cut,
        _ => window
            .rfind([',', ' '])
            .map(|i| i + 1)
            .unwrap_or(window.len()),
    }
}
