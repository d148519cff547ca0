/// Words per passage handed to the agent.
pub const DEFAULT_CHUNK_WORDS: usize = 200;
/// Words shared between consecutive passages.
pub const DEFAULT_OVERLAP_WORDS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
    pub word_count: usize,
}

/// Split text into overlapping word windows.
///
/// - `chunk_size`: target words per chunk
/// - `overlap`: words repeated at the start of the next chunk
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        let window = &words[start..end];
        chunks.push(Chunk {
            index: chunks.len(),
            content: window.join(" "),
            word_count: window.len(),
        });

        if end >= words.len() {
            break;
        }
        start += step;
    }

    chunks
}

pub fn chunk_text_default(text: &str) -> Vec<Chunk> {
    chunk_text(text, DEFAULT_CHUNK_WORDS, DEFAULT_OVERLAP_WORDS)
}
