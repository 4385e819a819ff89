//! Word-boundary text chunker.
//!
//! Splits document text into chunks of approximately `chunk_size`
//! characters without ever breaking a word. The bound is soft: a chunk may
//! run slightly over to keep a word intact, and a single word longer than
//! the bound is emitted whole as its own chunk.
//!
//! # Algorithm
//!
//! 1. Tokenize on whitespace.
//! 2. Accumulate words into the current chunk, counting `word.len() + 1`
//!    per word (the `+ 1` accounts for the joining space).
//! 3. When the running count passes `chunk_size`, flush the current chunk
//!    (space-joined) and start a new one seeded with the overflowing word,
//!    resetting the counter to that word's length.
//! 4. Flush any non-empty trailing chunk.
//!
//! The reset in step 3 is to the seed word's length, not zero; chunk
//! boundaries downstream depend on this exact arithmetic.
//!
//! [`rebalance_by_token_budget`] re-groups chunks under a whole-word token
//! budget for documents that must fit an upstream input ceiling.

/// Split `text` into word-preserving chunks of roughly `chunk_size` chars.
///
/// Empty (or all-whitespace) input yields an empty vec. Joining the output
/// with single spaces reproduces the input's token sequence exactly.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        current_len += word.len() + 1;
        if current_len > chunk_size {
            if !current.is_empty() {
                chunks.push(current.join(" "));
            }
            current = vec![word];
            current_len = word.len();
        } else {
            current.push(word);
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Merge `chunks` in order into groups whose whitespace-token count stays
/// within `max_tokens`.
///
/// Chunks inside a group are newline-joined. When adding a chunk would
/// push the running token count over budget, the buffer is flushed and the
/// chunk seeds the next group. A single chunk over budget becomes its own
/// group; empty groups are never emitted.
pub fn rebalance_by_token_budget(chunks: &[String], max_tokens: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut buf = String::new();
    let mut buf_tokens = 0usize;

    for chunk in chunks {
        let tokens = chunk.split_whitespace().count();
        if buf_tokens + tokens > max_tokens {
            if !buf.is_empty() {
                merged.push(std::mem::take(&mut buf));
            }
            buf.push_str(chunk);
            buf_tokens = tokens;
        } else {
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(chunk);
            buf_tokens += tokens;
        }
    }

    if !buf.is_empty() {
        merged.push(buf);
    }

    merged
}
