//! Token-window chunking with table preservation.
//!
//! Plain text is split into overlapping windows of up to `max_tokens`
//! tokens (overlap = `max_tokens * overlap_ratio`), following the same
//! shape as `wg-ragsmith`'s semantic chunking pipeline but windowed by raw
//! token count rather than embedding-similarity breakpoints — offer PDFs
//! don't have the heading structure that similarity-based splitting needs.
//! Tables are extracted as their own self-contained chunks regardless of
//! size, since splitting a table mid-row destroys the information a
//! row/column answer needs.

use tiktoken_rs::CoreBPE;

use crate::error::IngestionError;
use crate::providers::ExtractedBlock;
use crate::types::chunk::Chunk;
use crate::types::metadata::EnrichedMetadata;

fn tokenizer() -> Option<CoreBPE> {
    tiktoken_rs::cl100k_base().ok()
}

/// Splits `text` into overlapping windows of at most `max_tokens` tokens.
/// Falls back to a fixed-width word window (sized so that whitespace-split
/// "words" approximate `max_tokens` tokens at a ~0.75 tokens/word ratio)
/// when no tokenizer is available.
fn windows(text: &str, max_tokens: usize, overlap_ratio: f32) -> Vec<String> {
    let overlap = ((max_tokens as f32) * overlap_ratio) as usize;
    let stride = max_tokens.saturating_sub(overlap).max(1);

    match tokenizer() {
        Some(bpe) => {
            let tokens = bpe.encode_ordinary(text);
            if tokens.is_empty() {
                return Vec::new();
            }
            let mut out = Vec::new();
            let mut start = 0;
            while start < tokens.len() {
                let end = (start + max_tokens).min(tokens.len());
                let window = &tokens[start..end];
                if let Ok(decoded) = bpe.decode(window.to_vec()) {
                    out.push(decoded);
                }
                if end == tokens.len() {
                    break;
                }
                start += stride;
            }
            out
        }
        None => {
            let words_per_window = ((max_tokens as f32) * 0.75).max(1.0) as usize;
            let word_stride = ((stride as f32) * 0.75).max(1.0) as usize;
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.is_empty() {
                return Vec::new();
            }
            let mut out = Vec::new();
            let mut start = 0;
            while start < words.len() {
                let end = (start + words_per_window).min(words.len());
                out.push(words[start..end].join(" "));
                if end == words.len() {
                    break;
                }
                start += word_stride;
            }
            out
        }
    }
}

/// Renders a table (rows of cells) as pipe-delimited text, self-contained
/// enough to stand alone as a chunk.
fn render_table(table: &[Vec<String>]) -> String {
    table
        .iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chunks every block of a document: tables become their own chunks first,
/// then the block's free text is windowed. `position` is assigned in
/// document order across both.
pub fn chunk_blocks(
    source_document: &str,
    blocks: &[ExtractedBlock],
    max_tokens: usize,
    overlap_ratio: f32,
) -> Result<Vec<Chunk>, IngestionError> {
    if max_tokens == 0 {
        return Err(IngestionError::Chunking(
            "chunk_max_tokens must be greater than zero".into(),
        ));
    }

    let mut position = 0usize;
    let mut chunks = Vec::new();

    for block in blocks {
        for table in &block.tables {
            if table.is_empty() {
                continue;
            }
            let text = render_table(table);
            chunks.push(Chunk::new(
                source_document,
                position,
                text,
                EnrichedMetadata::absent(),
            ));
            position += 1;
        }

        for window in windows(&block.text, max_tokens, overlap_ratio) {
            if window.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk::new(
                source_document,
                position,
                window,
                EnrichedMetadata::absent(),
            ));
            position += 1;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str) -> ExtractedBlock {
        ExtractedBlock {
            page: 0,
            text: text.to_string(),
            tables: Vec::new(),
        }
    }

    #[test]
    fn short_text_produces_a_single_chunk() {
        let blocks = vec![block("A short offer description.")];
        let chunks = chunk_blocks("doc.pdf", &blocks, 1024, 0.2).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn long_text_is_split_into_overlapping_windows() {
        let text = (0..2000)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let blocks = vec![block(&text)];
        let chunks = chunk_blocks("doc.pdf", &blocks, 64, 0.2).unwrap();
        assert!(chunks.len() > 1);
        for window in chunks.windows(2) {
            assert_ne!(window[0].id, window[1].id);
        }
    }

    #[test]
    fn tables_become_their_own_chunks() {
        let mut b = block("Some description text.");
        b.tables = vec![vec![
            vec!["Date".into(), "Price".into()],
            vec!["July".into(), "499".into()],
        ]];
        let chunks = chunk_blocks("doc.pdf", &[b], 1024, 0.2).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("Price"));
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let blocks = vec![block("text")];
        assert!(chunk_blocks("doc.pdf", &blocks, 0, 0.2).is_err());
    }

    #[test]
    fn reingesting_the_same_document_is_idempotent() {
        let blocks = vec![block("Stable content that never changes.")];
        let a = chunk_blocks("doc.pdf", &blocks, 1024, 0.2).unwrap();
        let b = chunk_blocks("doc.pdf", &blocks, 1024, 0.2).unwrap();
        assert_eq!(a, b);
    }
}
