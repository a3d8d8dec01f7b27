//! [`Chunk`]: the unit of indexable text.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::metadata::EnrichedMetadata;

/// One indexable text window with its enriched metadata.
///
/// `id` is a deterministic hash of `(source_document, position, text)` — two
/// chunks with identical identifiers have identical text, and re-ingesting a
/// document is idempotent because ingesting the same source at the same
/// position with the same text always yields the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_document: String,
    pub position: usize,
    pub text: String,
    pub metadata: EnrichedMetadata,
}

impl Chunk {
    pub fn new(
        source_document: impl Into<String>,
        position: usize,
        text: impl Into<String>,
        metadata: EnrichedMetadata,
    ) -> Self {
        let source_document = source_document.into();
        let text = text.into();
        let id = Self::compute_id(&source_document, position, &text);
        Self {
            id,
            source_document,
            position,
            text,
            metadata,
        }
    }

    /// Deterministic identifier: `sha256(source_document || 0x00 || position || 0x00 || text)`,
    /// hex-encoded.
    pub fn compute_id(source_document: &str, position: usize, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_document.as_bytes());
        hasher.update([0u8]);
        hasher.update(position.to_le_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_identical_ids() {
        let a = Chunk::new("doc.pdf", 0, "Hello", EnrichedMetadata::absent());
        let b = Chunk::new("doc.pdf", 0, "Hello", EnrichedMetadata::absent());
        assert_eq!(a.id, b.id);
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn different_position_changes_id() {
        let a = Chunk::new("doc.pdf", 0, "Hello", EnrichedMetadata::absent());
        let b = Chunk::new("doc.pdf", 1, "Hello", EnrichedMetadata::absent());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn different_source_changes_id() {
        let a = Chunk::new("doc-a.pdf", 0, "Hello", EnrichedMetadata::absent());
        let b = Chunk::new("doc-b.pdf", 0, "Hello", EnrichedMetadata::absent());
        assert_ne!(a.id, b.id);
    }
}
