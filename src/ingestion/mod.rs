//! Turns extracted document blocks into indexed, searchable chunks.
//!
//! Three stages, run in sequence by [`crate::pipeline::RagPipeline::ingest`]:
//! [`chunker`] splits text into token windows and lifts tables into their own
//! chunks, [`enricher`] attaches structured metadata to each chunk, and
//! [`indexer`] embeds and upserts the result, tracking resumability so a
//! crashed ingestion run can pick back up without re-processing documents it
//! already committed.

pub mod chunker;
pub mod enricher;
pub mod indexer;

pub use chunker::chunk_blocks;
pub use enricher::{enrich_chunk, FilenameHints};
pub use indexer::{IngestionReport, Indexer};
