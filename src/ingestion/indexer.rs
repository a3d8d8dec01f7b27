//! Embeds and upserts chunks, and tracks which source documents have
//! already been committed so a crashed ingestion run can resume without
//! redoing work.
//!
//! The resume tracker's persistence is grounded on
//! `wg-ragsmith::ingestion::resume::ResumeTracker`, but writes atomically —
//! to a sibling temp file, then renamed over the target — so a crash
//! mid-write can never leave a half-written, unreadable state file behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::cache::EmbeddingCache;
use crate::error::IngestionError;
use crate::ingestion::chunker::chunk_blocks;
use crate::ingestion::enricher::{enrich_chunk, FilenameHints};
use crate::providers::{ChatCompletionProvider, EmbeddingProvider, ExtractedBlock, VectorStore};

/// Slugifies an amenity name into a store-safe key suffix: lowercased, with
/// every run of non-alphanumeric characters collapsed to a single `_`.
fn amenity_slug(amenity: &str) -> String {
    let mut slug = String::with_capacity(amenity.len());
    let mut last_was_sep = false;
    for ch in amenity.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    slug.trim_matches('_').to_string()
}

/// Replaces the list-valued `amenities` entry with one boolean `amenity_<name>`
/// key per amenity, since the store only filters on scalar primitives by
/// equality — a JSON array can't be matched that way.
fn flatten_amenities(map: &mut serde_json::Map<String, serde_json::Value>, amenities: &std::collections::BTreeSet<String>) {
    map.remove("amenities");
    for amenity in amenities {
        let slug = amenity_slug(amenity);
        if slug.is_empty() {
            continue;
        }
        map.insert(format!("amenity_{slug}"), serde_json::Value::Bool(true));
    }
}

/// Tracks which source documents have already been fully indexed.
#[derive(Clone)]
pub struct IngestionTracker {
    path: PathBuf,
    state: Arc<Mutex<HashSet<String>>>,
}

impl IngestionTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<(), IngestionError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        let documents: Vec<String> = serde_json::from_str(&data)?;
        let mut guard = self.state.lock().await;
        guard.clear();
        guard.extend(documents);
        Ok(())
    }

    pub async fn contains(&self, source_document: &str) -> bool {
        self.state.lock().await.contains(source_document)
    }

    /// Marks `source_document` processed and atomically persists the updated
    /// set: write to a temp file in the same directory, then rename over
    /// the target, so a reader never observes a partially-written file.
    pub async fn mark_processed(&self, source_document: &str) -> Result<(), IngestionError> {
        let mut guard = self.state.lock().await;
        if !guard.insert(source_document.to_string()) {
            return Ok(());
        }
        let documents: Vec<String> = guard.iter().cloned().collect();
        drop(guard);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string(&documents)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, serialized).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Summary of one [`Indexer::ingest_document`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionReport {
    pub chunks_indexed: usize,
    pub already_processed: bool,
}

/// Drives chunking, enrichment, embedding, and upsert for one document.
pub struct Indexer {
    vector_store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn ChatCompletionProvider>,
    embedding_cache: Arc<EmbeddingCache>,
    tracker: IngestionTracker,
}

impl Indexer {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn ChatCompletionProvider>,
        embedding_cache: Arc<EmbeddingCache>,
        tracker: IngestionTracker,
    ) -> Self {
        Self {
            vector_store,
            embedding,
            completion,
            embedding_cache,
            tracker,
        }
    }

    #[instrument(skip(self, blocks), fields(source_document = %source_document))]
    pub async fn ingest_document(
        &self,
        source_document: &str,
        blocks: &[ExtractedBlock],
        chunk_max_tokens: usize,
        chunk_overlap_ratio: f32,
        destination_override_confidence: f32,
    ) -> Result<IngestionReport, IngestionError> {
        if self.tracker.contains(source_document).await {
            info!("document already indexed, skipping");
            return Ok(IngestionReport {
                chunks_indexed: 0,
                already_processed: true,
            });
        }

        let chunks = chunk_blocks(source_document, blocks, chunk_max_tokens, chunk_overlap_ratio)?;
        let hints = FilenameHints::from_filename(source_document);

        let mut indexed = 0usize;
        for chunk in &chunks {
            let metadata =
                enrich_chunk(chunk, self.completion.as_ref(), &hints, destination_override_confidence).await;

            let embedding = match self.embedding_cache.get(&chunk.text) {
                Some(cached) => cached,
                None => {
                    let vector = self
                        .embedding
                        .embed(&chunk.text)
                        .await
                        .map_err(|err| IngestionError::Embedding(err.to_string()))?;
                    self.embedding_cache.put(chunk.text.clone(), vector.clone());
                    vector
                }
            };

            let mut metadata_json = serde_json::to_value(&metadata)?;
            if let serde_json::Value::Object(map) = &mut metadata_json {
                map.insert("source_document".to_string(), chunk.source_document.clone().into());
                map.insert("position".to_string(), chunk.position.into());
                flatten_amenities(map, &metadata.amenities);
            }
            self.vector_store
                .upsert(&chunk.id, embedding, metadata_json, &chunk.text)
                .await?;
            indexed += 1;
        }

        self.tracker.mark_processed(source_document).await?;

        Ok(IngestionReport {
            chunks_indexed: indexed,
            already_processed: false,
        })
    }
}
