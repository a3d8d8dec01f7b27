//! Wires every stage into the two operations external callers see:
//! [`RagPipeline::query`] and [`RagPipeline::ingest_file`]/[`RagPipeline::ingest_blocks`].
//!
//! The session lock is held for the full duration of a query — load,
//! rewrite, extract, parse, expand, retrieve, synthesize — and the session
//! is only persisted once, after synthesis completes, so a request that
//! fails or is cancelled midway never leaves a half-updated record on disk.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::{EmbeddingCache, ExpansionCache};
use crate::config::PipelineConfig;
use crate::error::RagError;
use crate::ingestion::indexer::IngestionTracker;
use crate::ingestion::{IngestionReport, Indexer};
use crate::providers::{ChatCompletionProvider, EmbeddingProvider, ExtractedBlock, PdfExtractor, VectorStore};
use crate::query::rewriter::implicit_filters_from_active_view;
use crate::query::{expand_query, extract_entities, parse_filters, retrieve, rewrite, synthesize};
use crate::session::memory::{append_turn, merge_entities, reset};
use crate::session::SessionStore;
use crate::types::answer::Answer;
use crate::types::filters::StructuredFilters;
use crate::types::session::Turn;

/// The fully assembled retrieval-augmented pipeline: one set of providers,
/// one config, one session store, one indexer.
pub struct RagPipeline {
    config: PipelineConfig,
    vector_store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn ChatCompletionProvider>,
    pdf_extractor: Arc<dyn PdfExtractor>,
    session_store: Arc<SessionStore>,
    indexer: Indexer,
    expansion_cache: Arc<ExpansionCache>,
}

impl RagPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        vector_store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn ChatCompletionProvider>,
        pdf_extractor: Arc<dyn PdfExtractor>,
        session_dir: impl Into<std::path::PathBuf>,
        ingestion_tracker_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        let embedding_cache = Arc::new(EmbeddingCache::new(config.embedding_cache_capacity));
        let expansion_cache = Arc::new(ExpansionCache::new(config.expansion_cache_capacity));
        let indexer = Indexer::new(
            vector_store.clone(),
            embedding.clone(),
            completion.clone(),
            embedding_cache,
            IngestionTracker::new(ingestion_tracker_path),
        );

        Self {
            session_store: Arc::new(SessionStore::new(session_dir)),
            config,
            vector_store,
            embedding,
            completion,
            pdf_extractor,
            indexer,
            expansion_cache,
        }
    }

    /// Answers `utterance` within `session_id`'s conversation, mutating and
    /// persisting the session exactly once, at the end.
    pub async fn query(&self, session_id: &str, utterance: &str) -> Result<Answer, RagError> {
        let _session_lock = self.session_store.lock_session(session_id).await;
        let now = Utc::now();
        let mut session = self
            .session_store
            .load(session_id, now, self.config.session_ttl_secs)
            .await?;

        let rewritten = rewrite(
            self.completion.as_ref(),
            utterance,
            &session.recent_turns,
            &session.active_view,
        )
        .await;

        let entities = extract_entities(self.completion.as_ref(), utterance, &session.active_view).await;
        let message_id = Uuid::new_v4().to_string();
        merge_entities(&mut session, &entities, now, &message_id);

        let (filters, _self_query_confidence) = parse_filters(self.completion.as_ref(), &rewritten).await;

        let expanded = expand_query(
            self.completion.as_ref(),
            &self.expansion_cache,
            &rewritten.text,
            self.config.expansion_term_limit,
        )
        .await;

        let candidates = retrieve(
            self.vector_store.as_ref(),
            self.embedding.as_ref(),
            &expanded,
            &filters,
            &self.config,
        )
        .await?;

        let answer = synthesize(
            self.completion.as_ref(),
            &rewritten.text,
            &candidates,
            &session.active_view,
            filters,
        )
        .await;

        let turn = Turn {
            message_id,
            user_utterance: utterance.to_string(),
            assistant_response: answer.text.clone(),
            extracted_entities: entities,
            cited_sources: answer.citations.clone(),
            timestamp: now,
        };
        append_turn(&mut session, turn, self.config.session_ring_size);
        session.last_active = now;
        self.session_store.save(&session).await?;

        Ok(answer)
    }

    /// Extracts and indexes a document from disk via the configured
    /// [`PdfExtractor`].
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionReport, RagError> {
        let blocks = self.pdf_extractor.extract(path).await?;
        let source_document = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();
        self.ingest_blocks(&source_document, &blocks).await
    }

    /// Indexes already-extracted blocks under `source_document` — the entry
    /// point used directly by tests and by callers that extract text
    /// themselves.
    pub async fn ingest_blocks(&self, source_document: &str, blocks: &[ExtractedBlock]) -> Result<IngestionReport, RagError> {
        Ok(self
            .indexer
            .ingest_document(
                source_document,
                blocks,
                self.config.chunk_max_tokens,
                self.config.chunk_overlap_ratio,
                self.config.destination_override_confidence,
            )
            .await?)
    }

    /// Creates a fresh session, tagging it with `user_type`/`user_hint` in
    /// the session's forward-compatible field bag (the schema has no
    /// dedicated column for client-surface metadata).
    pub async fn create_session(&self, user_type: &str, user_hint: Option<&str>) -> Result<String, RagError> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut session = crate::types::session::Session::new(&session_id, now);
        session
            .unknown_fields
            .insert("user_type".to_string(), serde_json::Value::String(user_type.to_string()));
        if let Some(hint) = user_hint {
            session
                .unknown_fields
                .insert("user_hint".to_string(), serde_json::Value::String(hint.to_string()));
        }
        self.session_store.save(&session).await?;
        Ok(session_id)
    }

    /// Clears a session's conversational state while keeping its identity.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), RagError> {
        let _lock = self.session_store.lock_session(session_id).await;
        let now = Utc::now();
        let mut session = self
            .session_store
            .load(session_id, now, self.config.session_ttl_secs)
            .await?;
        reset(&mut session, now);
        self.session_store.save(&session).await?;
        Ok(())
    }

    /// The filters currently "in force" for a session, for UI display.
    pub async fn active_filters(&self, session_id: &str) -> Result<StructuredFilters, RagError> {
        let now = Utc::now();
        let session = self
            .session_store
            .load(session_id, now, self.config.session_ttl_secs)
            .await?;
        Ok(implicit_filters_from_active_view(&session.active_view, false))
    }

    /// Removes session files idle past the configured TTL.
    pub async fn janitor_sweep(&self, session_dir: &Path) -> Result<usize, RagError> {
        let now = Utc::now();
        Ok(self
            .session_store
            .janitor_sweep(session_dir, now, self.config.session_ttl_secs)
            .await?)
    }
}
