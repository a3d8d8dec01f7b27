//! ```text
//! Ingestion:
//!   PdfExtractor ──► ingestion::chunker ──► ingestion::enricher ──► ingestion::indexer ──► VectorStore
//!
//! Query:
//!   utterance ──► session::memory (load) ──► query::rewriter ──► query::entity_extractor
//!              └────────────────────────────────────────┬─────────────────────────────────┘
//!                                                        ▼
//!                                          query::self_query ──► query::expander
//!                                                        │
//!                                                        ▼
//!                                          query::retriever ──► VectorStore
//!                                                        │
//!                                                        ▼
//!                                          query::synthesizer ──► Answer
//!                                                        │
//!                                                        ▼
//!                                          session::memory (append, commit)
//! ```
//!
//! This crate implements a retrieval-augmented-generation core over tourism
//! offer documents: document ingestion into a searchable chunk index, and a
//! session-aware query pipeline that rewrites, filters, retrieves, and
//! synthesizes grounded answers in natural language.
//!
//! The crate is provider-agnostic: embeddings, chat completion, vector
//! storage, and PDF extraction are reached through the narrow async traits in
//! [`providers`]. [`providers::vector_store::SqliteVectorStore`] is the one
//! concrete adapter shipped here; [`providers::mock`] provides deterministic
//! stand-ins for tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod gazetteer;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod query;
pub mod session;
pub mod types;

pub use config::PipelineConfig;
pub use error::RagError;
pub use pipeline::RagPipeline;
pub use types::answer::Answer;
