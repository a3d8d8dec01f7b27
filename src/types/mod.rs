//! Core data model shared across the ingestion and query pipelines.

pub mod answer;
pub mod chunk;
pub mod filters;
pub mod metadata;
pub mod session;

pub use answer::{Answer, PenaltyEntry, ScoredChunk, SourceCitation};
pub use chunk::Chunk;
pub use filters::{FilterProvenance, ProvenancedFilter, RewrittenQuery, StructuredFilters};
pub use metadata::{Category, EnrichedMetadata, Month, PriceRange, Season, TransportType};
pub use session::{ActiveEntityView, EntityEntry, EntityKind, EntityMap, ExtractedEntity, Session, Turn};
