//! Drives the vector store with a priority-selected hard filter, then applies
//! weighted soft penalties to reorder the over-fetched candidate set.
//!
//! Mirrors the teacher's `wg-ragsmith::stores::Backend` query shape: one
//! equality predicate at a time, with everything else pushed into
//! application-side scoring rather than a richer store query language.

use serde::Serialize;
use tracing::{instrument, warn};

use crate::config::{PenaltyWeights, PipelineConfig};
use crate::error::RetrievalError;
use crate::providers::{EmbeddingProvider, EqualityFilter, VectorStore, VectorStoreHit};
use crate::types::answer::{PenaltyEntry, ScoredChunk};
use crate::types::chunk::Chunk;
use crate::types::filters::StructuredFilters;
use crate::types::metadata::EnrichedMetadata;

fn enum_to_filter_value<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Selects at most one hard filter, in destination > travel_month > category
/// > price_range priority order.
fn select_hard_filter(filters: &StructuredFilters) -> Option<EqualityFilter> {
    if let Some(destination) = &filters.destination {
        return Some(EqualityFilter {
            key: "destination".to_string(),
            value: destination.clone(),
        });
    }
    if let Some(month) = filters.travel_month {
        return Some(EqualityFilter {
            key: "travel_month".to_string(),
            value: enum_to_filter_value(&month),
        });
    }
    if let Some(category) = filters.category {
        return Some(EqualityFilter {
            key: "category".to_string(),
            value: enum_to_filter_value(&category),
        });
    }
    if let Some(price_range) = filters.price_range {
        return Some(EqualityFilter {
            key: "price_range".to_string(),
            value: enum_to_filter_value(&price_range),
        });
    }
    None
}

fn hit_to_chunk(hit: &VectorStoreHit) -> (Chunk, EnrichedMetadata) {
    let metadata: EnrichedMetadata = serde_json::from_value(hit.metadata.clone()).unwrap_or_default();
    let source_document = hit
        .metadata
        .get("source_document")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let position = hit
        .metadata
        .get("position")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;
    let chunk = Chunk {
        id: hit.id.clone(),
        source_document,
        position,
        text: hit.text.clone(),
        metadata: metadata.clone(),
    };
    (chunk, metadata)
}

/// Computes the combined soft-penalty multiplier and its trace for one
/// candidate against filters not used as the hard filter. `hard_filter_key`
/// is `None` when the retrieval fell back to no hard filter at all.
fn apply_soft_penalties(
    metadata: &EnrichedMetadata,
    filters: &StructuredFilters,
    hard_filter_key: Option<&str>,
    weights: &PenaltyWeights,
) -> (f32, Vec<PenaltyEntry>) {
    const PRICE_OVERSHOOT_COEFFICIENT: f32 = 0.2;

    let mut multiplier = 1.0f32;
    let mut trace = Vec::new();

    if let Some(query_max) = filters.price_max {
        if let Some(chunk_min) = metadata.price_min {
            if chunk_min > query_max && query_max > 0.0 {
                let overshoot_ratio = ((chunk_min - query_max) / query_max) as f32;
                let penalty_fraction =
                    (PRICE_OVERSHOOT_COEFFICIENT * overshoot_ratio).min(weights.price_overshoot_max_penalty);
                let m = 1.0 - penalty_fraction;
                multiplier *= m;
                trace.push(PenaltyEntry {
                    reason: "price_max_overshoot".to_string(),
                    multiplier: m,
                });
            }
        }
    }

    if hard_filter_key != Some("travel_month") {
        if let Some(query_month) = filters.travel_month {
            if let Some(chunk_month) = metadata.travel_month {
                if chunk_month != query_month {
                    let m = if query_month.is_adjacent(chunk_month) {
                        weights.month_adjacent_penalty
                    } else {
                        weights.month_distant_penalty
                    };
                    multiplier *= m;
                    trace.push(PenaltyEntry {
                        reason: "travel_month_mismatch".to_string(),
                        multiplier: m,
                    });
                }
            }
        }
    }

    if let (Some(query_duration), Some(chunk_duration)) = (filters.duration_days, metadata.duration_days) {
        if query_duration != chunk_duration && query_duration > 0 {
            let diff = (query_duration as i64 - chunk_duration as i64).unsigned_abs() as f32;
            let penalty_fraction = (diff / query_duration as f32).min(weights.duration_max_penalty);
            let m = 1.0 - penalty_fraction;
            multiplier *= m;
            trace.push(PenaltyEntry {
                reason: "duration_mismatch".to_string(),
                multiplier: m,
            });
        }
    }

    if hard_filter_key != Some("category") {
        if let (Some(query_category), Some(chunk_category)) = (filters.category, metadata.category) {
            if query_category != chunk_category {
                multiplier *= weights.category_mismatch_penalty;
                trace.push(PenaltyEntry {
                    reason: "category_mismatch".to_string(),
                    multiplier: weights.category_mismatch_penalty,
                });
            }
        }
    }

    if let (Some(query_ff), Some(chunk_ff)) = (filters.family_friendly, metadata.family_friendly) {
        if query_ff != chunk_ff {
            multiplier *= weights.family_friendly_conflict_penalty;
            trace.push(PenaltyEntry {
                reason: "family_friendly_conflict".to_string(),
                multiplier: weights.family_friendly_conflict_penalty,
            });
        }
    }

    (multiplier, trace)
}

/// Runs hybrid retrieval: embed the expanded query, issue a hard-filtered
/// search over-fetched by `retrieval_overfetch_factor`, fall back to no hard
/// filter if too few results survive, apply soft penalties, and truncate to
/// `retrieval_top_k`.
#[instrument(skip(vector_store, embedding, expanded_text, filters, config))]
pub async fn retrieve(
    vector_store: &dyn VectorStore,
    embedding: &dyn EmbeddingProvider,
    expanded_text: &str,
    filters: &StructuredFilters,
    config: &PipelineConfig,
) -> Result<Vec<ScoredChunk>, RetrievalError> {
    let query_vector = embedding
        .embed(expanded_text)
        .await
        .map_err(|err| RetrievalError::Embedding(err.to_string()))?;

    let overfetch_k = ((config.retrieval_top_k as f32) * config.retrieval_overfetch_factor).ceil() as usize;
    let hard_filter = select_hard_filter(filters);

    let mut hits = vector_store
        .query(&query_vector, hard_filter.clone(), overfetch_k)
        .await?;

    let mut effective_hard_filter_key = hard_filter.as_ref().map(|f| f.key.clone());
    if hard_filter.is_some() && hits.len() < config.retrieval_fallback_threshold {
        warn!(
            hard_filtered_count = hits.len(),
            threshold = config.retrieval_fallback_threshold,
            "hard-filtered retrieval underfilled, falling back to no hard filter"
        );
        hits = vector_store.query(&query_vector, None, overfetch_k).await?;
        effective_hard_filter_key = None;
    }

    let mut scored: Vec<ScoredChunk> = hits
        .iter()
        .map(|hit| {
            let (chunk, metadata) = hit_to_chunk(hit);
            let raw_similarity = 1.0 / (1.0 + hit.distance.max(0.0));
            let (penalty_multiplier, penalty_trace) =
                apply_soft_penalties(&metadata, filters, effective_hard_filter_key.as_deref(), &config.penalty_weights);
            ScoredChunk {
                chunk,
                raw_similarity,
                adjusted_score: raw_similarity * penalty_multiplier,
                penalty_trace,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.adjusted_score.partial_cmp(&a.adjusted_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(config.retrieval_top_k);
    Ok(scored)
}
