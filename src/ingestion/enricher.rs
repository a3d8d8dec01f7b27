//! Attaches structured [`EnrichedMetadata`] to a chunk via an LLM pass, with
//! deterministic filename-derived overrides and graceful degradation to
//! absent metadata when enrichment can't be trusted.

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::IngestionError;
use crate::gazetteer;
use crate::providers::{ChatCompletionProvider, CompletionRequest};
use crate::types::chunk::Chunk;
use crate::types::metadata::{Category, EnrichedMetadata, Month, PriceRange, Season, TransportType};

const ENRICHMENT_SYSTEM_PROMPT: &str = "You are a structured data extraction assistant for a \
tourism offer catalogue. Given a document excerpt, extract the fields of the JSON schema you are \
given. Use null for any field not clearly supported by the text. Never guess.";

/// Deterministic hints derived from a source document's filename, used to
/// override low-confidence LLM destination guesses.
#[derive(Debug, Clone, Default)]
pub struct FilenameHints {
    pub destination: Option<String>,
    pub category: Option<Category>,
}

impl FilenameHints {
    /// Scans a filename (without requiring it to be a valid path on disk)
    /// for a known destination name and category keyword.
    pub fn from_filename(filename: &str) -> Self {
        let normalized = filename.replace(['_', '-', '.'], " ");
        let destination = gazetteer::find_destination_mention(&normalized).map(str::to_string);
        let lower = normalized.to_lowercase();
        let category = if lower.contains("hotel") {
            Some(Category::Hotel)
        } else if lower.contains("restoran") || lower.contains("restaurant") {
            Some(Category::Restaurant)
        } else if lower.contains("tura") || lower.contains("tour") || lower.contains("aranzman") {
            Some(Category::Tour)
        } else if lower.contains("atrakcij") || lower.contains("attraction") {
            Some(Category::Attraction)
        } else {
            None
        };
        Self { destination, category }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawEnrichment {
    destination: Option<String>,
    category: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    currency: Option<String>,
    duration_days: Option<u32>,
    transport_type: Option<String>,
    travel_month: Option<String>,
    family_friendly: Option<bool>,
    #[serde(default)]
    amenities: Vec<String>,
    subcategory: Option<String>,
    #[serde(default)]
    confidence_score: f32,
}

fn enrichment_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "destination": {"type": ["string", "null"]},
            "category": {"type": ["string", "null"], "enum": ["tour", "hotel", "restaurant", "attraction", null]},
            "price_min": {"type": ["number", "null"]},
            "price_max": {"type": ["number", "null"]},
            "currency": {"type": ["string", "null"]},
            "duration_days": {"type": ["integer", "null"]},
            "transport_type": {"type": ["string", "null"], "enum": ["air", "bus", "car", "train", "mixed", "none", null]},
            "travel_month": {"type": ["string", "null"]},
            "family_friendly": {"type": ["boolean", "null"]},
            "amenities": {"type": "array", "items": {"type": "string"}},
            "subcategory": {"type": ["string", "null"]},
            "confidence_score": {"type": "number"}
        },
        "required": []
    })
}

/// The chunk-text category override: an "aranžman" marker means `tour`, a
/// "menu" marker means `restaurant`. Checked independently of the filename.
fn category_override_from_text(text: &str) -> Option<Category> {
    let lower = text.to_lowercase();
    if lower.contains("aranžman") || lower.contains("aranzman") {
        Some(Category::Tour)
    } else if lower.contains("menu") {
        Some(Category::Restaurant)
    } else {
        None
    }
}

/// Resolves two category guesses that may overlap using
/// [`Category::priority`] (lower wins, `Tour` ≻ `Restaurant` ≻ `Hotel` ≻
/// `Attraction`), rather than letting whichever guess arrives first stick.
fn resolve_category(current: Option<Category>, candidate: Option<Category>) -> Option<Category> {
    match (current, candidate) {
        (Some(current), Some(candidate)) => {
            if candidate.priority() < current.priority() {
                Some(candidate)
            } else {
                Some(current)
            }
        }
        (Some(current), None) => Some(current),
        (None, candidate) => candidate,
    }
}

fn raw_to_metadata(raw: RawEnrichment) -> EnrichedMetadata {
    let travel_month = raw.travel_month.as_deref().and_then(Month::parse);
    let mut metadata = EnrichedMetadata {
        destination: raw.destination,
        category: raw.category.as_deref().and_then(Category::parse),
        price_range: None,
        price_min: raw.price_min,
        price_max: raw.price_max,
        currency: raw.currency,
        duration_days: raw.duration_days,
        transport_type: raw.transport_type.as_deref().and_then(TransportType::parse),
        travel_month,
        season: travel_month.map(Season::from_month),
        family_friendly: raw.family_friendly,
        amenities: raw.amenities.into_iter().collect(),
        subcategory: raw.subcategory,
        confidence_score: raw.confidence_score.clamp(0.0, 1.0),
    };
    if let Some(max) = metadata.price_max {
        metadata.price_range = Some(PriceRange::from_price_max(max));
    }
    metadata.enforce_price_invariant();
    metadata
}

async fn request_enrichment(
    completion: &dyn ChatCompletionProvider,
    chunk_text: &str,
) -> Result<RawEnrichment, IngestionError> {
    let request = CompletionRequest {
        system: ENRICHMENT_SYSTEM_PROMPT.to_string(),
        user: chunk_text.to_string(),
        json_schema: Some(enrichment_schema()),
    };
    let response = completion
        .complete(request)
        .await
        .map_err(|err| IngestionError::Enrichment(err.to_string()))?;
    serde_json::from_str(&response).map_err(|err| IngestionError::Enrichment(err.to_string()))
}

/// Enriches a chunk's metadata. Retries the LLM call once on failure; if
/// both attempts fail, the chunk is indexed with [`EnrichedMetadata::absent`]
/// rather than failing the whole ingestion run — a chunk with no metadata is
/// still searchable by text, just not by structured filter.
#[instrument(skip(completion, chunk), fields(chunk_id = %chunk.id))]
pub async fn enrich_chunk(
    chunk: &Chunk,
    completion: &dyn ChatCompletionProvider,
    hints: &FilenameHints,
    destination_override_confidence: f32,
) -> EnrichedMetadata {
    let raw = match request_enrichment(completion, &chunk.text).await {
        Ok(raw) => raw,
        Err(first_err) => {
            warn!(error = %first_err, "enrichment attempt 1 failed, retrying");
            match request_enrichment(completion, &chunk.text).await {
                Ok(raw) => raw,
                Err(second_err) => {
                    warn!(error = %second_err, "enrichment retry failed, indexing with absent metadata");
                    let mut metadata = EnrichedMetadata::absent();
                    metadata.category = category_override_from_text(&chunk.text);
                    return apply_filename_overrides(metadata, hints, destination_override_confidence);
                }
            }
        }
    };

    let mut metadata = raw_to_metadata(raw);
    metadata.category = resolve_category(metadata.category, category_override_from_text(&chunk.text));
    apply_filename_overrides(metadata, hints, destination_override_confidence)
}

fn apply_filename_overrides(
    mut metadata: EnrichedMetadata,
    hints: &FilenameHints,
    destination_override_confidence: f32,
) -> EnrichedMetadata {
    let destination_untrusted =
        metadata.destination.is_none() || metadata.confidence_score < destination_override_confidence;
    if destination_untrusted {
        if let Some(destination) = &hints.destination {
            metadata.destination = Some(destination.clone());
        }
    }
    metadata.category = resolve_category(metadata.category, hints.category);
    metadata
}
