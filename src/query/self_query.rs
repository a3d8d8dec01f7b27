//! LLM-structured extraction of `StructuredFilters` from a rewritten query,
//! with post-parse canonicalization and merge over the rewriter's implicit
//! filters — explicit values always win.

use serde::Deserialize;
use tracing::{instrument, warn};

use crate::gazetteer;
use crate::providers::{ChatCompletionProvider, CompletionRequest};
use crate::types::filters::{RewrittenQuery, StructuredFilters};
use crate::types::metadata::{Category, Month, PriceRange, TransportType};

const SELF_QUERY_SYSTEM_PROMPT: &str = "Extract structured search filters from a tourism query. \
Return a JSON object with fields: destination (string or null), category (one of tour, hotel, \
restaurant, attraction, or null), price_min (number or null), price_max (number or null), \
duration_days (integer or null), transport_type (one of air, bus, car, train, mixed, none, or \
null), travel_month (month name or null), family_friendly (boolean or null), and confidence \
(0 to 1). Map anything not clearly stated to null — never guess.";

fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "destination": {"type": ["string", "null"]},
            "category": {"type": ["string", "null"], "enum": ["tour", "hotel", "restaurant", "attraction", null]},
            "price_min": {"type": ["number", "null"]},
            "price_max": {"type": ["number", "null"]},
            "duration_days": {"type": ["integer", "null"]},
            "transport_type": {"type": ["string", "null"], "enum": ["air", "bus", "car", "train", "mixed", "none", null]},
            "travel_month": {"type": ["string", "null"]},
            "family_friendly": {"type": ["boolean", "null"]},
            "confidence": {"type": "number"}
        },
        "required": []
    })
}

#[derive(Debug, Deserialize, Default)]
struct RawFilters {
    destination: Option<String>,
    category: Option<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    duration_days: Option<u32>,
    transport_type: Option<String>,
    travel_month: Option<String>,
    family_friendly: Option<bool>,
    #[serde(default)]
    confidence: f32,
}

/// Canonicalizes the destination via the gazetteer, coerces enum strings, and
/// collapses an explicit `price_max` into a `price_range` bucket.
fn raw_to_filters(raw: RawFilters) -> StructuredFilters {
    let destination = raw
        .destination
        .as_deref()
        .and_then(gazetteer::canonical_destination)
        .map(str::to_string)
        .or(raw.destination);

    let mut filters = StructuredFilters {
        destination,
        category: raw.category.as_deref().and_then(Category::parse),
        price_range: None,
        price_min: raw.price_min,
        price_max: raw.price_max,
        duration_days: raw.duration_days,
        transport_type: raw.transport_type.as_deref().and_then(TransportType::parse),
        travel_month: raw.travel_month.as_deref().and_then(Month::parse),
        family_friendly: raw.family_friendly,
    };
    if let Some(max) = filters.price_max {
        filters.price_range = Some(PriceRange::from_price_max(max));
    }
    filters
}

/// Parses explicit filters from `rewritten`, canonicalizes them, and overlays
/// them onto the rewriter's implicit (context-derived) filters. On any
/// completion or parse failure, falls through to the implicit filters alone
/// with zero confidence — equivalent to the model having produced "all
/// absent".
#[instrument(skip(completion, rewritten))]
pub async fn parse_filters(
    completion: &dyn ChatCompletionProvider,
    rewritten: &RewrittenQuery,
) -> (StructuredFilters, f32) {
    let request = CompletionRequest {
        system: SELF_QUERY_SYSTEM_PROMPT.to_string(),
        user: rewritten.text.clone(),
        json_schema: Some(schema()),
    };

    let response = match completion.complete(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "self-query parse failed, using implicit filters only");
            return (rewritten.implicit_filters.clone(), 0.0);
        }
    };

    match serde_json::from_str::<RawFilters>(&response) {
        Ok(parsed) => {
            let confidence = parsed.confidence.clamp(0.0, 1.0);
            let explicit = raw_to_filters(parsed);
            let merged = StructuredFilters::merge_explicit_over_implicit(rewritten.implicit_filters.clone(), explicit);
            (merged, confidence)
        }
        Err(err) => {
            warn!(error = %err, "self-query response failed validation, treating as all-absent");
            (rewritten.implicit_filters.clone(), 0.0)
        }
    }
}
