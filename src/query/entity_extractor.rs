//! Two-stage entity extraction from a single user utterance: fast rule-based
//! patterns first, then an LLM pass over what the rules missed. Rule-based
//! results always win on a kind conflict — the model is asked only to fill
//! gaps, never to override an exact match.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::error::QueryUnderstandingError;
use crate::gazetteer;
use crate::providers::{ChatCompletionProvider, CompletionRequest};
use crate::types::metadata::Month;
use crate::types::session::{ActiveEntityView, EntityKind, ExtractedEntity};

const ENTITY_SYSTEM_PROMPT: &str = "You extract tourism-related entities from a single Serbian or \
English user message. Return a strict JSON array of objects with fields `kind` (one of: \
destination, budget, travel_dates, group_composition, accommodation, transport, activities, \
preference), `value` (a short string copied or closely paraphrased from the message), and \
`confidence` (0 to 1). Never invent a value that is not supported by the text. If nothing \
applies, return an empty array.";

static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d.,]*)\s*(eur|eura|evra|din|rsd|dinara|usd|dolara|\$|€)").expect("valid regex")
});

const GROUP_KEYWORDS: &[(&str, &str)] = &[
    ("porodic", "family"),
    ("dec", "kids"),
    ("deč", "kids"),
    ("par", "couple"),
    ("sam", "solo"),
    ("grup", "group"),
];

const ACCOMMODATION_KEYWORDS: &[&str] = &["hotel", "hostel", "apartman", "vila", "resort", "kamp"];

const TRANSPORT_KEYWORDS: &[(&str, &str)] = &[
    ("avion", "air"),
    ("let", "air"),
    ("autobus", "bus"),
    ("bus", "bus"),
    ("auto", "car"),
    ("kola", "car"),
    ("voz", "train"),
    ("train", "train"),
];

const ACTIVITY_KEYWORDS: &[&str] = &["aranžman", "aranzman", "izlet", "tura", "letovanj", "zimovanj", "atrakcij"];

/// Fast regex/gazetteer entity extraction, run before any LLM call.
fn rule_based_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();
    let lower = text.to_lowercase();

    if let Some(destination) = gazetteer::find_destination_mention(text) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Destination,
            value: destination.to_string(),
            confidence: 0.95,
        });
    }

    if let Some(captures) = BUDGET_RE.captures(text) {
        let amount = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let currency = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        entities.push(ExtractedEntity {
            kind: EntityKind::Budget,
            value: format!("{amount} {currency}"),
            confidence: 0.9,
        });
    }

    if let Some(month) = lower.split_whitespace().find_map(Month::parse) {
        entities.push(ExtractedEntity {
            kind: EntityKind::TravelDates,
            value: format!("{month:?}").to_lowercase(),
            confidence: 0.9,
        });
    }

    if let Some((_, label)) = GROUP_KEYWORDS.iter().find(|(needle, _)| lower.contains(needle)) {
        entities.push(ExtractedEntity {
            kind: EntityKind::GroupComposition,
            value: label.to_string(),
            confidence: 0.75,
        });
    }

    if let Some(keyword) = ACCOMMODATION_KEYWORDS.iter().find(|needle| lower.contains(*needle)) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Accommodation,
            value: keyword.to_string(),
            confidence: 0.7,
        });
    }

    if let Some((_, label)) = TRANSPORT_KEYWORDS.iter().find(|(needle, _)| lower.contains(needle)) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Transport,
            value: label.to_string(),
            confidence: 0.7,
        });
    }

    if let Some(keyword) = ACTIVITY_KEYWORDS.iter().find(|needle| lower.contains(*needle)) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Activities,
            value: keyword.to_string(),
            confidence: 0.7,
        });
    }

    entities
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    kind: String,
    value: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_kind(raw: &str) -> Option<EntityKind> {
    match raw {
        "destination" => Some(EntityKind::Destination),
        "budget" => Some(EntityKind::Budget),
        "travel_dates" => Some(EntityKind::TravelDates),
        "group_composition" => Some(EntityKind::GroupComposition),
        "accommodation" => Some(EntityKind::Accommodation),
        "transport" => Some(EntityKind::Transport),
        "activities" => Some(EntityKind::Activities),
        "preference" => Some(EntityKind::Preference),
        _ => None,
    }
}

async fn llm_entities(
    completion: &dyn ChatCompletionProvider,
    text: &str,
) -> Result<Vec<ExtractedEntity>, QueryUnderstandingError> {
    let request = CompletionRequest {
        system: ENTITY_SYSTEM_PROMPT.to_string(),
        user: text.to_string(),
        json_schema: Some(serde_json::json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "kind": {"type": "string"},
                    "value": {"type": "string"},
                    "confidence": {"type": "number"}
                },
                "required": ["kind", "value"]
            }
        })),
    };
    let response = completion
        .complete(request)
        .await
        .map_err(|err| QueryUnderstandingError::EntityExtraction(err.to_string()))?;
    let raw: Vec<RawEntity> =
        serde_json::from_str(&response).map_err(|err| QueryUnderstandingError::EntityExtraction(err.to_string()))?;

    Ok(raw
        .into_iter()
        .filter_map(|entity| {
            parse_kind(&entity.kind).map(|kind| ExtractedEntity {
                kind,
                value: entity.value,
                confidence: entity.confidence.clamp(0.0, 1.0),
            })
        })
        .collect())
}

/// Extracts entities from `text`: rules first, then an LLM pass restricted to
/// kinds the rules didn't already find. A failed or malformed LLM call is
/// logged and treated as "no additional entities" rather than failing the
/// whole extraction.
#[instrument(skip(completion, text, _active_view))]
pub async fn extract_entities(
    completion: &dyn ChatCompletionProvider,
    text: &str,
    _active_view: &ActiveEntityView,
) -> Vec<ExtractedEntity> {
    let rule_entities = rule_based_entities(text);
    let rule_kinds: std::collections::HashSet<EntityKind> = rule_entities.iter().map(|e| e.kind).collect();

    let llm_fallback = match llm_entities(completion, text).await {
        Ok(entities) => entities,
        Err(err) => {
            warn!(error = %err, "llm entity extraction failed, using rule-based entities only");
            Vec::new()
        }
    };

    let mut merged = rule_entities;
    merged.extend(llm_fallback.into_iter().filter(|e| !rule_kinds.contains(&e.kind)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockCompletionProvider;

    #[tokio::test]
    async fn rule_based_destination_wins_over_llm_conflict() {
        let provider = MockCompletionProvider::with_default(
            serde_json::json!([{"kind": "destination", "value": "Pariz", "confidence": 0.5}]).to_string(),
        );
        let entities = extract_entities(&provider, "Tražim hotel u Rimu", &ActiveEntityView::default()).await;
        let destination = entities.iter().find(|e| e.kind == EntityKind::Destination).unwrap();
        assert_eq!(destination.value, "Rim");
    }

    #[tokio::test]
    async fn budget_amount_is_extracted() {
        let provider = MockCompletionProvider::with_default("[]".to_string());
        let entities = extract_entities(&provider, "Budžet mi je oko 500 EUR", &ActiveEntityView::default()).await;
        let budget = entities.iter().find(|e| e.kind == EntityKind::Budget).unwrap();
        assert!(budget.value.contains("500"));
    }

    #[tokio::test]
    async fn month_mention_is_extracted() {
        let provider = MockCompletionProvider::with_default("[]".to_string());
        let entities = extract_entities(&provider, "Planiram put u avgustu", &ActiveEntityView::default()).await;
        assert!(entities.iter().any(|e| e.kind == EntityKind::TravelDates));
    }

    #[tokio::test]
    async fn llm_fills_gaps_rules_do_not_cover() {
        let provider = MockCompletionProvider::with_default(
            serde_json::json!([{"kind": "preference", "value": "romantic getaway", "confidence": 0.8}]).to_string(),
        );
        let entities = extract_entities(&provider, "Želim nešto romantično", &ActiveEntityView::default()).await;
        assert!(entities.iter().any(|e| e.kind == EntityKind::Preference));
    }
}
