//! Resolves pronouns and completes elided noun phrases using session state,
//! without changing the utterance's intent, and seeds implicit filters from
//! the session's `ActiveEntityView`.

use tracing::{instrument, warn};

use crate::gazetteer;
use crate::providers::{ChatCompletionProvider, CompletionRequest};
use crate::types::filters::{RewrittenQuery, StructuredFilters};
use crate::types::metadata::{Category, Month, TransportType};
use crate::types::session::{ActiveEntityView, EntityKind, Turn};

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite a user's latest message into a self-contained \
query, resolving pronouns and filling in elided details using the conversation context provided. \
Preserve the user's language (primarily Serbian) and intent exactly — add nothing the context \
doesn't support. Return only the rewritten message text, with no extra commentary.";

fn render_turns(recent_turns: &[Turn]) -> String {
    recent_turns
        .iter()
        .map(|turn| {
            let sources = turn
                .cited_sources
                .iter()
                .map(|s| s.document_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "User: {}\nAssistant: {}\nCited sources: {}",
                turn.user_utterance, turn.assistant_response, sources
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn render_active_view(active_view: &ActiveEntityView) -> String {
    if active_view.active.is_empty() {
        return "(none)".to_string();
    }
    active_view
        .active
        .iter()
        .map(|(kind, value)| format!("{kind:?}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the `implicit_filters` entry for a rewrite: every active-view field
/// that maps onto a `StructuredFilters` field, tagged implicit by
/// construction (the rewriter never treats these as explicit). When
/// `exclude_destination` is set (a context switch was detected), the active
/// destination is dropped while budget/date/other fields are preserved.
pub(crate) fn implicit_filters_from_active_view(active_view: &ActiveEntityView, exclude_destination: bool) -> StructuredFilters {
    let mut filters = StructuredFilters::default();

    if !exclude_destination {
        filters.destination = active_view.get(EntityKind::Destination).map(str::to_string);
    }

    if let Some(raw_month) = active_view.get(EntityKind::TravelDates) {
        filters.travel_month = Month::parse(raw_month);
    }

    if let Some(raw_budget) = active_view.get(EntityKind::Budget) {
        let digits: String = raw_budget.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        if let Ok(amount) = digits.parse::<f64>() {
            filters.price_max = Some(amount);
        }
    }

    if let Some(raw_group) = active_view.get(EntityKind::GroupComposition) {
        if raw_group.contains("kids") || raw_group.contains("family") {
            filters.family_friendly = Some(true);
        }
    }

    if let Some(raw_transport) = active_view.get(EntityKind::Transport) {
        filters.transport_type = TransportType::parse(raw_transport);
    }

    if let Some(raw_activity) = active_view.get(EntityKind::Activities) {
        if raw_activity.contains("letovanj") || raw_activity.contains("tura") || raw_activity.contains("aranzman") {
            filters.category = Some(Category::Tour);
        }
    } else if let Some(raw_accommodation) = active_view.get(EntityKind::Accommodation) {
        if raw_accommodation.contains("hotel") {
            filters.category = Some(Category::Hotel);
        }
    }

    filters
}

/// Rewrites `utterance` into a self-contained query. Detects a context
/// switch deterministically (a gazetteer destination mention different from
/// the active one) rather than relying on the LLM for that signal. Fails
/// closed on any completion error: returns the original utterance with empty
/// implicit filters.
#[instrument(skip(completion, utterance, recent_turns, active_view))]
pub async fn rewrite(
    completion: &dyn ChatCompletionProvider,
    utterance: &str,
    recent_turns: &[Turn],
    active_view: &ActiveEntityView,
) -> RewrittenQuery {
    let context_switch_detected = gazetteer::find_destination_mention(utterance).is_some_and(|mentioned| {
        active_view
            .get(EntityKind::Destination)
            .is_some_and(|active| active != mentioned)
    });

    let implicit_filters = implicit_filters_from_active_view(active_view, context_switch_detected);

    if recent_turns.is_empty() && active_view.active.is_empty() {
        return RewrittenQuery {
            text: utterance.to_string(),
            implicit_filters,
            context_switch_detected,
        };
    }

    let prompt = format!(
        "Recent conversation:\n{}\n\nActive context: {}\n\nLatest user message: {}",
        render_turns(recent_turns),
        render_active_view(active_view),
        utterance
    );
    let request = CompletionRequest {
        system: REWRITE_SYSTEM_PROMPT.to_string(),
        user: prompt,
        json_schema: None,
    };

    match completion.complete(request).await {
        Ok(text) => RewrittenQuery {
            text: text.trim().to_string(),
            implicit_filters,
            context_switch_detected,
        },
        Err(err) => {
            warn!(error = %err, "context-aware rewrite failed, falling back to the raw utterance");
            RewrittenQuery {
                text: utterance.to_string(),
                implicit_filters: StructuredFilters::default(),
                context_switch_detected,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{FailingCompletionProvider, MockCompletionProvider};
    use chrono::Utc;

    fn turn_with_source(user: &str, assistant: &str, document: &str) -> Turn {
        Turn {
            message_id: "m1".to_string(),
            user_utterance: user.to_string(),
            assistant_response: assistant.to_string(),
            extracted_entities: Vec::new(),
            cited_sources: vec![crate::types::answer::SourceCitation {
                document_name: document.to_string(),
                similarity: 0.8,
                snippet: "...".to_string(),
            }],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn context_switch_is_detected_on_new_destination_mention() {
        let mut active_view = ActiveEntityView::default();
        active_view.set(EntityKind::Destination, "Rim".to_string());
        let provider = MockCompletionProvider::with_default("A što sa Parizom?".to_string());

        let rewritten = rewrite(&provider, "A što sa Parizom?", &[], &active_view).await;
        assert!(rewritten.context_switch_detected);
        assert_eq!(rewritten.implicit_filters.destination, None);
    }

    #[tokio::test]
    async fn sticky_budget_survives_a_destination_context_switch() {
        let mut active_view = ActiveEntityView::default();
        active_view.set(EntityKind::Destination, "Rim".to_string());
        active_view.set(EntityKind::Budget, "300 eur".to_string());
        let provider = MockCompletionProvider::with_default("A što sa Parizom?".to_string());

        let rewritten = rewrite(&provider, "A što sa Parizom?", &[], &active_view).await;
        assert_eq!(rewritten.implicit_filters.price_max, Some(300.0));
        assert_eq!(rewritten.implicit_filters.destination, None);
    }

    #[tokio::test]
    async fn failed_rewrite_falls_back_to_raw_utterance_with_empty_filters() {
        let mut active_view = ActiveEntityView::default();
        active_view.set(EntityKind::Destination, "Rim".to_string());
        let provider = FailingCompletionProvider;

        let rewritten = rewrite(&provider, "Koliko košta?", &[turn_with_source("a", "b", "c")], &active_view).await;
        assert_eq!(rewritten.text, "Koliko košta?");
        assert!(rewritten.implicit_filters.is_empty());
    }

    #[tokio::test]
    async fn implicit_filters_carry_active_destination_without_switch() {
        let mut active_view = ActiveEntityView::default();
        active_view.set(EntityKind::Destination, "Rim".to_string());
        let provider = MockCompletionProvider::with_default("Koliko košta u Rimu?".to_string());

        let rewritten = rewrite(&provider, "Koliko košta?", &[], &active_view).await;
        assert_eq!(rewritten.implicit_filters.destination.as_deref(), Some("Rim"));
        assert!(!rewritten.context_switch_detected);
    }
}
