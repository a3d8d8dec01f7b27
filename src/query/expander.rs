//! Widens a rewritten query with tourism-domain synonyms before it is used
//! as embedding input, bounded to a term limit and validated against a
//! stop-list of off-topic vocabulary. Results are cached process-wide, keyed
//! by the original query text.

use tracing::{instrument, warn};

use crate::cache::ExpansionCache;
use crate::providers::{ChatCompletionProvider, CompletionRequest};

const EXPANSION_SYSTEM_PROMPT: &str = "Given a Serbian or English tourism query, produce a widened \
search phrase that adds close synonyms: accommodation types, transport modes, activity \
categories, and regional name variants (e.g. Rim/Roma/Rome). Stay strictly within tourism \
vocabulary. Return only the widened phrase, at most 10-12 words total, with no extra commentary.";

/// Off-topic markers that disqualify an expansion; a hit falls back to the
/// original query rather than polluting the embedding with unrelated terms.
const STOP_LIST: &[&str] = &["politik", "fudbal", "sport", "vreme danas", "berza", "izbori", "rat"];

fn is_valid_expansion(text: &str, term_limit: usize) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let terms: Vec<&str> = text.split_whitespace().collect();
    if terms.len() > term_limit {
        return false;
    }
    let lower = text.to_lowercase();
    !STOP_LIST.iter().any(|word| lower.contains(word))
}

/// Expands `query` into a semantically widened embedding-input string.
/// Falls back to the original query when the cache misses and the LLM call
/// fails, returns an empty result, exceeds `term_limit`, or contains
/// off-topic vocabulary.
#[instrument(skip(completion, cache, query))]
pub async fn expand_query(
    completion: &dyn ChatCompletionProvider,
    cache: &ExpansionCache,
    query: &str,
    term_limit: usize,
) -> String {
    if let Some(cached) = cache.get(&query.to_string()) {
        return cached;
    }

    let request = CompletionRequest {
        system: EXPANSION_SYSTEM_PROMPT.to_string(),
        user: query.to_string(),
        json_schema: None,
    };

    let expanded = match completion.complete(request).await {
        Ok(text) => {
            let trimmed = text.trim().to_string();
            if is_valid_expansion(&trimmed, term_limit) {
                trimmed
            } else {
                warn!(query, "query expansion rejected, falling back to the original query");
                query.to_string()
            }
        }
        Err(err) => {
            warn!(error = %err, "query expansion failed, falling back to the original query");
            query.to_string()
        }
    };

    cache.put(query.to_string(), expanded.clone());
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{FailingCompletionProvider, MockCompletionProvider};

    #[tokio::test]
    async fn valid_expansion_is_returned_and_cached() {
        let provider = MockCompletionProvider::with_default("hotel smeštaj apartman Rim Roma".to_string());
        let cache = ExpansionCache::new(10);
        let expanded = expand_query(&provider, &cache, "hotel u Rimu", 12).await;
        assert_eq!(expanded, "hotel smeštaj apartman Rim Roma");
        assert_eq!(cache.get(&"hotel u Rimu".to_string()).as_deref(), Some("hotel smeštaj apartman Rim Roma"));
    }

    #[tokio::test]
    async fn expansion_exceeding_term_limit_falls_back_to_original() {
        let long_expansion = (0..20).map(|i| format!("term{i}")).collect::<Vec<_>>().join(" ");
        let provider = MockCompletionProvider::with_default(long_expansion);
        let cache = ExpansionCache::new(10);
        let expanded = expand_query(&provider, &cache, "original query", 12).await;
        assert_eq!(expanded, "original query");
    }

    #[tokio::test]
    async fn off_topic_expansion_falls_back_to_original() {
        let provider = MockCompletionProvider::with_default("najnovije vesti o izborima i politici".to_string());
        let cache = ExpansionCache::new(10);
        let expanded = expand_query(&provider, &cache, "original query", 12).await;
        assert_eq!(expanded, "original query");
    }

    #[tokio::test]
    async fn failed_completion_falls_back_to_original() {
        let provider = FailingCompletionProvider;
        let cache = ExpansionCache::new(10);
        let expanded = expand_query(&provider, &cache, "original query", 12).await;
        assert_eq!(expanded, "original query");
    }

    #[tokio::test]
    async fn cache_hit_avoids_a_second_completion_call() {
        let provider = MockCompletionProvider::with_default("widened phrase here".to_string());
        let cache = ExpansionCache::new(10);
        expand_query(&provider, &cache, "query", 12).await;
        let second = expand_query(&provider, &cache, "query", 12).await;
        assert_eq!(second, "widened phrase here");
        assert_eq!(cache.hits(), 1);
    }
}
