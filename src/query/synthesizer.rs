//! Prompt-engineers a grounded answer from ranked candidates, with citations,
//! follow-up suggestions, and graceful degradation on completion failure.
//! Never lets the model introduce facts outside the retrieved context.

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{instrument, warn};

use crate::error::SynthesisError;
use crate::providers::{ChatCompletionProvider, CompletionRequest};
use crate::types::answer::{Answer, ScoredChunk, SourceCitation};
use crate::types::filters::StructuredFilters;
use crate::types::session::ActiveEntityView;

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a tourism assistant answering in the user's \
language, primarily Serbian, in a concise conversational tone. You are given labeled context \
blocks, each tagged with its source document. Answer strictly from this context — never \
introduce a fact the context does not support. If the context is insufficient, say so plainly \
and you may ask a clarifying question. End your answer with 2-4 suggested follow-up questions, \
each on its own line starting with '- '.";

fn build_context_blocks(candidates: &[ScoredChunk]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] Source: {}\n{}", i + 1, c.chunk.source_document, c.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_user_prompt(rewritten_text: &str, candidates: &[ScoredChunk], active_view: &ActiveEntityView) -> String {
    let active = if active_view.active.is_empty() {
        "(none)".to_string()
    } else {
        active_view
            .active
            .iter()
            .map(|(k, v)| format!("{k:?}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Conversation context: {active}\n\nRetrieved context blocks:\n{}\n\nUser question: {rewritten_text}",
        build_context_blocks(candidates)
    )
}

fn split_answer_and_followups(raw: &str) -> (String, Vec<String>) {
    let mut answer_lines = Vec::new();
    let mut followups = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(question) = trimmed.strip_prefix("- ") {
            followups.push(question.trim().to_string());
        } else if !trimmed.is_empty() {
            answer_lines.push(line);
        }
    }
    (answer_lines.join("\n").trim().to_string(), followups)
}

/// Citations deduplicated by document name, preserving first-occurrence
/// order, restricted to chunks that were actually in `candidates`.
fn citations_from(candidates: &[ScoredChunk]) -> Vec<SourceCitation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations = Vec::new();
    for candidate in candidates {
        if seen.insert(candidate.chunk.source_document.clone()) {
            citations.push(SourceCitation {
                document_name: candidate.chunk.source_document.clone(),
                similarity: candidate.adjusted_score,
                snippet: candidate.chunk.text.chars().take(240).collect(),
            });
        }
    }
    citations
}

/// Average similarity of the cited (deduplicated) chunks, clipped to `[0, 1]`
/// — computed over `citations`, not the raw candidate list, so confidence
/// always matches what the caller is actually shown.
fn confidence_from(citations: &[SourceCitation]) -> f32 {
    if citations.is_empty() {
        return 0.0;
    }
    let sum: f32 = citations.iter().map(|c| c.similarity).sum();
    (sum / citations.len() as f32).clamp(0.0, 1.0)
}

/// Synthesizes a batch answer from `candidates`. On a completion failure,
/// returns [`Answer::apology`] with no citations and zero confidence — the
/// user never sees a raw error.
#[instrument(skip(completion, rewritten_text, candidates, active_view, applied_filters))]
pub async fn synthesize(
    completion: &dyn ChatCompletionProvider,
    rewritten_text: &str,
    candidates: &[ScoredChunk],
    active_view: &ActiveEntityView,
    applied_filters: StructuredFilters,
) -> Answer {
    let request = CompletionRequest {
        system: SYNTHESIS_SYSTEM_PROMPT.to_string(),
        user: build_user_prompt(rewritten_text, candidates, active_view),
        json_schema: None,
    };

    match completion.complete(request).await {
        Ok(raw) => {
            let (text, suggested_followups) = split_answer_and_followups(&raw);
            let citations = citations_from(candidates);
            let confidence = confidence_from(&citations);
            Answer {
                text,
                citations,
                suggested_followups,
                applied_filters,
                confidence,
            }
        }
        Err(err) => {
            warn!(error = %err, "answer synthesis failed, returning a graceful apology");
            Answer::apology(
                "Izvinjavam se, trenutno ne mogu da generišem odgovor. Molim pokušajte ponovo.",
                applied_filters,
            )
        }
    }
}

/// One event of the streaming synthesis interface: incremental text, or a
/// terminal completion/error carrying the same metadata a batch call would
/// return.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    Content(String),
    Complete {
        citations: Vec<SourceCitation>,
        suggested_followups: Vec<String>,
        confidence: f32,
        total_chunks: usize,
        response_length: usize,
    },
    Error(String),
}

/// Streaming variant of [`synthesize`]: forwards tokens as they arrive, then
/// emits exactly one terminal `Complete` or `Error` event.
#[instrument(skip(completion, rewritten_text, candidates, active_view))]
pub async fn synthesize_stream(
    completion: &dyn ChatCompletionProvider,
    rewritten_text: &str,
    candidates: Vec<ScoredChunk>,
    active_view: &ActiveEntityView,
) -> Result<BoxStream<'static, SynthesisEvent>, SynthesisError> {
    let request = CompletionRequest {
        system: SYNTHESIS_SYSTEM_PROMPT.to_string(),
        user: build_user_prompt(rewritten_text, &candidates, active_view),
        json_schema: None,
    };

    let token_stream = completion.complete_stream(request).await?;
    let citations = citations_from(&candidates);
    let confidence = confidence_from(&citations);
    let total_chunks = candidates.len();
    let response_length = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let response_length_writer = response_length.clone();

    let events = token_stream.map(move |token_result| match token_result {
        Ok(token) => {
            response_length_writer.fetch_add(token.chars().count(), std::sync::atomic::Ordering::Relaxed);
            SynthesisEvent::Content(token)
        }
        Err(err) => SynthesisEvent::Error(err.to_string()),
    });

    let terminal = futures::stream::once(async move {
        SynthesisEvent::Complete {
            citations,
            suggested_followups: Vec::new(),
            confidence,
            total_chunks,
            response_length: response_length.load(std::sync::atomic::Ordering::Relaxed),
        }
    });

    Ok(Box::pin(events.chain(terminal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{FailingCompletionProvider, MockCompletionProvider};
    use crate::types::chunk::Chunk;
    use crate::types::metadata::EnrichedMetadata;

    fn candidate(source_document: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(source_document, 0, "Offer text", EnrichedMetadata::absent()),
            raw_similarity: score,
            adjusted_score: score,
            penalty_trace: Vec::new(),
        }
    }

    #[tokio::test]
    async fn successful_synthesis_splits_followups_from_answer_text() {
        let response = "Možete naći hotel u Rimu za 450 EUR.\n- Da li želite jeftiniju opciju?\n- Da li vas zanima avgust?";
        let provider = MockCompletionProvider::with_default(response.to_string());
        let candidates = vec![candidate("rim.pdf", 0.8)];
        let answer = synthesize(&provider, "Koliko košta hotel u Rimu?", &candidates, &ActiveEntityView::default(), StructuredFilters::default()).await;

        assert!(answer.text.contains("450 EUR"));
        assert_eq!(answer.suggested_followups.len(), 2);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.confidence, 0.8);
    }

    #[tokio::test]
    async fn citations_are_deduplicated_by_document_preserving_first_occurrence() {
        let response = "Evo odgovora.";
        let provider = MockCompletionProvider::with_default(response.to_string());
        let candidates = vec![candidate("rim.pdf", 0.9), candidate("rim.pdf", 0.5), candidate("pariz.pdf", 0.7)];
        let answer = synthesize(&provider, "q", &candidates, &ActiveEntityView::default(), StructuredFilters::default()).await;
        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.citations[0].document_name, "rim.pdf");
        assert_eq!(answer.citations[0].similarity, 0.9);
    }

    #[tokio::test]
    async fn failed_completion_returns_a_graceful_apology() {
        let provider = FailingCompletionProvider;
        let candidates = vec![candidate("rim.pdf", 0.8)];
        let answer = synthesize(&provider, "q", &candidates, &ActiveEntityView::default(), StructuredFilters::default()).await;
        assert!(answer.citations.is_empty());
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn no_candidates_yields_zero_confidence() {
        let provider = MockCompletionProvider::with_default("Nemam informacija o tome.".to_string());
        let answer = synthesize(&provider, "q", &[], &ActiveEntityView::default(), StructuredFilters::default()).await;
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn confidence_is_averaged_over_deduplicated_citations_not_raw_candidates() {
        let response = "Evo odgovora.";
        let provider = MockCompletionProvider::with_default(response.to_string());
        // Two candidates from the same document (a realistic over-fetch result) plus one other;
        // confidence must average the two *citations* (rim.pdf, pariz.pdf), not all three candidates.
        let candidates = vec![candidate("rim.pdf", 1.0), candidate("rim.pdf", 0.0), candidate("pariz.pdf", 0.5)];
        let answer = synthesize(&provider, "q", &candidates, &ActiveEntityView::default(), StructuredFilters::default()).await;
        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.confidence, 0.75);
    }

    #[tokio::test]
    async fn streaming_terminal_event_carries_chunk_count_and_response_length() {
        let provider = MockCompletionProvider::with_default("Evo odgovora.".to_string());
        let candidates = vec![candidate("rim.pdf", 0.8), candidate("rim.pdf", 0.6)];
        let stream = synthesize_stream(&provider, "q", candidates, &ActiveEntityView::default())
            .await
            .unwrap();
        let events: Vec<SynthesisEvent> = stream.collect().await;
        let terminal = events.last().expect("stream must end with a terminal event");
        match terminal {
            SynthesisEvent::Complete {
                total_chunks,
                response_length,
                ..
            } => {
                assert_eq!(*total_chunks, 2);
                assert_eq!(*response_length, "Evo odgovora.".chars().count());
            }
            other => panic!("expected a Complete event, got {other:?}"),
        }
    }
}
