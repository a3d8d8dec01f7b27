//! End-to-end scenarios against the public [`vodic_rag::RagPipeline`] surface,
//! with every external collaborator mocked. Each test corresponds to one of
//! the literal conversational scenarios the pipeline is built to handle.

use std::sync::Arc;

use vodic_rag::config::PipelineConfig;
use vodic_rag::pipeline::RagPipeline;
use vodic_rag::providers::mock::{InMemoryVectorStore, MockCompletionProvider, MockEmbeddingProvider, MockPdfExtractor};
use vodic_rag::providers::ExtractedBlock;
use vodic_rag::types::{Category, Month, PriceRange};

fn build_pipeline(dir: &std::path::Path, responses: Vec<String>) -> RagPipeline {
    RagPipeline::new(
        PipelineConfig::default(),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(MockEmbeddingProvider::new()),
        Arc::new(MockCompletionProvider::with_scripted_responses(responses)),
        Arc::new(MockPdfExtractor::new(Vec::new())),
        dir.join("sessions"),
        dir.join("ingestion_state.json"),
    )
}

fn block(text: &str) -> ExtractedBlock {
    ExtractedBlock {
        page: 0,
        text: text.to_string(),
        tables: Vec::new(),
    }
}

#[tokio::test]
async fn destination_month_budget_query_resolves_expected_filters() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        // ingestion: enrichment for the one chunk
        serde_json::json!({
            "destination": "Amsterdam",
            "category": "tour",
            "price_max": 480.0,
            "travel_month": "maj",
            "confidence_score": 0.9
        })
        .to_string(),
        // query: entity extraction llm pass (rules already cover everything)
        "[]".to_string(),
        // query: self-query explicit filters
        serde_json::json!({
            "destination": "Amsterdam",
            "travel_month": "maj",
            "price_max": 500.0,
            "confidence": 0.9
        })
        .to_string(),
        // query: expansion
        "aranžman Amsterdam maj smeštaj porodično".to_string(),
        // query: synthesis
        "Imamo aranžman za Amsterdam u maju do 500 EUR.\n- Da li želite direktan let?\n- Da li vas zanima produženi boravak?"
            .to_string(),
    ];
    let pipeline = build_pipeline(dir.path(), responses);

    pipeline
        .ingest_blocks("amsterdam_aranzman.pdf", &[block("Nedelju dana u Amsterdamu, maj, sve uključeno.")])
        .await
        .unwrap();

    let answer = pipeline
        .query("s1", "Daj mi neki aranžman za Amsterdam u maju, budžet oko 500 EUR.")
        .await
        .unwrap();

    assert_eq!(answer.applied_filters.destination.as_deref(), Some("Amsterdam"));
    assert_eq!(answer.applied_filters.travel_month, Some(Month::May));
    assert_eq!(answer.applied_filters.price_max, Some(500.0));
    assert_eq!(answer.applied_filters.price_range, Some(PriceRange::Moderate));
    assert!(!answer.citations.is_empty());
    assert!(answer.citations[0].document_name.contains("amsterdam"));
}

#[tokio::test]
async fn pronoun_turn_inherits_the_active_destination_filter() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        // turn 1 (empty session: rewrite short-circuits, no LLM call for it)
        "[]".to_string(),
        serde_json::json!({"confidence": 0.0}).to_string(),
        "hotel smeštaj Rim".to_string(),
        "Evo hotela u Rimu.\n- Da li želite jeftiniju opciju?".to_string(),
        // turn 2 (non-empty session: rewrite now runs)
        "Koliko košta hotel u Rimu?".to_string(),
        "[]".to_string(),
        serde_json::json!({"confidence": 0.0}).to_string(),
        "cena hotel Rim".to_string(),
        "Cena zavisi od termina.\n- Da li vas zanima avgust?".to_string(),
    ];
    let pipeline = build_pipeline(dir.path(), responses);

    pipeline.query("s1", "Tražim hotel u Rimu.").await.unwrap();
    let after_turn1 = pipeline.active_filters("s1").await.unwrap();
    assert_eq!(after_turn1.destination.as_deref(), Some("Rim"));

    pipeline.query("s1", "Koliko košta?").await.unwrap();
    let after_turn2 = pipeline.active_filters("s1").await.unwrap();
    assert_eq!(after_turn2.destination.as_deref(), Some("Rim"));
}

#[tokio::test]
async fn context_switch_replaces_destination_but_keeps_sticky_budget() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        // turn 1 (empty session)
        "[]".to_string(),
        serde_json::json!({"confidence": 0.0}).to_string(),
        "budžet Rim 300".to_string(),
        "Beležim budžet od 300 EUR za Rim.\n- Kada planirate put?".to_string(),
        // turn 2 (non-empty session)
        "A što sa Parizom?".to_string(),
        "[]".to_string(),
        serde_json::json!({"destination": "Pariz", "confidence": 0.9}).to_string(),
        "Pariz ponuda".to_string(),
        "Evo ponuda za Pariz.\n- Da li i dalje važi budžet od 300 EUR?".to_string(),
    ];
    let pipeline = build_pipeline(dir.path(), responses);

    pipeline.query("s1", "Budžet mi je oko 300 EUR za Rim.").await.unwrap();
    let answer = pipeline.query("s1", "A što sa Parizom?").await.unwrap();

    assert_eq!(answer.applied_filters.destination.as_deref(), Some("Pariz"));
    assert_eq!(answer.applied_filters.price_max, Some(300.0));

    let active = pipeline.active_filters("s1").await.unwrap();
    assert_eq!(active.destination.as_deref(), Some("Pariz"));
    assert_eq!(active.price_max, Some(300.0));
}

#[tokio::test]
async fn seasonal_only_query_resolves_month_and_category_without_a_destination() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        "[]".to_string(),
        serde_json::json!({
            "travel_month": "avgust",
            "category": "tour",
            "confidence": 0.85
        })
        .to_string(),
        "letovanje avgust more".to_string(),
        "Evo letovanja u avgustu.\n- Da li vas zanima konkretna destinacija?".to_string(),
    ];
    let pipeline = build_pipeline(dir.path(), responses);

    let answer = pipeline.query("s1", "koja letovanja imaš u avgustu").await.unwrap();

    assert_eq!(answer.applied_filters.destination, None);
    assert_eq!(answer.applied_filters.travel_month, Some(Month::August));
    assert_eq!(answer.applied_filters.category, Some(Category::Tour));
}

#[tokio::test]
async fn no_matching_offers_yields_an_honest_empty_answer() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        "[]".to_string(),
        serde_json::json!({"destination": "Antarktik", "confidence": 0.3}).to_string(),
        "izlet Antarktik januar".to_string(),
        "Nažalost nemam informacija o ponudama za Antarktik u januaru. Mogu da predložim druge destinacije.\n- Da li vas zanima neka druga destinacija?".to_string(),
    ];
    let pipeline = build_pipeline(dir.path(), responses);

    let answer = pipeline.query("s1", "Koliko košta izlet u Antarktik u januaru?").await.unwrap();

    assert!(answer.citations.is_empty());
    assert_eq!(answer.confidence, 0.0);
    assert!(answer.text.to_lowercase().contains("nemam informacija"));
}

#[tokio::test]
async fn reingesting_the_same_document_through_the_pipeline_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![serde_json::json!({"destination": "Rim", "confidence_score": 0.8}).to_string()];
    let pipeline = build_pipeline(dir.path(), responses);

    let blocks = [block("Hotel u Rimu, pet noćenja.")];
    let first = pipeline.ingest_blocks("rim.pdf", &blocks).await.unwrap();
    let second = pipeline.ingest_blocks("rim.pdf", &blocks).await.unwrap();

    assert_eq!(first.chunks_indexed, 1);
    assert!(!first.already_processed);
    assert!(second.already_processed);
    assert_eq!(second.chunks_indexed, 0);
}

#[tokio::test]
async fn janitor_sweep_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(dir.path(), Vec::new());

    pipeline.create_session("client", None).await.unwrap();
    let session_dir = dir.path().join("sessions");

    let first_pass = pipeline.janitor_sweep(&session_dir).await.unwrap();
    let second_pass = pipeline.janitor_sweep(&session_dir).await.unwrap();

    assert_eq!(first_pass, 0);
    assert_eq!(second_pass, 0);
}
