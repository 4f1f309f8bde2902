//! Full-system flows: extraction to retrieval, degradation, health

use std::sync::Arc;

use engram::config::EngramConfig;
use engram::graph::MemoryGraphBackend;
use engram::memory::MemorySystem;
use engram::memory::retrieval::ContextLayer;
use engram::memory::types::{CoreCategory, Section, SourceRecord};
use engram::store::BackendStatus;
use engram::store::memory::MemoryNoteBackend;
use engram::testing::{FixedExtractor, MockEmbedder};

fn system(dir: &std::path::Path) -> MemorySystem {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut config = EngramConfig::default();
    config.storage.data_dir = dir.to_path_buf();
    MemorySystem::with_backends(
        config,
        Some(Arc::new(MemoryNoteBackend::new())),
        Some(Arc::new(MemoryGraphBackend::new())),
    )
    .unwrap()
}

const EXTRACTION_RESPONSE: &str = r#"Here's what I found worth keeping:

{
    "overview": "The user discussed their newsletter habits",
    "notes": [
        {"content": "User reads Mike's daily paper review with coffee", "section": "Important Facts", "importance": 0.65}
    ],
    "entities": [
        {"name": "Mike", "type": "Person", "description": "Runs a daily ML paper review"},
        {"name": "Daily Paper Review", "type": "Concept"}
    ],
    "relationships": [
        {"source": "Mike", "target": "Daily Paper Review", "type": "WRITES", "confidence": 0.9}
    ]
}

Hope that helps!"#;

#[tokio::test]
async fn ingest_then_retrieve_produces_cited_context() {
    let dir = tempfile::tempdir().unwrap();
    let sys = system(dir.path());
    let embedder = MockEmbedder::new();
    let extractor = FixedExtractor::new(EXTRACTION_RESPONSE);

    sys.core()
        .add("User's name is Alice", CoreCategory::Identity, None)
        .unwrap();

    let source = SourceRecord::conversation("sess-42");
    let report = sys
        .ingest(&extractor, &embedder, "conversation transcript here", &source)
        .await
        .unwrap();

    assert_eq!(report.notes_written, 1);
    assert_eq!(report.entities_written, 2);
    assert_eq!(report.relationships_written, 1);

    let package = sys
        .retrieve_context(&embedder, "User reads Mike's daily paper review with coffee")
        .await
        .unwrap();

    // Core first, then the exact-match note
    assert_eq!(package.items[0].layer, ContextLayer::Core);
    assert!(package.items.len() >= 2);
    assert_eq!(package.items[1].layer, ContextLayer::Note);
    assert!(package.items[1].score.unwrap() > 0.99);
    assert_eq!(
        package.items[1].citation.as_deref(),
        Some("conversation:sess-42")
    );

    // Citation indices are contiguous from 1
    for (position, item) in package.items.iter().enumerate() {
        assert_eq!(item.index, position + 1);
    }

    // Retrieval reinforced the note
    let notes = sys.notes().list().await.unwrap();
    assert_eq!(notes[0].access_count, 1);
}

#[tokio::test]
async fn malformed_extraction_degrades_to_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let sys = system(dir.path());
    let embedder = MockEmbedder::new();
    let extractor = FixedExtractor::new("I couldn't find anything structured to extract.");

    let report = sys
        .ingest(
            &extractor,
            &embedder,
            "transcript",
            &SourceRecord::conversation("sess-1"),
        )
        .await
        .unwrap();

    assert_eq!(report.notes_written, 0);
    assert_eq!(sys.notes().count().await.unwrap(), 0);
}

#[tokio::test]
async fn disabled_layers_degrade_without_failing_others() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngramConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();

    let sys = MemorySystem::with_backends(config, None, None).unwrap();
    let embedder = MockEmbedder::new();
    let extractor = FixedExtractor::new(EXTRACTION_RESPONSE);

    let health = sys.health();
    assert_eq!(health.vector_store, BackendStatus::Unavailable);
    assert_eq!(health.graph_store, BackendStatus::Unavailable);
    assert_eq!(health.core_store, BackendStatus::Connected);

    // Ingestion and retrieval still succeed; disabled layers contribute nothing
    sys.ingest(
        &extractor,
        &embedder,
        "transcript",
        &SourceRecord::conversation("sess-1"),
    )
    .await
    .unwrap();

    sys.core()
        .add("Still reachable", CoreCategory::System, None)
        .unwrap();
    let package = sys.retrieve_context(&embedder, "anything").await.unwrap();
    assert_eq!(package.items.len(), 1);
    assert_eq!(package.items[0].content, "Still reachable");

    // Maintenance over disabled layers is a clean no-op
    let report = sys.run_maintenance().await.unwrap();
    assert!(report.notes_archived.is_empty());
}

#[tokio::test]
async fn health_reports_connected_backends() {
    let dir = tempfile::tempdir().unwrap();
    let sys = system(dir.path());

    let health = sys.health();
    assert_eq!(health.vector_store, BackendStatus::Connected);
    assert_eq!(health.graph_store, BackendStatus::Connected);
    assert_eq!(health.archive, BackendStatus::Connected);
}

#[tokio::test]
async fn working_namespaces_isolate_delegated_agents() {
    let dir = tempfile::tempdir().unwrap();
    let sys = system(dir.path());

    let main = sys.working().main().unwrap();
    main.add_item(Section::OngoingThreads, "Main thread of work").unwrap();

    let agent = sys
        .working()
        .create_ephemeral(Some("subagent-7"), Some("Summarize the report"))
        .unwrap();
    agent
        .add_item(Section::ImportantFacts, "Report has three sections")
        .unwrap();

    assert_eq!(
        main.items(Section::OngoingThreads).unwrap(),
        vec!["Main thread of work"]
    );
    assert!(main.items(Section::ImportantFacts).unwrap().is_empty());

    // Cleanup removes only the agent's namespace
    assert!(sys.working().cleanup("subagent-7").unwrap());
    assert_eq!(
        main.items(Section::OngoingThreads).unwrap(),
        vec!["Main thread of work"]
    );
    assert!(sys.core().items().unwrap().is_empty());
}

#[tokio::test]
async fn graph_entities_from_ingestion_are_traversable() {
    let dir = tempfile::tempdir().unwrap();
    let sys = system(dir.path());
    let embedder = MockEmbedder::new();
    let extractor = FixedExtractor::new(EXTRACTION_RESPONSE);

    sys.ingest(
        &extractor,
        &embedder,
        "transcript",
        &SourceRecord::conversation("sess-9"),
    )
    .await
    .unwrap();

    let related = sys.graph().related("Mike", 1, 10).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].entity.name, "Daily Paper Review");

    // Provenance stayed out of the domain counts
    let summary = sys.graph().summary().await.unwrap();
    assert_eq!(summary.entities, 2);
    assert_eq!(summary.relationships, 1);
    assert_eq!(summary.provenance_edges, 3);
}
