mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use runbook_core::error::Error;
use runbook_core::source::DirectorySource;
use runbook_core::types::{RetrievalMode, SearchFilters, SearchRequest, SourceType};
use runbook_hybrid::{Engine, RebuildStatus, UpdateMode};

use common::{corpus, doc, engine_with, settings, TestEmbedder};

#[tokio::test]
async fn search_before_first_publish_is_empty_not_an_error() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    let response = engine.search(SearchRequest::new("disk pressure")).await.unwrap();

    assert!(!response.index_ready);
    assert!(response.results.is_empty());
    assert_eq!(response.retrieval_mode, RetrievalMode::None);
    assert!(!engine.health().index_ready);
}

#[tokio::test]
async fn first_ingest_publishes_a_hybrid_index() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    let report = engine.ingest(corpus(), false).await.unwrap();

    let outcome = report.index.expect("first ingest publishes");
    assert_eq!(outcome.mode, UpdateMode::FullRebuild);
    assert_eq!(outcome.generation, 1);
    assert_eq!(outcome.chunks_indexed, 4);
    assert_eq!(report.stats.created, 4);

    let response = engine.search(SearchRequest::new("disk").with_top_k(3)).await.unwrap();
    assert!(response.index_ready);
    assert_eq!(response.retrieval_mode, RetrievalMode::Hybrid);
    assert_eq!(response.results.len(), 3);
    assert!(response.total_results >= 3);

    let top = &response.results[0];
    assert!(top.snippet.contains("<mark>"), "lexical match is highlighted: {}", top.snippet);
    let scores = top.scores.as_ref().expect("scores by default");
    assert!(scores.bm25_rank.is_some());
    assert!(scores.final_score > 0.0);
    assert!(top.url.starts_with("https://runbooks.example.com/"));
}

#[tokio::test]
async fn filters_restrict_both_retrievers() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();

    let docs_only = SearchFilters::default().source_types(["docs"]);
    let response = engine.search(SearchRequest::new("disk").with_filters(docs_only)).await.unwrap();
    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|r| r.source_type == SourceType::Docs));

    let pipeline = SearchFilters::default().projects(["pipeline"]);
    let response = engine.search(SearchRequest::new("disk").with_filters(pipeline)).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].document_id, "ingest-disk");
    assert_eq!(response.results[0].scores.as_ref().unwrap().bm25_rank, Some(1));

    let nothing = SearchFilters::default().projects(["no-such-project"]);
    let response = engine.search(SearchRequest::new("disk").with_filters(nothing)).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total_results, 0);
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_retrieval() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();

    let bad = vec![
        SearchRequest::new("   "),
        SearchRequest::new("disk").with_top_k(0),
        SearchRequest::new("disk").with_top_k(51),
        SearchRequest::new("x".repeat(501)),
        SearchRequest::new("disk").with_filters(SearchFilters::default().source_types(["blog"])),
        SearchRequest::new("disk").with_filters(SearchFilters::default().projects([" "])),
    ];
    for request in bad {
        let err = engine.search(request.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{request:?} gave {err}");
        assert!(err.is_client_error());
    }

    let metrics = engine.health().metrics;
    assert_eq!(metrics.requests_rejected, 6);
    assert_eq!(metrics.requests_total, 0);
}

#[tokio::test]
async fn repeated_query_hits_cache_until_rebuild() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();

    let first = engine.search(SearchRequest::new("disk full")).await.unwrap();
    let second = engine.search(SearchRequest::new("  DISK   full ")).await.unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.results, second.results);
    assert_eq!(second.query, "  DISK   full ");

    engine.rebuild().await.unwrap();
    let third = engine.search(SearchRequest::new("disk full")).await.unwrap();
    assert!(!third.cache_hit, "publish invalidates the cache");
    assert_eq!(third.results, first.results);

    let health = engine.health();
    assert_eq!(health.metrics.cache_hits, 1);
    assert_eq!(health.metrics.cache_misses, 2);
}

#[tokio::test]
async fn scores_can_be_omitted() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();

    let bare = engine.search(SearchRequest::new("dns lookups").include_scores(false)).await.unwrap();
    assert!(!bare.results.is_empty());
    assert!(bare.results.iter().all(|r| r.scores.is_none()));

    let full = engine.search(SearchRequest::new("dns lookups")).await.unwrap();
    assert!(full.cache_hit);
    assert!(full.results.iter().all(|r| r.scores.is_some()));
}

#[tokio::test]
async fn vector_similarity_recovers_paraphrased_runbook() {
    let mut documents = corpus();
    documents.push(doc(
        "memory-exhaustion",
        SourceType::Docs,
        "k8s",
        "# Crash loop\n\nProcess terminated due to memory exhaustion.",
    ));
    let query = "pod killed for memory reasons";

    let lexical = Engine::lexical_only(settings()).unwrap();
    lexical.ingest(documents.clone(), false).await.unwrap();
    let response = lexical.search(SearchRequest::new(query)).await.unwrap();
    assert_eq!(response.retrieval_mode, RetrievalMode::Bm25Only);
    assert_eq!(response.results[0].document_id, "oom");

    let hybrid = engine_with(&TestEmbedder::scripted(), settings());
    hybrid.ingest(documents, false).await.unwrap();
    let response = hybrid.search(SearchRequest::new(query)).await.unwrap();
    assert_eq!(response.retrieval_mode, RetrievalMode::Hybrid);
    assert_eq!(response.results[0].document_id, "memory-exhaustion");
    let scores = response.results[0].scores.as_ref().unwrap();
    assert_eq!(scores.vector_rank, Some(1));
}

#[tokio::test]
async fn lexical_only_when_vectors_are_not_built() {
    let embedder = TestEmbedder::hashing();
    let mut config = settings();
    config.index.build_vectors = false;
    let engine = engine_with(&embedder, config);
    engine.ingest(corpus(), false).await.unwrap();

    let response = engine.search(SearchRequest::new("OOMKilled 137")).await.unwrap();
    assert_eq!(response.retrieval_mode, RetrievalMode::Bm25Only);
    assert_eq!(response.results[0].document_id, "oom");
    assert!(response.results.iter().all(|r| r.scores.as_ref().unwrap().vector_rank.is_none()));

    let health = engine.health();
    assert_eq!(health.vector_chunks, 0);
    assert_eq!(health.lexical_chunks, 4);
    assert_eq!(embedder.texts_embedded(), 0, "nothing embedded without a vector index");
}

#[tokio::test]
async fn embedder_failure_degrades_to_lexical_and_is_not_cached() {
    let embedder = TestEmbedder::hashing();
    let engine = engine_with(&embedder, settings());
    engine.ingest(corpus(), false).await.unwrap();
    embedder.set_failing(true);

    let first = engine.search(SearchRequest::new("disk")).await.unwrap();
    assert_eq!(first.retrieval_mode, RetrievalMode::Bm25Only);
    assert!(!first.results.is_empty());

    let second = engine.search(SearchRequest::new("disk")).await.unwrap();
    assert!(!second.cache_hit, "degraded answers are recomputed");

    embedder.set_failing(false);
    let recovered = engine.search(SearchRequest::new("disk")).await.unwrap();
    assert_eq!(recovered.retrieval_mode, RetrievalMode::Hybrid);
    assert!(engine.health().metrics.degraded_total >= 2);
}

#[tokio::test]
async fn slow_vector_retrieval_is_abandoned_after_its_budget() {
    let embedder = TestEmbedder::hashing();
    let mut config = settings();
    config.retrieval.vector_budget_ms = 50;
    let engine = engine_with(&embedder, config);
    engine.ingest(corpus(), false).await.unwrap();

    embedder.set_delay(Duration::from_millis(400));
    let response = engine.search(SearchRequest::new("dns")).await.unwrap();
    embedder.set_delay(Duration::ZERO);

    assert_eq!(response.retrieval_mode, RetrievalMode::Bm25Only);
    assert_eq!(response.results[0].document_id, "dns-issue");
    assert!(response.latency_ms < 400.0);
}

#[tokio::test]
async fn unchanged_documents_are_not_reembedded() {
    let embedder = TestEmbedder::hashing();
    let engine = engine_with(&embedder, settings());
    engine.ingest(corpus(), false).await.unwrap();
    assert_eq!(embedder.texts_embedded(), 4);

    let again = engine.ingest(corpus(), false).await.unwrap();
    assert_eq!(again.stats.skipped, 4);
    assert!(again.index.is_none());

    let rebuilt = engine.rebuild().await.unwrap();
    assert_eq!(rebuilt.embedded, 0);
    assert_eq!(rebuilt.reused_embeddings, 4);
    assert_eq!(embedder.texts_embedded(), 4);
    assert_eq!(engine.store().chunk_count(), 4);
    assert_eq!(engine.health().lexical_chunks, 4);
    assert_eq!(engine.manager().embedding_cache().len(), 4);
}

#[tokio::test]
async fn changed_document_is_patched_incrementally() {
    let embedder = TestEmbedder::hashing();
    let engine = engine_with(&embedder, settings());
    engine.ingest(corpus(), false).await.unwrap();

    let edited = doc("oom", SourceType::Docs, "k8s", "# OOMKilled\n\nRaise the memory limit or enable swap accounting.");
    let report = engine.ingest(vec![edited], false).await.unwrap();
    let outcome = report.index.unwrap();
    assert_eq!(outcome.mode, UpdateMode::Incremental);
    assert_eq!(outcome.generation, 2);
    assert_eq!((outcome.chunks_indexed, outcome.chunks_removed), (1, 1));
    assert_eq!(outcome.embedded, 1);
    assert_eq!(embedder.texts_embedded(), 5);

    let response = engine.search(SearchRequest::new("swap")).await.unwrap();
    assert_eq!(response.results[0].document_id, "oom");
    let stale = engine.search(SearchRequest::new("kernel")).await.unwrap();
    assert!(stale.results.iter().all(|r| r.scores.as_ref().unwrap().bm25_rank.is_none()));

    let removed = engine.remove_documents(&["dns-issue".to_string()]).await.unwrap().unwrap();
    assert_eq!(removed.chunks_removed, 1);
    let health = engine.health();
    assert_eq!((health.lexical_chunks, health.vector_chunks), (3, 3));

    let missing = engine.remove_documents(&["nope".to_string()]).await.unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
}

#[tokio::test]
async fn large_change_sets_fall_back_to_full_rebuild() {
    let mut config = settings();
    config.index.incremental_max_documents = 1;
    let engine = engine_with(&TestEmbedder::hashing(), config);
    engine.ingest(corpus(), false).await.unwrap();

    let edits = vec![
        doc("oom", SourceType::Docs, "k8s", "# OOMKilled\n\nCheck container memory limits."),
        doc("dns-issue", SourceType::Issues, "k8s", "# DNS\n\nScale CoreDNS replicas."),
    ];
    let outcome = engine.ingest(edits, false).await.unwrap().index.unwrap();
    assert_eq!(outcome.mode, UpdateMode::FullRebuild);
    assert_eq!(outcome.chunks_indexed, 4);
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_the_previous_snapshot() {
    let embedder = TestEmbedder::hashing();
    let engine = engine_with(&embedder, settings());
    engine.ingest(corpus(), false).await.unwrap();

    embedder.set_failing(true);
    let edited = doc("oom", SourceType::Docs, "k8s", "# OOMKilled\n\nRaise the memory limit.");
    let err = engine.ingest(vec![edited], false).await.unwrap_err();
    assert!(matches!(err, Error::Rebuild(_)));

    let health = engine.health();
    assert!(health.index_ready);
    assert_eq!(health.generation, 1);
    assert!(!health.is_healthy());
    assert_eq!(health.metrics.rebuilds_failed, 1);
    let last = health.last_rebuild.unwrap();
    assert!(matches!(last.status, RebuildStatus::Failed { .. }));

    let response = engine.search(SearchRequest::new("kernel")).await.unwrap();
    assert_eq!(response.results[0].document_id, "oom", "old content still served");

    embedder.set_failing(false);
    let outcome = engine.rebuild().await.unwrap();
    assert_eq!(outcome.generation, 2);
    assert!(engine.health().is_healthy());
    let response = engine.search(SearchRequest::new("limit")).await.unwrap();
    assert_eq!(response.results[0].document_id, "oom");
}

#[tokio::test]
async fn failed_update_is_retried_by_the_next_ingest() {
    let embedder = TestEmbedder::hashing();
    let engine = engine_with(&embedder, settings());
    engine.ingest(corpus(), false).await.unwrap();

    embedder.set_failing(true);
    let edited = doc("oom", SourceType::Docs, "k8s", "# OOMKilled\n\nRaise the memory limit.");
    assert!(engine.ingest(vec![edited.clone()], false).await.is_err());
    assert!(engine.manager().has_pending_changes());

    embedder.set_failing(false);
    let report = engine.ingest(vec![edited], false).await.unwrap();
    assert_eq!(report.stats.skipped, 1);
    assert!(report.stats.changed.is_empty());
    let outcome = report.index.expect("held-back change is published");
    assert_eq!(outcome.mode, UpdateMode::Incremental);
    assert_eq!(outcome.generation, 2);
    assert!(!engine.manager().has_pending_changes());
    assert!(engine.health().is_healthy());

    let stale = engine.search(SearchRequest::new("kernel")).await.unwrap();
    assert!(stale.results.iter().all(|r| r.scores.as_ref().unwrap().bm25_rank.is_none()));
    let fresh = engine.search(SearchRequest::new("limit")).await.unwrap();
    assert_eq!(fresh.results[0].document_id, "oom");
}

#[tokio::test]
async fn failed_full_rebuild_makes_the_next_update_full() {
    let embedder = TestEmbedder::hashing();
    let mut config = settings();
    config.index.incremental_max_documents = 1;
    let engine = engine_with(&embedder, config);
    engine.ingest(corpus(), false).await.unwrap();

    embedder.set_failing(true);
    let edits = vec![
        doc("oom", SourceType::Docs, "k8s", "# OOMKilled\n\nCheck container memory limits."),
        doc("dns-issue", SourceType::Issues, "k8s", "# DNS\n\nScale CoreDNS replicas."),
    ];
    assert!(engine.ingest(edits.clone(), false).await.is_err());

    embedder.set_failing(false);
    let outcome = engine.ingest(edits, false).await.unwrap().index.unwrap();
    assert_eq!(outcome.mode, UpdateMode::FullRebuild);
    assert_eq!(outcome.generation, 2);
    assert!(!engine.manager().has_pending_changes());

    let response = engine.search(SearchRequest::new("replicas")).await.unwrap();
    assert_eq!(response.results[0].document_id, "dns-issue");
}

#[tokio::test]
async fn search_overtaken_by_a_publish_is_not_cached() {
    let embedder = TestEmbedder::hashing();
    let engine = Arc::new(engine_with(&embedder, settings()));
    engine.ingest(corpus(), false).await.unwrap();

    embedder.set_delay(Duration::from_millis(300));
    let searching = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.search(SearchRequest::new("disk")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = engine.rebuild().await.unwrap();
    assert_eq!(outcome.embedded, 0, "rebuild reuses cached embeddings");

    let response = searching.await.unwrap().unwrap();
    assert_eq!(response.retrieval_mode, RetrievalMode::Hybrid);
    assert!(engine.query_cache().is_empty());
}

#[tokio::test]
async fn shutdown_returns_to_not_ready() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();
    engine.search(SearchRequest::new("disk")).await.unwrap();

    engine.shutdown();
    assert!(engine.query_cache().is_empty());
    let response = engine.search(SearchRequest::new("disk")).await.unwrap();
    assert!(!response.index_ready);

    let outcome = engine.rebuild().await.unwrap();
    assert_eq!(outcome.generation, 2, "generations are never reused");
}

#[tokio::test]
async fn background_rebuild_publishes() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();

    let outcome = engine.manager().spawn_rebuild().await.unwrap().unwrap();
    assert_eq!(outcome.generation, 2);
    assert_eq!(engine.health().generation, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn searches_during_rebuilds_always_see_a_whole_snapshot() {
    let engine = Arc::new(engine_with(&TestEmbedder::hashing(), settings()));
    engine.ingest(corpus(), false).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                engine.rebuild().await.map(|_| ())
            } else {
                let response = engine.search(SearchRequest::new("disk pressure")).await?;
                assert!(response.index_ready);
                assert_eq!(response.retrieval_mode, RetrievalMode::Hybrid);
                assert_eq!(response.results[0].document_id, "disk-pressure");
                Ok(())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(engine.health().generation, 5);
}

#[tokio::test]
async fn ingest_from_a_markdown_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nodes")).unwrap();
    fs::write(
        dir.path().join("nodes/disk-pressure.md"),
        "---\ntitle: Disk pressure\n---\n# Disk Pressure\n\nPrune images when the node disk fills.\n",
    )
    .unwrap();
    fs::write(dir.path().join("certs.md"), "# Certificate Rotation\n\nRotate kubelet certificates yearly.\n").unwrap();
    fs::write(dir.path().join("notes.bin"), "ignored").unwrap();

    let engine = engine_with(&TestEmbedder::hashing(), settings());
    let source = DirectorySource::new(dir.path(), "k8s", SourceType::Docs).with_base_url("https://kb.example.com");
    let report = engine.ingest_source(&source, false).await.unwrap();
    assert_eq!(report.stats.created, 2);

    let response = engine.search(SearchRequest::new("certificates")).await.unwrap();
    let top = &response.results[0];
    assert_eq!(top.document_id, "k8s-docs:certs.md");
    assert_eq!(top.title, "Certificate Rotation");
    assert_eq!(top.url, "https://kb.example.com/certs");

    let missing = DirectorySource::new(dir.path().join("absent"), "k8s", SourceType::Docs);
    assert!(matches!(engine.ingest_source(&missing, false).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn health_report_serializes_for_an_api_layer() {
    let engine = engine_with(&TestEmbedder::hashing(), settings());
    engine.ingest(corpus(), false).await.unwrap();
    engine.search(SearchRequest::new("disk")).await.unwrap();

    let json = serde_json::to_value(engine.health()).unwrap();
    assert_eq!(json["index_ready"], true);
    assert_eq!(json["generation"], 1);
    assert_eq!(json["embedder_id"], "hash:test:d64");
    assert_eq!(json["last_rebuild"]["status"], "succeeded");
    assert_eq!(json["last_rebuild"]["mode"], "full_rebuild");
    assert_eq!(json["metrics"]["requests_total"], 1);
    assert_eq!(json["metrics"]["latency_buckets"].as_array().unwrap().len(), 9);
    assert!(json["version"].as_str().unwrap().ends_with("-g1"));
}
