//! Hybrid retrieval over an ingested SQLite index
//!
//! Tests:
//! 1. Rerank outage falls back to fused ordering
//! 2. Language filter
//! 3. Smart query without an expander behaves like a plain query

mod common;

use common::{context, FailingReranker, WordEmbedder};
use lodestone_core::{
    run_sync, CancellationToken, Database, Dataset, FileSource, IndexContext, IndexStore,
    ProgressReporter, ProviderSet, QueryRequest, Scope, SyncOptions,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

async fn ingested(temp: &TempDir, providers: ProviderSet) -> IndexContext {
    let root = temp.path().join("project");
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src").join("cache.rs"),
        "/// Evicts the least recently used cache entry\npub fn evict(cache: &mut Cache) {\n    cache.pop_lru();\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("src").join("retry.py"),
        "def retry(fn, attempts):\n    \"\"\"Retry a call with backoff\"\"\"\n    for _ in range(attempts):\n        fn()\n",
    )
    .unwrap();
    fs::write(
        root.join("CACHING.md"),
        "# Caching\n\nThe cache evicts entries in least recently used order.\n",
    )
    .unwrap();
    fs::write(root.join("NOTES.md"), "Meeting notes about hiring.\n").unwrap();

    let db = Database::open(temp.path().join("index.db")).unwrap();
    db.initialize().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(db);
    let ctx = context(store, providers);

    let source = FileSource::new(&root).unwrap();
    run_sync(
        &ctx,
        &Dataset::new("project", "project", Scope::Project),
        &source,
        &SyncOptions::default(),
        &ProgressReporter::detached(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    ctx
}

#[tokio::test]
async fn test_rerank_outage_keeps_fused_order() {
    let temp = TempDir::new().unwrap();
    let embedder = Arc::new(WordEmbedder::new());

    let plain = ingested(&temp, ProviderSet::new(embedder.clone())).await;
    let request = QueryRequest::new("cache evicts least recently used").top_k(3);
    let expected = plain.retrieval().query(&request).await.unwrap();
    assert!(!expected.is_empty());

    let reranking = IndexContext::new(
        plain.config().clone(),
        plain.store().clone(),
        ProviderSet::new(embedder).with_reranker(Arc::new(FailingReranker)),
    );
    let results = reranking.retrieval().query(&request).await.unwrap();

    assert_eq!(results, expected);
    assert!(results.iter().all(|r| r.rerank_score.is_none()));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results[0].path == "CACHING.md" || results[0].path == "src/cache.rs");
}

#[tokio::test]
async fn test_language_filter() {
    let temp = TempDir::new().unwrap();
    let ctx = ingested(&temp, ProviderSet::new(Arc::new(WordEmbedder::new()))).await;

    let results = ctx
        .retrieval()
        .query(&QueryRequest::new("retry cache").language("python"))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.path == "src/retry.py"));
}

#[tokio::test]
async fn test_smart_query_without_expander() {
    let temp = TempDir::new().unwrap();
    let ctx = ingested(&temp, ProviderSet::new(Arc::new(WordEmbedder::new()))).await;
    let request = QueryRequest::new("hiring notes");

    let smart = ctx.retrieval().smart_query(&request, true).await.unwrap();
    let plain = ctx.retrieval().query(&request).await.unwrap();

    assert_eq!(smart.variations, vec!["hiring notes".to_string()]);
    assert_eq!(smart.results[0].chunk_id, plain[0].chunk_id);
    assert_eq!(smart.results[0].path, "NOTES.md");
    assert!(smart.answer.is_none());
}
