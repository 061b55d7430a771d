//! End-to-end ingestion over real directories
//!
//! Tests:
//! 1. Incremental stats for a large mostly-unchanged tree
//! 2. Idempotent re-sync against SQLite
//! 3. Atomic replace of a modified file's chunks
//! 4. Partial embedding failure isolated to one sub-batch
//! 5. Unreadable root fails the run

mod common;

use common::{context, WordEmbedder};
use lodestone_core::{
    run_sync, CancellationToken, Database, Dataset, Error, FileSource, IndexStore, MemoryStore,
    ProgressReporter, ProviderSet, Scope, SyncOptions,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn dataset() -> Dataset {
    Dataset::new("docs", "docs", Scope::Project)
}

async fn sync(
    ctx: &lodestone_core::IndexContext,
    root: &std::path::Path,
) -> std::result::Result<lodestone_core::JobStats, lodestone_core::SyncFailure> {
    let source = FileSource::new(root).unwrap();
    run_sync(
        ctx,
        &dataset(),
        &source,
        &SyncOptions::default(),
        &ProgressReporter::detached(),
        &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn test_incremental_stats_for_large_tree() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    fs::create_dir_all(root.join("notes")).unwrap();

    for i in 0..1000 {
        fs::write(root.join("notes").join(format!("n{:04}.md", i)), format!("note number {}", i))
            .unwrap();
    }
    for i in 0..3 {
        fs::write(root.join(format!("edit{}.md", i)), "original text").unwrap();
    }
    fs::write(root.join("obsolete.md"), "to be removed").unwrap();

    let store = Arc::new(MemoryStore::new());
    let ctx = context(store.clone(), ProviderSet::new(Arc::new(WordEmbedder::new())));

    let first = sync(&ctx, &root).await.unwrap();
    assert_eq!(first.files_created, 1004);
    assert!(first.errors.is_empty());

    for i in 0..3 {
        fs::write(root.join(format!("edit{}.md", i)), format!("edited text {}", i)).unwrap();
    }
    fs::remove_file(root.join("obsolete.md")).unwrap();
    fs::write(root.join("fresh.md"), "brand new").unwrap();

    let stats = sync(&ctx, &root).await.unwrap();
    assert_eq!(stats.files_scanned, 1005);
    assert_eq!(stats.files_created, 1);
    assert_eq!(stats.files_modified, 3);
    assert_eq!(stats.files_deleted, 1);
    assert_eq!(stats.files_unchanged, 1000);
    assert!(stats.errors.is_empty());

    assert!(store
        .get_file_record("docs", "obsolete.md")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_file_record("docs", "fresh.md")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_resync_against_sqlite_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("src");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("lib.rs"),
        "/// Adds numbers\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\npub struct Point {\n    x: i32,\n}\n",
    )
    .unwrap();
    fs::write(root.join("README.md"), "# Readme\n\nSome words here.\n").unwrap();
    fs::write(root.join("empty.txt"), "").unwrap();

    let db = Database::open(temp.path().join("index.db")).unwrap();
    db.initialize().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(db);
    let embedder = Arc::new(WordEmbedder::new());
    let ctx = context(store.clone(), ProviderSet::new(embedder.clone()));

    let first = sync(&ctx, &root).await.unwrap();
    assert_eq!(first.files_created, 3);
    assert!(first.chunks_added >= 3);
    let calls = embedder.calls.load(std::sync::atomic::Ordering::SeqCst);

    let second = sync(&ctx, &root).await.unwrap();
    assert_eq!(second.files_scanned, 3);
    assert_eq!(second.files_unchanged, second.files_scanned);
    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.chunks_removed, 0);
    assert_eq!(
        embedder.calls.load(std::sync::atomic::Ordering::SeqCst),
        calls,
        "unchanged files must not be re-embedded"
    );

    // Empty documents still own exactly one empty chunk
    let empty = store.get_file_record("docs", "empty.txt").await.unwrap().unwrap();
    let chunks = store.file_chunks(&empty.id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "");
    assert_eq!(chunks[0].overlap, 0);
}

#[tokio::test]
async fn test_modified_file_chunks_are_replaced_atomically() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("docs");
    fs::create_dir_all(&root).unwrap();
    let old: String = (0..40).map(|i| format!("old paragraph {} text.\n", i)).collect();
    fs::write(root.join("guide.md"), &old).unwrap();

    let db = Database::open(temp.path().join("index.db")).unwrap();
    db.initialize().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(db);
    let ctx = context(store.clone(), ProviderSet::new(Arc::new(WordEmbedder::new())));
    sync(&ctx, &root).await.unwrap();

    let new: String = (0..25).map(|i| format!("new section {} body.\n", i)).collect();
    fs::write(root.join("guide.md"), &new).unwrap();
    let stats = sync(&ctx, &root).await.unwrap();
    assert_eq!(stats.files_modified, 1);
    assert!(stats.chunks_removed > 0);

    let record = store.get_file_record("docs", "guide.md").await.unwrap().unwrap();
    let chunks = store.file_chunks(&record.id).await.unwrap();
    assert_eq!(chunks.len(), record.chunk_count);
    assert!(chunks.iter().all(|c| !c.text.contains("old paragraph")));

    // Stripping overlaps and concatenating gives back the new file
    let rebuilt: String = chunks.iter().map(|c| &c.text[c.overlap..]).collect();
    assert_eq!(rebuilt, new);
}

#[tokio::test]
async fn test_failed_sub_batch_does_not_fail_the_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("docs");
    fs::create_dir_all(&root).unwrap();

    let mut text = String::new();
    for i in 0..100 {
        let marker = if i == 57 { "POISONED" } else { "regular" };
        text.push_str(&format!(
            "Paragraph {:03} is {} content padded out to roughly a full chunk of text so \
             that every paragraph becomes its own window in the chunker output here.\n\n",
            i, marker
        ));
    }
    fs::write(root.join("big.md"), &text).unwrap();

    let store = Arc::new(MemoryStore::new());
    let ctx = context(
        store.clone(),
        ProviderSet::new(Arc::new(WordEmbedder::poisoned("POISONED"))),
    );

    let stats = sync(&ctx, &root).await.unwrap();
    assert_eq!(stats.files_created, 1);
    assert!(stats.chunks_failed > 0);
    assert!(stats.chunks_added > stats.chunks_failed);
    assert_eq!(stats.errors.len(), stats.chunks_failed);
    for error in &stats.errors {
        assert_eq!(error.path, "big.md");
        assert_eq!(error.kind, "embedding_provider");
        assert!(error.chunk_index.is_some());
    }

    let record = store.get_file_record("docs", "big.md").await.unwrap().unwrap();
    assert!(!record.complete);
    assert_eq!(record.chunk_count, stats.chunks_added);
}

#[tokio::test]
async fn test_missing_root_fails_with_source_unavailable() {
    let temp = TempDir::new().unwrap();
    let ctx = context(
        Arc::new(MemoryStore::new()),
        ProviderSet::new(Arc::new(WordEmbedder::new())),
    );
    let failure = sync(&ctx, &temp.path().join("does-not-exist")).await.unwrap_err();
    assert!(matches!(failure.error, Error::SourceUnavailable(_)));
}
