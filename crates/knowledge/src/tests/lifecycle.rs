use super::*;
use crate::store::SqliteStore;
use crate::types::{Chunk, ChunkId, Document, DocumentUpdate};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

fn long_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Section {} explains how the handbook covers topic number {}.", i, i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Memory store whose next `all_chunks` call, once armed, parks after reading
/// until released.
#[derive(Default)]
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl GatedStore {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DocumentStore for GatedStore {
    async fn create_document(&self, document: &Document) -> AppResult<()> {
        self.inner.create_document(document).await
    }

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        self.inner.get_document(id).await
    }

    async fn list_documents(&self) -> AppResult<Vec<Document>> {
        self.inner.list_documents().await
    }

    async fn update_document(&self, document: &Document) -> AppResult<()> {
        self.inner.update_document(document).await
    }

    async fn delete_document(&self, id: &str) -> AppResult<bool> {
        self.inner.delete_document(id).await
    }

    async fn create_chunks_bulk(&self, chunks: &[Chunk]) -> AppResult<()> {
        self.inner.create_chunks_bulk(chunks).await
    }

    async fn get_chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        self.inner.get_chunks_by_document(document_id).await
    }

    async fn get_chunk_by_external_id(&self, id: &ChunkId) -> AppResult<Option<Chunk>> {
        self.inner.get_chunk_by_external_id(id).await
    }

    async fn delete_chunks_by_document(&self, document_id: &str) -> AppResult<usize> {
        self.inner.delete_chunks_by_document(document_id).await
    }

    async fn all_chunks(&self) -> AppResult<Vec<Chunk>> {
        let chunks = self.inner.all_chunks().await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        Ok(chunks)
    }

    async fn chunk_counts(&self) -> AppResult<HashMap<String, usize>> {
        self.inner.chunk_counts().await
    }

    async fn counts(&self) -> AppResult<(usize, usize)> {
        self.inner.counts().await
    }
}

#[tokio::test]
async fn test_upload_indexes_every_chunk() {
    let kb = memory_kb(None).await;

    let stats = kb
        .upload_document("Handbook", "txt", &long_text(10), vec!["hr".to_string()], json!({}))
        .await
        .unwrap();

    assert!(stats.chunks_count > 1);
    let base = kb.stats().await.unwrap();
    assert_eq!(base.documents_count, 1);
    assert_eq!(base.chunks_count, stats.chunks_count);
    assert_eq!(base.indexed_vectors, stats.chunks_count);
    assert_eq!(base.dimension, DIM);
    assert!(base.in_sync);

    let details = kb.get_document(&stats.document.id).await.unwrap();
    let first = &details.chunks[0];
    assert_eq!(first.metadata["title"], "Handbook");
    assert_eq!(first.metadata["fileType"], "txt");
    assert_eq!(first.metadata["totalChunks"], stats.chunks_count);
    assert!(kb.index().contains(&first.external_id()).await);
}

#[tokio::test]
async fn test_upload_requires_title() {
    let kb = memory_kb(None).await;
    let result = kb.upload_document("  ", "txt", VACATION, vec![], json!({})).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_upload_with_failing_embeddings_leaves_nothing_behind() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let kb = KnowledgeBase::assemble(test_config(), store.clone(), Arc::new(OfflineEmbedder), None, None)
        .await
        .unwrap();

    let result = kb.upload_document("Policy", "txt", VACATION, vec![], json!({})).await;

    assert!(matches!(result, Err(AppError::Embedding(_))));
    assert_eq!(store.counts().await.unwrap(), (0, 0));
    assert_eq!(kb.index().size().await, 0);
}

#[tokio::test]
async fn test_blank_document_has_no_chunks() {
    let kb = memory_kb(None).await;
    let stats = kb
        .upload_document("Blank", "txt", " \n\t ", vec![], json!({}))
        .await
        .unwrap();

    assert_eq!(stats.chunks_count, 0);
    assert!(kb.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_delete_removes_vectors_and_chunks() {
    let kb = memory_kb(None).await;
    let keep = kb
        .upload_document("Keep", "txt", CLUSTERS, vec![], json!({}))
        .await
        .unwrap();
    let drop_me = kb
        .upload_document("Drop", "txt", &long_text(6), vec![], json!({}))
        .await
        .unwrap();

    let removed = kb.delete_document(&drop_me.document.id).await.unwrap();

    assert_eq!(removed, drop_me.chunks_count);
    assert_eq!(kb.index().size().await, keep.chunks_count);
    let base = kb.stats().await.unwrap();
    assert_eq!(base.documents_count, 1);
    assert!(base.in_sync);
    assert!(matches!(
        kb.get_document(&drop_me.document.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_unknown_document() {
    let kb = memory_kb(None).await;
    assert!(matches!(
        kb.delete_document("missing").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_replaces_chunks() {
    let kb = memory_kb(None).await;
    let original = kb
        .upload_document("Handbook", "txt", &long_text(8), vec![], json!({}))
        .await
        .unwrap();
    assert!(original.chunks_count > 1);

    let update = DocumentUpdate {
        content: Some((VACATION.to_string(), json!({ "fileName": "v2.txt" }))),
        ..Default::default()
    };
    let updated = kb.update_document(&original.document.id, update).await.unwrap();

    assert_eq!(updated.chunks_count, 1);
    assert_eq!(updated.document.id, original.document.id);
    assert_eq!(updated.document.content, VACATION);
    assert_eq!(kb.index().size().await, 1);
    assert!(kb.stats().await.unwrap().in_sync);

    let details = kb.get_document(&original.document.id).await.unwrap();
    assert_eq!(details.chunks[0].text, VACATION);
    assert_eq!(details.chunks[0].metadata["fileName"], "v2.txt");
}

#[tokio::test]
async fn test_update_title_only_keeps_content() {
    let kb = memory_kb(None).await;
    let original = kb
        .upload_document("Old", "txt", VACATION, vec!["a".to_string()], json!({}))
        .await
        .unwrap();

    let update = DocumentUpdate {
        title: Some("New".to_string()),
        ..Default::default()
    };
    kb.update_document(&original.document.id, update).await.unwrap();

    let details = kb.get_document(&original.document.id).await.unwrap();
    assert_eq!(details.document.title, "New");
    assert_eq!(details.document.content, VACATION);
    assert_eq!(details.document.tags, vec!["a".to_string()]);
    assert_eq!(details.chunks[0].metadata["title"], "New");
}

#[tokio::test]
async fn test_update_unknown_document() {
    let kb = memory_kb(None).await;
    let result = kb.update_document("missing", DocumentUpdate::default()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_update_keeps_previous_state() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let kb = KnowledgeBase::assemble(test_config(), store.clone(), Arc::new(MockProvider::new(DIM)), None, None)
        .await
        .unwrap();
    let original = kb
        .upload_document("Policy", "txt", VACATION, vec![], json!({}))
        .await
        .unwrap();
    drop(kb);

    // Same store, but the embedding model is now gone
    let offline = KnowledgeBase::assemble(test_config(), store, Arc::new(OfflineEmbedder), None, None)
        .await
        .unwrap();
    let update = DocumentUpdate {
        content: Some((CLUSTERS.to_string(), json!({}))),
        ..Default::default()
    };
    assert!(offline.update_document(&original.document.id, update).await.is_err());

    let details = offline.get_document(&original.document.id).await.unwrap();
    assert_eq!(details.document.content, VACATION);
    assert_eq!(details.chunks.len(), 1);
    assert!(offline.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_concurrent_uploads_stay_consistent() {
    let kb = memory_kb(None).await;

    let long = long_text(5);
    let (a, b, c) = tokio::join!(
        kb.upload_document("A", "txt", &long, vec![], json!({})),
        kb.upload_document("B", "txt", VACATION, vec![], json!({})),
        kb.upload_document("C", "txt", CLUSTERS, vec![], json!({})),
    );
    let total = a.unwrap().chunks_count + b.unwrap().chunks_count + c.unwrap().chunks_count;

    let base = kb.stats().await.unwrap();
    assert_eq!(base.documents_count, 3);
    assert_eq!(base.indexed_vectors, total);
    assert!(base.in_sync);
}

#[tokio::test]
async fn test_list_documents_with_counts() {
    let kb = memory_kb(None).await;
    let first = kb
        .upload_document("First", "txt", &long_text(6), vec![], json!({}))
        .await
        .unwrap();
    kb.upload_document("Second", "txt", VACATION, vec![], json!({}))
        .await
        .unwrap();

    let listed = kb.list_documents().await.unwrap();
    assert_eq!(listed.len(), 2);
    let entry = listed
        .iter()
        .find(|s| s.document.id == first.document.id)
        .unwrap();
    assert_eq!(entry.chunks_count, first.chunks_count);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("index.json");
    let store_path = dir.path().join("store.sqlite");

    let uploaded = {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&store_path).unwrap());
        let kb = persistent_kb(store, snapshot.clone()).await.unwrap();
        kb.upload_document("Policy", "txt", VACATION, vec![], json!({}))
            .await
            .unwrap()
    };
    assert!(snapshot.exists());

    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&store_path).unwrap());
    let kb = persistent_kb(store, snapshot).await.unwrap();

    assert_eq!(kb.index().size().await, uploaded.chunks_count);
    let details = kb.get_document(&uploaded.document.id).await.unwrap();
    assert!(kb.index().contains(&details.chunks[0].external_id()).await);
    assert!(kb.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_corrupt_snapshot_rebuilt_from_store() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("index.json");
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    {
        let kb = persistent_kb(store.clone(), snapshot.clone()).await.unwrap();
        kb.upload_document("Policy", "txt", VACATION, vec![], json!({}))
            .await
            .unwrap();
        kb.upload_document("Ops", "txt", CLUSTERS, vec![], json!({}))
            .await
            .unwrap();
    }
    std::fs::write(&snapshot, b"{ not json").unwrap();

    let kb = persistent_kb(store, snapshot.clone()).await.unwrap();

    assert_eq!(kb.index().size().await, 2);
    assert!(kb.stats().await.unwrap().in_sync);
    // The recovered index is written back
    assert!(std::fs::read_to_string(&snapshot).unwrap().contains("\"version\""));
}

#[tokio::test]
async fn test_missing_snapshot_rebuilt_from_store() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("index.json");
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    {
        let kb = persistent_kb(store.clone(), snapshot.clone()).await.unwrap();
        kb.upload_document("Policy", "txt", VACATION, vec![], json!({}))
            .await
            .unwrap();
    }
    std::fs::remove_file(&snapshot).unwrap();

    let kb = persistent_kb(store, snapshot).await.unwrap();
    assert_eq!(kb.index().size().await, 1);
}

#[tokio::test]
async fn test_rebuild_index_from_store() {
    let kb = memory_kb(None).await;
    let stats = kb
        .upload_document("Handbook", "txt", &long_text(6), vec![], json!({}))
        .await
        .unwrap();

    kb.index().mutate(|index| {
        index.clear();
        Ok(())
    })
    .await
    .unwrap();
    assert!(!kb.stats().await.unwrap().in_sync);

    let loaded = kb.rebuild_index_from_store().await.unwrap();
    assert_eq!(loaded, stats.chunks_count);
    assert!(kb.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_rebuild_waits_out_concurrent_delete() {
    let store = Arc::new(GatedStore::default());
    let kb = KnowledgeBase::assemble(
        test_config(),
        store.clone(),
        Arc::new(MockProvider::new(DIM)),
        None,
        None,
    )
    .await
    .unwrap();

    let doomed = kb
        .upload_document("Policy", "txt", VACATION, vec![], json!({}))
        .await
        .unwrap();
    kb.upload_document("Ops", "txt", CLUSTERS, vec![], json!({}))
        .await
        .unwrap();
    let doomed_chunk = ChunkId::new(doomed.document.id.clone(), 0).to_string();

    store.arm();
    let rebuild = kb.rebuild_index_from_store();
    let delete = async {
        store.reached.notified().await;
        let delete = kb.delete_document(&doomed.document.id);
        tokio::pin!(delete);
        // The rebuild has read the store, so the delete has to wait for it
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut delete)
            .await
            .is_err());
        store.release.notify_one();
        delete.await
    };
    let (rebuilt, deleted) = tokio::join!(rebuild, delete);

    assert_eq!(rebuilt.unwrap(), 2);
    assert_eq!(deleted.unwrap(), 1);
    assert!(!kb.index().contains(&doomed_chunk).await);
    assert_eq!(kb.index().size().await, 1);
    assert!(kb.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_stale_snapshot_reconciled_on_open() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("index.json");
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    let lost = {
        let kb = persistent_kb(store.clone(), snapshot.clone()).await.unwrap();
        kb.upload_document("Ops", "txt", CLUSTERS, vec![], json!({}))
            .await
            .unwrap();
        let lost = kb
            .upload_document("Policy", "txt", VACATION, vec![], json!({}))
            .await
            .unwrap();
        // A snapshot that missed the last insert, as after a failed save
        let id = ChunkId::new(lost.document.id.clone(), 0).to_string();
        kb.index()
            .mutate(|index| {
                index.remove(&id);
                Ok(())
            })
            .await
            .unwrap();
        id
    };

    let kb = persistent_kb(store, snapshot).await.unwrap();
    assert_eq!(kb.index().size().await, 2);
    assert!(kb.index().contains(&lost).await);
    assert!(kb.stats().await.unwrap().in_sync);
}

#[tokio::test]
async fn test_upload_html_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("leave-policy.html");
    std::fs::write(
        &path,
        "<html><head><title>Leave</title></head><body><h1>Vacation</h1><p>Twenty days of paid leave.</p></body></html>",
    )
    .unwrap();

    let kb = memory_kb(None).await;
    let stats = kb.upload_file(&path, None, vec![]).await.unwrap();

    assert_eq!(stats.document.title, "leave-policy");
    assert_eq!(stats.document.doc_type, "html");
    let details = kb.get_document(&stats.document.id).await.unwrap();
    let metadata = &details.chunks[0].metadata;
    assert_eq!(metadata["fileName"], "leave-policy.html");
    assert_eq!(metadata["htmlTitle"], "Leave");
    assert_eq!(metadata["title"], "leave-policy");
    assert!(details.chunks[0].text.contains("Twenty days of paid leave."));
}

#[tokio::test]
async fn test_upload_pdf_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.pdf");
    std::fs::write(&path, b"%PDF-1.7").unwrap();

    let kb = memory_kb(None).await;
    let result = kb.upload_file(&path, Some("Scan"), vec![]).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(kb.list_documents().await.unwrap().is_empty());
}
