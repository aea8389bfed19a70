//! Shared, persisted access to the vector index.
//!
//! Searches take a read guard. Every mutation takes the write guard, mutates
//! in memory, writes the snapshot and only then releases the guard, so no
//! reader ever observes a half-rebuilt mapping and snapshots land on disk in
//! mutation order. The file write itself runs on the blocking pool.

use crate::persistence;
use crate::vector_index::{BatchInsertReport, IndexError, SearchHit, VectorIndex};
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, RwLockReadGuard};

pub struct IndexHandle {
    index: RwLock<VectorIndex>,
    snapshot_path: Option<PathBuf>,
}

impl IndexHandle {
    /// Wrap an index, persisting to `snapshot_path` after each mutation.
    pub fn new(index: VectorIndex, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            index: RwLock::new(index),
            snapshot_path,
        }
    }

    /// An empty index that is never written to disk.
    pub fn in_memory(dimension: usize) -> Self {
        Self::new(VectorIndex::new(dimension), None)
    }

    /// Load the snapshot at `path`, starting empty if there is none.
    pub fn load(path: &Path, dimension: usize) -> Result<Self, IndexError> {
        let index = persistence::load_snapshot(path, dimension)?
            .unwrap_or_else(|| VectorIndex::new(dimension));
        Ok(Self::new(index, Some(path.to_path_buf())))
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Read access for queries spanning several calls.
    pub async fn read(&self) -> RwLockReadGuard<'_, VectorIndex> {
        self.index.read().await
    }

    /// Run `f` under the write guard and persist the result before releasing it.
    ///
    /// A failed `f` is not persisted. A failed save is returned even though
    /// the in-memory change stays applied; the snapshot can be rebuilt from
    /// the document store.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R, IndexError>
    where
        F: FnOnce(&mut VectorIndex) -> Result<R, IndexError>,
    {
        let mut index = self.index.write().await;
        let result = f(&mut *index)?;

        if let Some(path) = &self.snapshot_path {
            let state = index.export_state();
            let target = path.clone();
            tokio::task::spawn_blocking(move || persistence::write_state(&target, state))
                .await
                .map_err(|e| IndexError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
                .map_err(|e| {
                    tracing::error!("Failed to persist index snapshot to {:?}: {}", path, e);
                    e
                })?;
        }

        Ok(result)
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.index.read().await.search(query, k)
    }

    pub async fn insert_batch(
        &self,
        entries: Vec<(String, Vec<f32>)>,
    ) -> Result<BatchInsertReport, IndexError> {
        self.mutate(|index| index.insert_batch(entries)).await
    }

    pub async fn remove_batch(&self, ids: &[String]) -> Result<usize, IndexError> {
        self.mutate(|index| Ok(index.remove_batch(ids.iter().map(String::as_str))))
            .await
    }

    pub async fn rebuild_from(&self, pairs: Vec<(String, Vec<f32>)>) -> Result<usize, IndexError> {
        self.mutate(|index| Ok(index.rebuild_from(pairs))).await
    }

    /// Write the current state without changing it.
    pub async fn persist(&self) -> Result<(), IndexError> {
        self.mutate(|_| Ok(())).await
    }

    pub async fn size(&self) -> usize {
        self.index.read().await.size()
    }

    pub async fn dimension(&self) -> usize {
        self.index.read().await.dimension()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.index.read().await.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        let handle = IndexHandle::load(&path, 2).unwrap();

        handle
            .insert_batch(vec![
                ("d1:0".to_string(), vec![1.0, 0.0]),
                ("d1:1".to_string(), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(handle.remove_batch(&["d1:0".to_string()]).await.unwrap(), 1);

        let reopened = IndexHandle::load(&path, 2).unwrap();
        assert_eq!(reopened.size().await, 1);
        assert!(reopened.contains("d1:1").await);
    }

    #[tokio::test]
    async fn test_failed_mutation_not_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        let handle = IndexHandle::load(&path, 2).unwrap();

        let result = handle
            .insert_batch(vec![("d1:0".to_string(), vec![1.0])])
            .await;
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_search_and_insert() {
        let handle = Arc::new(IndexHandle::in_memory(2));

        let mut tasks = Vec::new();
        for doc in 0..8 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                handle
                    .insert_batch(vec![(format!("d{}:0", doc), vec![0.6, 0.8])])
                    .await
                    .unwrap();
                handle.search(&[0.6, 0.8], 3).await.unwrap().len()
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap() >= 1);
        }
        assert_eq!(handle.size().await, 8);
    }
}
