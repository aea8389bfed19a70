//! Exact inner-product vector index keyed by external chunk identifiers.
//!
//! Vectors live in a dense, position-addressed array. Positions are internal
//! and are reassigned by every [`VectorIndex::rebuild`]; callers only ever
//! see external identifiers (`"{document_id}:{local_index}"`).
//!
//! Scores are raw inner products. The index never normalizes, so vectors are
//! expected to be unit length already (the embedding providers guarantee
//! this), which makes the score equal to cosine similarity.

use docqa_core::AppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Index-level failures.
///
/// Absence of an identifier is never an error here: removals report `false`
/// and searches return fewer hits.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        AppError::Knowledge(err.to_string())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Outcome of [`VectorIndex::insert_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchInsertReport {
    pub inserted: Vec<String>,
    /// Ids that were already present and left untouched
    pub skipped: Vec<String>,
}

/// Full exported index state, the unit of persistence.
///
/// Mapping tables are stored as pairs ordered by position so that the same
/// index always serializes to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexState {
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
    pub id_to_position: Vec<(String, usize)>,
    pub position_to_id: Vec<(usize, String)>,
    pub next_position: usize,
}

/// Brute-force inner-product index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    /// `None` marks a removed slot awaiting the next rebuild
    vectors: Vec<Option<Vec<f32>>>,
    id_to_position: HashMap<String, usize>,
    position_to_id: BTreeMap<usize, String>,
    next_position: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            id_to_position: HashMap::new(),
            position_to_id: BTreeMap::new(),
            next_position: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn size(&self) -> usize {
        self.id_to_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_position.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_position.contains_key(id)
    }

    /// The stored vector for `id`.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        let position = *self.id_to_position.get(id)?;
        self.vectors.get(position)?.as_deref()
    }

    /// Indexed identifiers in position order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.position_to_id.values().map(String::as_str)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn append(&mut self, id: String, vector: Vec<f32>) -> usize {
        let position = self.next_position;
        self.vectors.push(Some(vector));
        self.id_to_position.insert(id.clone(), position);
        self.position_to_id.insert(position, id);
        self.next_position += 1;
        position
    }

    /// Insert one vector, returning its position.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> Result<usize, IndexError> {
        let id = id.into();
        self.check_dimension(&vector)?;

        if self.contains(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        Ok(self.append(id, vector))
    }

    /// Append many vectors in order.
    ///
    /// Every vector is dimension-checked before anything is appended, so a
    /// mismatch leaves the index untouched. Ids already present (including
    /// repeats earlier in the same batch) are skipped and reported.
    pub fn insert_batch<I>(&mut self, entries: I) -> Result<BatchInsertReport, IndexError>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let entries: Vec<(String, Vec<f32>)> = entries.into_iter().collect();
        for (_, vector) in &entries {
            self.check_dimension(vector)?;
        }

        let mut report = BatchInsertReport::default();
        for (id, vector) in entries {
            if self.contains(&id) {
                tracing::debug!("Skipping already indexed id {}", id);
                report.skipped.push(id);
                continue;
            }
            self.append(id.clone(), vector);
            report.inserted.push(id);
        }

        tracing::debug!(
            "Batch insert: {} inserted, {} skipped (size now {})",
            report.inserted.len(),
            report.skipped.len(),
            self.size()
        );

        Ok(report)
    }

    fn mark_removed(&mut self, id: &str) -> bool {
        match self.id_to_position.remove(id) {
            Some(position) => {
                self.position_to_id.remove(&position);
                if let Some(slot) = self.vectors.get_mut(position) {
                    *slot = None;
                }
                true
            }
            None => false,
        }
    }

    /// Remove one id. Returns `false` if it was not indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.mark_removed(id);
        if removed {
            self.rebuild();
        }
        removed
    }

    /// Remove many ids with a single rebuild, returning how many were present.
    ///
    /// Prefer this over looping [`VectorIndex::remove`]; every rebuild is
    /// O(size × dimension).
    pub fn remove_batch<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let removed = ids.into_iter().filter(|id| self.mark_removed(id)).count();

        if removed > 0 {
            self.rebuild();
        }

        removed
    }

    /// Exact top-`k` search by descending inner product.
    ///
    /// `k` is clamped to the index size; an empty index yields no hits. Equal
    /// scores keep insertion order. Low or negative scores are never dropped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimension(query)?;

        let k = k.min(self.size());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.as_ref().map(|v| (position, dot(query, v))))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(position, score)| {
                self.position_to_id.get(&position).map(|id| SearchHit {
                    id: id.clone(),
                    score,
                })
            })
            .collect())
    }

    /// Compact storage: drop removed slots and reassign dense positions.
    ///
    /// Surviving vectors keep their relative order. Running it twice in a
    /// row leaves the mapping unchanged.
    pub fn rebuild(&mut self) {
        let old_vectors = std::mem::take(&mut self.vectors);
        let mut old_ids = std::mem::take(&mut self.position_to_id);
        self.id_to_position.clear();
        self.next_position = 0;

        for (position, slot) in old_vectors.into_iter().enumerate() {
            let Some(vector) = slot else {
                continue;
            };
            match old_ids.remove(&position) {
                Some(id) => {
                    self.append(id, vector);
                }
                None => tracing::warn!("Dropping orphaned vector at position {}", position),
            }
        }

        tracing::debug!("Rebuilt vector index ({} vectors)", self.size());
    }

    /// Discard all state and load `pairs` from scratch.
    ///
    /// Pairs with the wrong dimension or a repeated id are skipped with a
    /// warning. Returns the number of vectors loaded.
    pub fn rebuild_from<I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        *self = Self::new(self.dimension);

        let mut skipped = 0;
        for (id, vector) in pairs {
            if let Err(e) = self.check_dimension(&vector) {
                tracing::warn!("Skipping {} during rebuild: {}", id, e);
                skipped += 1;
                continue;
            }
            if self.contains(&id) {
                tracing::warn!("Skipping duplicate {} during rebuild", id);
                skipped += 1;
                continue;
            }
            self.append(id, vector);
        }

        tracing::info!(
            "Rebuilt vector index from {} vectors ({} skipped)",
            self.size(),
            skipped
        );

        self.size()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        *self = Self::new(self.dimension);
    }

    /// Export the full state. Removed slots are compacted away first.
    pub fn export_state(&self) -> VectorIndexState {
        let mut compact = self.clone();
        if compact.vectors.iter().any(Option::is_none) {
            compact.rebuild();
        }

        VectorIndexState {
            dimension: compact.dimension,
            vectors: compact.vectors.into_iter().flatten().collect(),
            id_to_position: compact
                .position_to_id
                .iter()
                .map(|(position, id)| (id.clone(), *position))
                .collect(),
            position_to_id: compact.position_to_id.into_iter().collect(),
            next_position: compact.next_position,
        }
    }

    /// Restore from an exported state, validating its structure.
    ///
    /// Broken mappings or wrong-length vectors are a
    /// [`IndexError::CorruptSnapshot`]. Vectors without an id or a stale
    /// position counter are repaired by a rebuild.
    pub fn from_state(state: VectorIndexState) -> Result<Self, IndexError> {
        if state.dimension == 0 {
            return Err(IndexError::CorruptSnapshot("dimension is 0".to_string()));
        }

        if let Some((position, v)) = state
            .vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != state.dimension)
        {
            return Err(IndexError::CorruptSnapshot(format!(
                "vector at position {} has {} components, expected {}",
                position,
                v.len(),
                state.dimension
            )));
        }

        let count = state.vectors.len();
        let mut id_to_position = HashMap::with_capacity(state.id_to_position.len());
        for (id, position) in state.id_to_position {
            if position >= count {
                return Err(IndexError::CorruptSnapshot(format!(
                    "id {} points past the end ({} >= {})",
                    id, position, count
                )));
            }
            if id_to_position.insert(id.clone(), position).is_some() {
                return Err(IndexError::CorruptSnapshot(format!("id {} mapped twice", id)));
            }
        }

        let mut position_to_id = BTreeMap::new();
        for (position, id) in state.position_to_id {
            if id_to_position.get(&id) != Some(&position) {
                return Err(IndexError::CorruptSnapshot(format!(
                    "mapping tables disagree on {} at position {}",
                    id, position
                )));
            }
            if position_to_id.insert(position, id).is_some() {
                return Err(IndexError::CorruptSnapshot(format!(
                    "position {} mapped twice",
                    position
                )));
            }
        }

        if position_to_id.len() != id_to_position.len() {
            return Err(IndexError::CorruptSnapshot(
                "mapping tables have different sizes".to_string(),
            ));
        }

        let mut index = Self {
            dimension: state.dimension,
            vectors: state.vectors.into_iter().map(Some).collect(),
            id_to_position,
            position_to_id,
            next_position: state.next_position,
        };

        if index.size() != count || index.next_position != count {
            tracing::warn!(
                "Snapshot has {} vectors, {} mapped ids and counter {}; rebuilding",
                count,
                index.size(),
                index.next_position
            );
            index.rebuild();
        }

        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_d() -> VectorIndex {
        let mut index = VectorIndex::new(2);
        index.insert("d1:0", vec![1.0, 0.0]).unwrap();
        index.insert("d1:1", vec![0.0, 1.0]).unwrap();
        index
    }

    fn assert_consistent(index: &VectorIndex) {
        assert_eq!(index.id_to_position.len(), index.position_to_id.len());
        for (id, position) in &index.id_to_position {
            assert_eq!(index.position_to_id.get(position), Some(id));
        }
        for position in 0..index.size() {
            assert!(index.vectors[position].is_some(), "hole at {}", position);
        }
        assert_eq!(index.vectors.len(), index.size());
        assert_eq!(index.next_position, index.size());
    }

    #[test]
    fn test_search_exact_match() {
        let index = two_d();
        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                id: "d1:0".to_string(),
                score: 1.0
            }]
        );
    }

    #[test]
    fn test_remove_then_search() {
        let mut index = two_d();
        assert!(index.remove("d1:0"));
        assert_eq!(index.size(), 1);

        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                id: "d1:1".to_string(),
                score: 0.0
            }]
        );
        assert_consistent(&index);
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(2);
        let err = index.insert("d1:0", vec![1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut index = two_d();
        let err = index.insert("d1:0", vec![0.5, 0.5]).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(id) if id == "d1:0"));
        assert_eq!(index.get("d1:0"), Some(&[1.0, 0.0][..]));
    }

    #[test]
    fn test_insert_batch_skips_existing() {
        let mut index = two_d();
        let report = index
            .insert_batch(vec![
                ("d1:1".to_string(), vec![0.7, 0.7]),
                ("d2:0".to_string(), vec![0.6, 0.8]),
                ("d2:0".to_string(), vec![0.8, 0.6]),
            ])
            .unwrap();

        assert_eq!(report.inserted, vec!["d2:0".to_string()]);
        assert_eq!(report.skipped, vec!["d1:1".to_string(), "d2:0".to_string()]);
        assert_eq!(index.size(), 3);
        assert_eq!(index.get("d2:0"), Some(&[0.6, 0.8][..]));
        assert_consistent(&index);
    }

    #[test]
    fn test_insert_batch_dimension_checked_before_mutation() {
        let mut index = two_d();
        let result = index.insert_batch(vec![
            ("d2:0".to_string(), vec![0.6, 0.8]),
            ("d2:1".to_string(), vec![1.0]),
        ]);

        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert_eq!(index.size(), 2);
        assert!(!index.contains("d2:0"));
    }

    #[test]
    fn test_remove_absent_returns_false() {
        let mut index = two_d();
        assert!(!index.remove("d9:0"));
        assert_eq!(index.size(), 2);
    }

    #[test]
    fn test_remove_batch_consistency() {
        let mut index = VectorIndex::new(3);
        let vectors = [
            ("a:0", [1.0f32, 0.0, 0.0]),
            ("a:1", [0.0, 1.0, 0.0]),
            ("b:0", [0.0, 0.0, 1.0]),
            ("b:1", [0.6, 0.8, 0.0]),
            ("c:0", [0.0, 0.6, 0.8]),
        ];
        for (id, v) in vectors {
            index.insert(id, v.to_vec()).unwrap();
        }

        let removed = index.remove_batch(["a:1", "b:0", "missing:0"]);
        assert_eq!(removed, 2);
        assert_eq!(index.size(), 3);
        assert!(!index.contains("a:1"));
        assert!(!index.contains("b:0"));
        assert_consistent(&index);

        for (id, v) in vectors.iter().filter(|(id, _)| index.contains(id)) {
            let hits = index.search(v, 1).unwrap();
            assert_eq!(hits[0].id, *id);
            assert_eq!(index.get(id), Some(&v[..]));
        }
    }

    #[test]
    fn test_remove_batch_nothing_matched_keeps_positions() {
        let mut index = two_d();
        assert_eq!(index.remove_batch(["x:0"]), 0);
        assert_eq!(index.id_to_position["d1:1"], 1);
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_wrong_dimension() {
        let index = two_d();
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_search_clamps_k_and_keeps_low_scores() {
        let mut index = two_d();
        index.insert("d2:0", vec![-1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[2].id, "d2:0");
        assert_eq!(hits[2].score, -1.0);
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2);
        index.insert("late:0", vec![0.0, 1.0]).unwrap();
        index.insert("x:0", vec![1.0, 0.0]).unwrap();
        index.insert("y:0", vec![1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, "x:0");
        assert_eq!(hits[1].id, "y:0");
    }

    #[test]
    fn test_rebuild_idempotent() {
        let mut index = two_d();
        index.insert("d2:0", vec![0.6, 0.8]).unwrap();
        index.remove("d1:0");

        let first = index.export_state();
        index.rebuild();
        let second = index.export_state();
        index.rebuild();
        assert_eq!(first, second);
        assert_eq!(second, index.export_state());
    }

    #[test]
    fn test_rebuild_from_skips_bad_dimensions() {
        let mut index = two_d();
        let loaded = index.rebuild_from(vec![
            ("x:0".to_string(), vec![1.0, 0.0]),
            ("x:1".to_string(), vec![1.0, 0.0, 0.0]),
            ("x:2".to_string(), vec![0.0, 1.0]),
            ("x:2".to_string(), vec![0.6, 0.8]),
        ]);

        assert_eq!(loaded, 2);
        assert!(!index.contains("d1:0"));
        assert!(index.contains("x:0"));
        assert!(!index.contains("x:1"));
        assert_eq!(index.get("x:2"), Some(&[0.0, 1.0][..]));
        assert_consistent(&index);
    }

    #[test]
    fn test_state_round_trip() {
        let mut index = two_d();
        index.insert("d2:0", vec![0.6, 0.8]).unwrap();
        index.remove("d1:1");

        let state = index.export_state();
        assert_eq!(state.next_position, 2);
        assert_eq!(
            state.position_to_id,
            vec![(0, "d1:0".to_string()), (1, "d2:0".to_string())]
        );

        let restored = VectorIndex::from_state(state.clone()).unwrap();
        assert_eq!(restored.export_state(), state);
        assert_eq!(
            restored.search(&[0.6, 0.8], 2).unwrap(),
            index.search(&[0.6, 0.8], 2).unwrap()
        );
    }

    #[test]
    fn test_from_state_rejects_disagreeing_maps() {
        let mut state = two_d().export_state();
        state.position_to_id[0].1 = "d1:1".to_string();
        assert!(matches!(
            VectorIndex::from_state(state),
            Err(IndexError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_from_state_rejects_wrong_vector_length() {
        let mut state = two_d().export_state();
        state.vectors[1] = vec![1.0];
        assert!(matches!(
            VectorIndex::from_state(state),
            Err(IndexError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_from_state_repairs_orphaned_vector() {
        let mut state = two_d().export_state();
        state.vectors.push(vec![0.6, 0.8]);
        state.next_position = 3;

        let index = VectorIndex::from_state(state).unwrap();
        assert_eq!(index.size(), 2);
        assert_consistent(&index);
    }

    #[test]
    fn test_index_error_into_app_error() {
        let err: AppError = IndexError::DuplicateId("d1:0".to_string()).into();
        assert!(matches!(err, AppError::Knowledge(msg) if msg.contains("d1:0")));
    }
}
