//! In-memory inner-product index keyed by corpus identifier.
//!
//! Vectors are expected to be unit-normalized, so the inner product is the
//! cosine similarity. Search is exact.

use std::collections::HashMap;

use crate::errors::ErrorKind;
use crate::semantic::metadata::MetadataError;
use crate::semantic::preprocess::dot;
use crate::semantic::storage::VectorStorageError;

/// Identifier reported for result slots the index could not fill
pub const NOT_FOUND: i64 = -1;

/// Largest `k` a single search may ask for
pub const MAX_K: usize = 1000;

/// Inner-product index addressed by stable `vector_id`s rather than insertion order.
pub struct VectorIndex {
    /// vector_id -> unit vector
    entries: HashMap<i64, Vec<f32>>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// One slot of a search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    /// Inner product with the query
    pub score: f32,
}

impl Neighbor {
    fn empty() -> Self {
        Self {
            id: NOT_FOUND,
            score: f32::MIN,
        }
    }

    pub fn is_found(&self) -> bool {
        self.id != NOT_FOUND
    }
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a vector under `id`.
    ///
    /// Identifiers are never overwritten: a second insert of the same id is
    /// an error, which keeps the id <-> metadata mapping one-to-one.
    pub fn insert(&mut self, id: i64, embedding: Vec<f32>) -> Result<(), IndexError> {
        if id == NOT_FOUND {
            return Err(IndexError::ReservedId(id));
        }

        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if self.entries.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        self.entries.insert(id, embedding);
        Ok(())
    }

    pub fn get(&self, id: i64) -> Option<&[f32]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterate over all entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f32])> {
        let mut ids: Vec<i64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(move |id| (id, self.entries[&id].as_slice()))
    }

    /// Return exactly `k` slots ordered by inner product, best first.
    ///
    /// When the index holds fewer than `k` vectors the remaining slots carry
    /// `NOT_FOUND`. Equal scores are ordered by ascending id. `k` above
    /// `MAX_K` is refused before anything is allocated.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k > MAX_K {
            return Err(IndexError::TooManyResults { k, max: MAX_K });
        }

        if !self.entries.is_empty() && query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|(id, v)| Neighbor {
                id: *id,
                score: dot(query, v),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        scored.truncate(k);
        scored.resize(k, Neighbor::empty());

        Ok(scored)
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Duplicate vector id {0}")]
    DuplicateId(i64),

    #[error("Vector id {0} is reserved")]
    ReservedId(i64),

    #[error("Requested {k} results, at most {max} are allowed")]
    TooManyResults { k: usize, max: usize },

    #[error("Index file not found: {path}")]
    NotFound { path: String },

    #[error("Vector id {vector_id} has no metadata row; index and metadata are out of sync")]
    LookupInconsistency { vector_id: i64 },

    #[error("No embeddings were created successfully")]
    NoEmbeddings,

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::LookupInconsistency { .. } => ErrorKind::LookupInconsistency,
            IndexError::Storage(e) => e.kind(),
            IndexError::Metadata(e) => e.kind(),
            IndexError::DuplicateId(_)
            | IndexError::ReservedId(_)
            | IndexError::TooManyResults { .. } => ErrorKind::Validation,
            IndexError::DimensionMismatch { .. }
            | IndexError::NotFound { .. }
            | IndexError::NoEmbeddings
            | IndexError::Pool(_) => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::preprocess::normalized;

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(768);
        assert_eq!(index.dimensions(), 768);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = VectorIndex::new(3);
        index.insert(7, vec![1.0, 0.0, 0.0]).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains(7));
        assert_eq!(index.get(7).unwrap(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(1, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut index = VectorIndex::new(2);
        index.insert(5, vec![1.0, 0.0]).unwrap();

        let result = index.insert(5, vec![0.0, 1.0]);
        assert!(matches!(result, Err(IndexError::DuplicateId(5))));
        assert_eq!(index.get(5).unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_sentinel_id_rejected() {
        let mut index = VectorIndex::new(2);
        assert!(matches!(
            index.insert(NOT_FOUND, vec![1.0, 0.0]),
            Err(IndexError::ReservedId(_))
        ));
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let mut index = VectorIndex::new(3);
        index.insert(10, normalized(vec![1.0, 0.0, 0.0])).unwrap();
        index.insert(20, normalized(vec![0.0, 1.0, 0.0])).unwrap();
        index.insert(30, normalized(vec![1.0, 1.0, 0.0])).unwrap();

        let query = normalized(vec![1.0, 0.1, 0.0]);
        let results = index.search(&query, 3).unwrap();

        assert_eq!(results[0].id, 10);
        assert_eq!(results[1].id, 30);
        assert_eq!(results[2].id, 20);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_pads_with_sentinel() {
        let mut index = VectorIndex::new(2);
        index.insert(1, vec![1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_found());
        assert_eq!(results[1].id, NOT_FOUND);
        assert_eq!(results[2].id, NOT_FOUND);
    }

    #[test]
    fn test_search_refuses_huge_k() {
        let mut index = VectorIndex::new(2);
        index.insert(1, vec![1.0, 0.0]).unwrap();

        let result = index.search(&[1.0, 0.0], usize::MAX);
        assert!(matches!(
            result,
            Err(IndexError::TooManyResults { k: usize::MAX, max: MAX_K })
        ));
        assert_eq!(index.search(&[1.0, 0.0], MAX_K).unwrap().len(), MAX_K);
    }

    #[test]
    fn test_search_empty_index_any_dimension() {
        let index = VectorIndex::new(0);
        let results = index.search(&[0.5, 0.5], 2).unwrap();
        assert!(results.iter().all(|n| !n.is_found()));
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut index = VectorIndex::new(2);
        index.insert(9, vec![1.0, 0.0]).unwrap();
        index.insert(3, vec![1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].id, 3);
        assert_eq!(results[1].id, 9);
    }

    #[test]
    fn test_iter_sorted() {
        let mut index = VectorIndex::new(1);
        index.insert(5, vec![1.0]).unwrap();
        index.insert(1, vec![1.0]).unwrap();
        let ids: Vec<i64> = index.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 5]);
    }
}
