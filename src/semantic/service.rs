//! Internal semantic search over the persisted news index.
//!
//! Provides a high-level interface for semantic search operations:
//! - Lazy-loads the vector index and metadata table on first search
//! - Embeds the query with the retrieval-query task type
//! - Thread-safe with interior mutability for lazy initialization

use std::sync::{Arc, Mutex};

use crate::errors::ErrorKind;
use crate::semantic::embeddings::{Embedder, EmbeddingError, TaskType};
use crate::semantic::index::IndexError;
use crate::semantic::preprocess::normalized;
use crate::semantic::store::{IndexPaths, IndexStore};
use crate::types::SearchHit;

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SemanticSearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SemanticSearchError::Embedding(e) => e.kind(),
            SemanticSearchError::Index(e) => e.kind(),
            SemanticSearchError::Internal(_) => ErrorKind::LookupInconsistency,
        }
    }
}

/// Top-k nearest documents for a query.
///
/// Loads the index lazily on first search. Thread-safe through interior
/// mutability; searches share the loaded store through an `Arc` so the
/// lock is only held while opening.
pub struct InternalSearchService {
    embedder: Arc<dyn Embedder>,
    paths: IndexPaths,
    /// Uses Mutex<Option<_>> instead of OnceLock because get_or_try_init is unstable.
    state: Mutex<Option<Arc<IndexStore>>>,
}

impl InternalSearchService {
    pub fn new(embedder: Arc<dyn Embedder>, paths: IndexPaths) -> Self {
        Self {
            embedder,
            paths,
            state: Mutex::new(None),
        }
    }

    /// Serve an already built store without touching disk.
    pub fn with_store(embedder: Arc<dyn Embedder>, paths: IndexPaths, store: IndexStore) -> Self {
        Self {
            embedder,
            paths,
            state: Mutex::new(Some(Arc::new(store))),
        }
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Embed `query`, normalize it, and return up to `k` hits best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, SemanticSearchError> {
        let store = self.store()?;

        let query_embedding = normalized(self.embedder.embed(query, TaskType::Query)?);
        let hits = store.query(&query_embedding, k)?;

        log::debug!(
            "internal search k={k} hits={} top={:?}",
            hits.len(),
            hits.first().map(|h| h.score)
        );
        Ok(hits)
    }

    /// Load the index now instead of on the first search.
    pub fn open(&self) -> Result<(), SemanticSearchError> {
        self.store().map(|_| ())
    }

    /// Drop the loaded index. The next search opens it again.
    pub fn close(&self) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = None;
        }
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .ok()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Number of indexed documents, 0 if not yet opened.
    pub fn indexed_count(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.len()))
            .unwrap_or(0)
    }

    fn store(&self) -> Result<Arc<IndexStore>, SemanticSearchError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(store) = guard.as_ref() {
            return Ok(store.clone());
        }

        log::info!(
            "Opening internal index with model '{}'",
            self.embedder.model_name()
        );
        let store = Arc::new(IndexStore::open(&self.paths, &self.embedder.model_id())?);
        *guard = Some(store.clone());
        Ok(store)
    }
}
