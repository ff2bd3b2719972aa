//! Internal semantic search over the news corpus.
//!
//! # Architecture
//!
//! - `embeddings`: blocking client for the embedding service
//! - `preprocess`: text cleaning and vector normalization
//! - `index`: in-memory inner-product index keyed by `vector_id`
//! - `storage`: binary file I/O for the index
//! - `metadata`: CSV table of documents joined on `vector_id`
//! - `dataset`: corpus CSV loader
//! - `builder`: batch index construction
//! - `store`: index + metadata pair and the id join
//! - `service`: query-time search service

mod builder;
mod dataset;
pub mod embeddings;
mod index;
mod metadata;
mod preprocess;
mod service;
mod storage;
mod store;

pub use builder::{dedup_documents, BuildFailure, BuildOptions, BuildReport, IndexBuilder};
pub use dataset::load_documents;
pub use embeddings::{Embedder, EmbeddingClient, EmbeddingError, TaskType};
pub use index::{IndexError, Neighbor, VectorIndex, MAX_K, NOT_FOUND};
pub use metadata::{MetadataError, MetadataTable};
pub use preprocess::{clean_text, l2_norm, normalize, normalized, truncate_chars};
pub use service::{InternalSearchService, SemanticSearchError};
pub use storage::{VectorStorage, VectorStorageError};
pub use store::{IndexPaths, IndexStore};

#[cfg(test)]
pub(crate) use metadata::record;
