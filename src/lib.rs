//! Hybrid evidence retrieval for news questions.
//!
//! A query is answered from a precomputed semantic index of the internal
//! news corpus when the best hit is confident enough, and from a live web
//! search with LLM-guided page extraction otherwise.
//!
//! # Architecture
//!
//! - `semantic`: embedding client, vector index, persistence, internal search
//! - `web`: search provider, page fetchers, extraction worker, fan-out
//! - `rerank`: score / keyword-overlap reordering shared by both tiers
//! - `router`: the tier selection policy and the `get_answer` entry point
//! - `server`: JSON-over-HTTP daemon for the chat layer
//! - `factory`: wires the services together from `Config`

pub mod config;
pub mod errors;
pub mod factory;
pub mod rerank;
pub mod router;
pub mod semantic;
pub mod server;
pub mod types;
pub mod web;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use errors::ErrorKind;
pub use router::{Router, RouterError};
pub use types::{Evidence, EvidenceItem, EvidenceSource};
