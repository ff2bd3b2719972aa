//! Tier selection: internal index first, web fallback when it is not confident.
//!
//! ```text
//! Start -> InternalAttempted -> AcceptInternal -> Done
//!                            \-> WebAttempted  -> Done
//! ```
//!
//! Errors from either tier end the request. An internal failure is never
//! mistaken for low confidence.

use std::sync::Arc;

use crate::errors::ErrorKind;
use crate::rerank::rerank;
use crate::semantic::{InternalSearchService, SemanticSearchError, MAX_K};
use crate::types::{Evidence, EvidenceItem, EvidenceSource, SearchHit};
use crate::web::{SearchProviderError, WebRetriever};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Start,
    InternalAttempted,
    AcceptInternal,
    WebAttempted,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal search failed: {0}")]
    Internal(#[from] SemanticSearchError),

    #[error("Web search failed: {0}")]
    Web(#[from] SearchProviderError),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::EmptyQuery | RouterError::InvalidArgument(_) => ErrorKind::Validation,
            RouterError::Internal(e) => e.kind(),
            RouterError::Web(e) => e.kind(),
        }
    }
}

pub struct Router {
    internal: Arc<InternalSearchService>,
    web: WebRetriever,
    /// Internal top score must be strictly above this
    threshold: f32,
}

impl Router {
    pub fn new(internal: Arc<InternalSearchService>, web: WebRetriever, threshold: f32) -> Self {
        Self {
            internal,
            web,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn internal(&self) -> &InternalSearchService {
        &self.internal
    }

    /// Best evidence for `query` and the tier it came from.
    pub fn get_answer(&self, query: &str, k: usize, max_chars: usize) -> Result<Evidence, RouterError> {
        let query = validate(query, k)?;
        validate_max_chars(max_chars)?;

        let mut state = RouteState::Start;

        let internal: Vec<EvidenceItem> = self
            .internal
            .search(query, k)?
            .into_iter()
            .map(EvidenceItem::from)
            .collect();
        state = transition(state, RouteState::InternalAttempted);

        let internal = rerank(internal, query, k);
        let top = internal.first().and_then(|r| r.score);

        if top.is_some_and(|score| score > self.threshold) {
            state = transition(state, RouteState::AcceptInternal);
            log::info!("answering from internal index top={top:?} results={}", internal.len());
            transition(state, RouteState::Done);
            return Ok(Evidence {
                source: EvidenceSource::Internal,
                results: internal,
            });
        }

        log::info!(
            "internal top={top:?} not above threshold={}, falling back to web",
            self.threshold
        );
        let web = self.web.retrieve(query, k, max_chars)?;
        state = transition(state, RouteState::WebAttempted);

        let web = rerank(web, query, k);
        log::info!("answering from web results={}", web.len());
        transition(state, RouteState::Done);

        Ok(Evidence {
            source: EvidenceSource::Web,
            results: web,
        })
    }

    /// Internal tier only, no reranking.
    pub fn search_internal(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, RouterError> {
        let query = validate(query, k)?;
        Ok(self.internal.search(query, k)?)
    }

    /// Web tier only, reranked.
    pub fn search_web(&self, query: &str, k: usize, max_chars: usize) -> Result<Vec<EvidenceItem>, RouterError> {
        let query = validate(query, k)?;
        validate_max_chars(max_chars)?;
        let items = self.web.retrieve(query, k, max_chars)?;
        Ok(rerank(items, query, k))
    }
}

fn validate(query: &str, k: usize) -> Result<&str, RouterError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RouterError::EmptyQuery);
    }
    if k == 0 {
        return Err(RouterError::InvalidArgument("k must be greater than 0".to_string()));
    }
    if k > MAX_K {
        return Err(RouterError::InvalidArgument(format!("k must be at most {MAX_K}")));
    }
    Ok(query)
}

fn validate_max_chars(max_chars: usize) -> Result<(), RouterError> {
    if max_chars == 0 {
        return Err(RouterError::InvalidArgument("max_chars must be greater than 0".to_string()));
    }
    Ok(())
}

fn transition(from: RouteState, to: RouteState) -> RouteState {
    log::debug!("route {from:?} -> {to:?}");
    to
}
