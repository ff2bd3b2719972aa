//! Web fallback: news search, page fetching and LLM extraction.
//!
//! # Architecture
//!
//! - `lang`: query language detection for the search locale
//! - `search`: news search provider
//! - `fetch`: HTTP and headless page fetchers, HTML to text
//! - `extract`: LLM extraction and lenient output parsing
//! - `worker`: fetch + extract for one candidate
//! - `orchestrator`: concurrent fan-out over all candidates

pub mod extract;
pub mod fetch;
pub mod lang;
pub mod orchestrator;
pub mod search;
pub mod worker;

use std::sync::Arc;

pub use extract::{ArticleExtractor, ExtractError, GeminiExtractor};
#[cfg(feature = "headless")]
pub use fetch::HeadlessFetcher;
pub use fetch::{FetchError, FetchedPage, HttpFetcher, PageFetcher};
pub use lang::{detect_locale, Locale};
pub use orchestrator::{FetchFailure, FetchOrchestrator, FetchOutcome};
pub use search::{SearchProviderError, SerperProvider, WebSearch};
pub use worker::{ExtractionWorker, PageExtraction, PageWorker, WorkerError};

use crate::types::EvidenceItem;

/// Search, fetch every hit, keep the pages where an article was found.
pub struct WebRetriever {
    search: Arc<dyn WebSearch>,
    orchestrator: FetchOrchestrator,
}

impl WebRetriever {
    pub fn new(search: Arc<dyn WebSearch>, orchestrator: FetchOrchestrator) -> Self {
        Self {
            search,
            orchestrator,
        }
    }

    /// Evidence items in candidate order, unranked.
    ///
    /// Provider errors propagate; page failures and pages without an
    /// article are dropped.
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        max_chars: usize,
    ) -> Result<Vec<EvidenceItem>, SearchProviderError> {
        let candidates = self.search.search(query, k)?;
        if candidates.is_empty() {
            log::info!("web search returned no candidates");
            return Ok(vec![]);
        }

        let outcomes = self.orchestrator.run(query, &candidates, max_chars);

        let items = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(page) => page.article.map(|article| EvidenceItem {
                    title: article.title,
                    article_content: article.content,
                    url: page.url,
                    score: Some(article.score),
                    news_id: None,
                }),
                Err(failure) => {
                    log::debug!("dropping failed page {failure}");
                    None
                }
            })
            .collect::<Vec<_>>();

        log::info!(
            "web evidence candidates={} usable={}",
            candidates.len(),
            items.len()
        );
        Ok(items)
    }
}
