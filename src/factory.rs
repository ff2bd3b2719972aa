use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{env_secret, Config, FetcherKind, GEMINI_API_KEY_ENV, SEARCH_API_KEY_ENV};
use crate::router::Router;
use crate::semantic::{
    BuildOptions, Embedder, EmbeddingClient, IndexBuilder, IndexPaths, InternalSearchService,
};
use crate::web::{
    ExtractionWorker, FetchOrchestrator, GeminiExtractor, HttpFetcher, PageFetcher,
    SerperProvider, WebRetriever,
};

/// Builds the pipeline services from `Config` and environment secrets.
///
/// Missing API keys are not an error here; each client reports its own
/// missing key on first use.
pub struct ServiceFactory;

impl ServiceFactory {
    pub fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
        let client = EmbeddingClient::new(&config.embedding, env_secret(GEMINI_API_KEY_ENV))
            .context("Failed to create embedding client")?;
        Ok(Arc::new(client))
    }

    pub fn index_builder(config: &Config, show_progress: bool) -> Result<IndexBuilder> {
        let options = BuildOptions {
            show_progress,
            ..BuildOptions::from(&config.index)
        };
        Ok(IndexBuilder::new(Self::embedder(config)?, options))
    }

    pub fn internal_search(config: &Config) -> Result<Arc<InternalSearchService>> {
        Ok(Arc::new(InternalSearchService::new(
            Self::embedder(config)?,
            IndexPaths::from_config(config),
        )))
    }

    pub fn page_fetcher(config: &Config) -> Arc<dyn PageFetcher> {
        let timeout = Duration::from_secs(config.extraction.timeout_secs);
        match config.extraction.fetcher {
            FetcherKind::Http => Arc::new(HttpFetcher::new(timeout)),
            #[cfg(feature = "headless")]
            FetcherKind::Headless => Arc::new(crate::web::HeadlessFetcher::new(timeout)),
            #[cfg(not(feature = "headless"))]
            FetcherKind::Headless => {
                log::warn!("built without the headless feature, fetching pages over plain HTTP");
                Arc::new(HttpFetcher::new(timeout))
            }
        }
    }

    pub fn web_retriever(config: &Config) -> Result<WebRetriever> {
        let search = SerperProvider::new(&config.web_search, env_secret(SEARCH_API_KEY_ENV))
            .context("Failed to create search provider")?;
        let extractor = GeminiExtractor::new(&config.extraction, env_secret(GEMINI_API_KEY_ENV))
            .context("Failed to create extraction client")?;

        let worker = ExtractionWorker::new(
            Self::page_fetcher(config),
            Arc::new(extractor),
            config.extraction.page_char_limit,
        );
        let orchestrator = FetchOrchestrator::new(Arc::new(worker), config.router.batch_deadline());

        Ok(WebRetriever::new(Arc::new(search), orchestrator))
    }

    pub fn router(config: &Config) -> Result<Router> {
        Ok(Router::new(
            Self::internal_search(config)?,
            Self::web_retriever(config)?,
            config.router.confidence_threshold,
        ))
    }
}
