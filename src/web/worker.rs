//! One candidate URL in, at most one article out.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::ErrorKind;
use crate::semantic::truncate_chars;
use crate::types::ExtractedArticle;
use crate::web::extract::{ArticleExtractor, ExtractError};
use crate::web::fetch::{page_text, FetchError, PageFetcher};

/// Result of working one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageExtraction {
    pub url: String,
    pub status: u16,
    /// First article the model found, content cut to `max_chars`
    pub article: Option<ExtractedArticle>,
    /// How many valid articles the model returned for the page
    pub articles_found: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Fetch(_) => ErrorKind::TransientProvider,
            WorkerError::Extract(e) => e.kind(),
        }
    }
}

pub trait PageWorker: Send + Sync {
    fn fetch_and_extract(
        &self,
        query: &str,
        url: &str,
        snippet: &str,
        max_chars: usize,
    ) -> Result<PageExtraction, WorkerError>;
}

/// Fetch the page, reduce it to text, let the extraction model find articles.
pub struct ExtractionWorker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ArticleExtractor>,
    /// Page text sent to the model is cut at this many characters
    page_char_limit: usize,
}

impl ExtractionWorker {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn ArticleExtractor>,
        page_char_limit: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            page_char_limit,
        }
    }
}

impl PageWorker for ExtractionWorker {
    fn fetch_and_extract(
        &self,
        query: &str,
        url: &str,
        snippet: &str,
        max_chars: usize,
    ) -> Result<PageExtraction, WorkerError> {
        let page = self.fetcher.fetch(url)?;
        let text = page_text(&page.html);
        log::debug!(
            "fetcher={} url={url} status={} text_chars={}",
            self.fetcher.name(),
            page.status,
            text.chars().count()
        );

        let text = truncate_chars(&text, self.page_char_limit);
        let articles = self.extractor.extract(query, snippet, &page.url, text)?;
        let articles_found = articles.len();

        // only the first article on a page is used as evidence
        let article = articles.into_iter().next().map(|mut article| {
            article.content = truncate_chars(&article.content, max_chars).to_string();
            article
        });

        log::info!("extracted url={url} articles={articles_found}");

        Ok(PageExtraction {
            url: page.url,
            status: page.status,
            article,
            articles_found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::fetch::FetchedPage;
    use std::sync::Mutex;

    struct StaticFetcher(&'static str);

    impl PageFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                html: self.0.to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    /// Records the page text it was given and returns two articles.
    #[derive(Default)]
    struct RecordingExtractor {
        seen: Mutex<Vec<String>>,
    }

    impl ArticleExtractor for RecordingExtractor {
        fn extract(
            &self,
            _query: &str,
            _snippet: &str,
            url: &str,
            page_text: &str,
        ) -> Result<Vec<ExtractedArticle>, ExtractError> {
            self.seen.lock().unwrap().push(page_text.to_string());
            let article = |title: &str, score: f32| ExtractedArticle {
                title: title.to_string(),
                content: "0123456789".to_string(),
                source: "test".to_string(),
                published_date: None,
                url: url.to_string(),
                score,
            };
            Ok(vec![article("first", 0.3), article("second", 0.9)])
        }
    }

    #[test]
    fn test_keeps_first_article_truncated() {
        let extractor = Arc::new(RecordingExtractor::default());
        let worker = ExtractionWorker::new(
            Arc::new(StaticFetcher("<p>Hello page</p><script>x()</script>")),
            extractor.clone(),
            1000,
        );

        let result = worker
            .fetch_and_extract("q", "https://news.example/a", "", 4)
            .unwrap();

        assert_eq!(result.articles_found, 2);
        let article = result.article.unwrap();
        assert_eq!(article.title, "first");
        assert_eq!(article.content, "0123");
        assert_eq!(extractor.seen.lock().unwrap()[0], "Hello page");
    }

    #[test]
    fn test_fetch_error_propagates() {
        struct Failing;
        impl PageFetcher for Failing {
            fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }

        let worker = ExtractionWorker::new(
            Arc::new(Failing),
            Arc::new(RecordingExtractor::default()),
            1000,
        );
        let err = worker
            .fetch_and_extract("q", "https://news.example/a", "", 100)
            .unwrap_err();
        assert!(matches!(err, WorkerError::Fetch(FetchError::Status { status: 404, .. })));
    }
}
