//! Schema-guided article extraction with an LLM.
//!
//! The model gets the query, the provider snippet and the page text, and
//! answers with a JSON array of articles, each scored for relevance. Model
//! output is untrusted: anything that does not fit the article schema is
//! dropped here, and unparseable output means "no articles", never an error.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ExtractionConfig;
use crate::errors::{kind_for_status, ErrorKind};
use crate::types::ExtractedArticle;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Missing extraction API key (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Extraction service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Extraction request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::MissingApiKey => ErrorKind::Configuration,
            ExtractError::Service { status, .. } => kind_for_status(*status),
            ExtractError::Transport(_) => ErrorKind::TransientProvider,
        }
    }
}

/// What the worker needs from an extraction model.
pub trait ArticleExtractor: Send + Sync {
    /// Articles found in `page_text`, in the order the model listed them.
    fn extract(
        &self,
        query: &str,
        snippet: &str,
        url: &str,
        page_text: &str,
    ) -> Result<Vec<ExtractedArticle>, ExtractError>;
}

/// Gemini `generateContent` in JSON mode.
pub struct GeminiExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiExtractor {
    pub fn new(config: &ExtractionConfig, api_key: Option<String>) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body(&self, prompt: String) -> GenerateRequest {
        GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                response_mime_type: "application/json",
                response_schema: article_schema(),
            },
        }
    }
}

impl ArticleExtractor for GeminiExtractor {
    fn extract(
        &self,
        query: &str,
        snippet: &str,
        url: &str,
        page_text: &str,
    ) -> Result<Vec<ExtractedArticle>, ExtractError> {
        let api_key = self.api_key.as_deref().ok_or(ExtractError::MissingApiKey)?;

        let prompt = format!(
            "{}\n\nPage URL: {url}\n\nCrawled content:\n{page_text}",
            build_instruction(query, snippet)
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&self.request_body(prompt))
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            log::error!("extraction failed url={url} status={status} body={body}");
            return Err(ExtractError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = match resp.json() {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("extraction response for {url} is not JSON: {err}");
                return Ok(vec![]);
            }
        };

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(parse_articles(&text, url))
    }
}

/// Prompt prefix asking for every article on the page, scored against the query.
pub fn build_instruction(query: &str, snippet: &str) -> String {
    format!(
        "Extract only the most relevant facts about the query.\n\
         Query: {query}\n\
         Snippet: {snippet}\n\n\
         From the crawled content, extract all news articles. \
         For each article, assign a 'score' field between 0 (not relevant) and 1 (highly relevant) \
         indicating how relevant the article is to the query. \
         Do not miss any news. One extracted article should look like this: \
         {{\"title\": \"title text\", \"content\": \"full article text\", \"source\": \"source name\", \
         \"published_date\": \"YYYY-MM-DD\", \"url\": \"https://article.url\", \"score\": 0.95}}."
    )
}

/// Response schema handed to the model.
pub fn article_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": {"type": "STRING", "description": "Title of the news article."},
                "content": {"type": "STRING", "description": "Full article text."},
                "source": {"type": "STRING", "description": "Source name."},
                "published_date": {"type": "STRING", "description": "Published date in YYYY-MM-DD format."},
                "url": {"type": "STRING", "description": "URL of the article."},
                "score": {"type": "NUMBER", "description": "Relevance score to the query, between 0 (not relevant) and 1 (highly relevant)."}
            },
            "required": ["title", "content", "source", "published_date", "url", "score"]
        }
    })
}

/// Validate raw model output into articles.
///
/// Accepts a JSON array, an `{"articles": [...]}` wrapper or a single
/// object, optionally inside a Markdown code fence. Elements missing a
/// title or content, or with a score outside [0, 1], are skipped. A
/// missing url falls back to `page_url`; an unusable date becomes `None`.
pub fn parse_articles(raw: &str, page_url: &str) -> Vec<ExtractedArticle> {
    let raw = strip_code_fence(raw);
    if raw.is_empty() {
        log::warn!("extraction for {page_url} returned nothing");
        return vec![];
    }

    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("could not parse extracted content for {page_url} as JSON: {err}");
            return vec![];
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("articles") {
            Some(Value::Array(items)) => items,
            Some(_) => vec![],
            None => vec![Value::Object(map)],
        },
        _ => {
            log::warn!("extracted content for {page_url} is not an object or array");
            vec![]
        }
    };

    let total = items.len();
    let articles: Vec<ExtractedArticle> = items
        .into_iter()
        .filter_map(|item| validate_article(item, page_url))
        .collect();

    if articles.len() < total {
        log::warn!(
            "skipped {} of {total} extracted articles for {page_url}",
            total - articles.len()
        );
    }

    articles
}

fn validate_article(item: Value, page_url: &str) -> Option<ExtractedArticle> {
    let raw: RawArticle = serde_json::from_value(item).ok()?;

    let title = non_empty(raw.title)?;
    let content = non_empty(raw.content)?;
    let score = match raw.score? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return None;
    }

    let url = non_empty(raw.url).unwrap_or_else(|| page_url.to_string());
    let source = non_empty(raw.source).unwrap_or_else(|| host_of(&url));

    Some(ExtractedArticle {
        title,
        content,
        source,
        published_date: raw.published_date.as_deref().and_then(normalize_date),
        url,
        score: score as f32,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "web".to_string())
}

/// `YYYY-MM-DD` from a date or an RFC 3339 timestamp.
fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

fn strip_code_fence(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    // drop the language tag line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    content: Option<String>,
    source: Option<String>,
    published_date: Option<String>,
    url: Option<String>,
    score: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
