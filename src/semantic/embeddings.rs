//! Gemini embedding client.
//!
//! Provides a blocking interface for turning text into vectors:
//! - Input cleaning before every request
//! - Exponential backoff on HTTP 429
//! - Document and query task types through one call
//!
//! Vectors come back raw. Normalization is `preprocess::normalize`.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::errors::{kind_for_status, ErrorKind};
use crate::semantic::preprocess::clean_text;

/// Instruction hint telling the service how the vector will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Document,
    Query,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Text is empty after cleaning")]
    EmptyInput,

    #[error("Missing embedding API key (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Embedding service rate limited {attempts} attempts in a row")]
    RateLimited { attempts: u32 },

    #[error("Embedding service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected embedding response: {0}")]
    MalformedResponse(String),
}

impl EmbeddingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::EmptyInput => ErrorKind::Validation,
            EmbeddingError::MissingApiKey => ErrorKind::Configuration,
            EmbeddingError::Service { status, .. } => kind_for_status(*status),
            EmbeddingError::RateLimited { .. }
            | EmbeddingError::Transport(_)
            | EmbeddingError::MalformedResponse(_) => ErrorKind::TransientProvider,
        }
    }
}

/// Anything that can turn text into a vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, EmbeddingError>;

    /// Name of the model producing the vectors, recorded in the index header
    fn model_name(&self) -> &str;

    /// SHA256 of the model name, used to refuse indexes built by another model.
    fn model_id(&self) -> [u8; 32] {
        model_id_hash(self.model_name())
    }
}

/// Compute SHA256 hash of the model name for storage identification.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Blocking client for the `embedContent` endpoint.
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
}

impl EmbeddingClient {
    /// Build a client. A missing key is only reported when `embed` is called.
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/{}:embedContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        })
    }

    fn retry_backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.pow(attempt.min(6))
    }
}

impl Embedder for EmbeddingClient {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        let text = clean_text(text).ok_or(EmbeddingError::EmptyInput)?;
        let api_key = self.api_key.as_deref().ok_or(EmbeddingError::MissingApiKey)?;

        let model = format!("models/{}", self.model);
        let request = EmbedRequest {
            model: &model,
            content: Content {
                parts: vec![Part { text: &text }],
            },
            task_type: task.as_str(),
        };

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .query(&[("key", api_key)])
                .json(&request)
                .send();

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        attempt += 1;
                        if attempt >= self.max_retries {
                            log::error!("embedding rate limited, giving up after {attempt} attempts");
                            return Err(EmbeddingError::RateLimited { attempts: attempt });
                        }
                        let wait = self.retry_backoff(attempt - 1);
                        log::warn!(
                            "embedding rate limited, waiting {}ms (attempt {attempt}/{})",
                            wait.as_millis(),
                            self.max_retries
                        );
                        thread::sleep(wait);
                        continue;
                    }

                    if !status.is_success() {
                        let body = resp
                            .text()
                            .unwrap_or_else(|_| "<body unavailable>".to_string());
                        log::error!("embedding request failed status={status} body={body}");
                        return Err(EmbeddingError::Service {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    let parsed: EmbedResponse = resp
                        .json()
                        .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

                    return match parsed.embedding {
                        Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
                        _ => Err(EmbeddingError::MalformedResponse(
                            "no embedding in response".to_string(),
                        )),
                    };
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(err.into());
                    }
                    log::warn!("embedding request failed (attempt {attempt}): {err}");
                    thread::sleep(self.retry_backoff(attempt - 1));
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}
