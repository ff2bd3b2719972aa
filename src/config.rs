use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

/// Environment variable holding the Gemini key used for embeddings and extraction
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Environment variable holding the news search provider key
pub const SEARCH_API_KEY_ENV: &str = "SERPAPI_API_KEY";

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.0-flash-001";
const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/news";

/// Accept internal hits only above this cosine similarity
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Domains that block automated fetching or only add noise
const DEFAULT_DISALLOWED_DOMAINS: &[&str] = &[
    "facebook.com",
    "x.com",
    "twitter.com",
    "t.co",
    "instagram.com",
    "linkedin.com",
    "pinterest.com",
    "tiktok.com",
    "reddit.com",
];

/// Read a secret from the environment, treating an empty value as absent.
pub fn env_secret(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// News corpus used by `build`
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Binary vector index
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Metadata table joined on `vector_id`
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Column holding the article body in the corpus
    #[serde(default = "default_text_column")]
    pub text_column: String,

    /// Column holding the corpus identifier; row numbers are used when absent
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Concurrent embedding calls during a build
    #[serde(default = "default_build_workers")]
    pub build_workers: usize,

    /// Pause the build after this many completed embeddings (0 disables)
    #[serde(default = "default_pause_every")]
    pub pause_every: usize,

    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
            text_column: default_text_column(),
            id_column: default_id_column(),
            build_workers: default_build_workers(),
            pause_every: default_pause_every(),
            pause_ms: default_pause_ms(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("news.csv")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index/news.idx")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("index/news_metadata.csv")
}

fn default_text_column() -> String {
    "article_content".to_string()
}

fn default_id_column() -> String {
    "news_id".to_string()
}

fn default_build_workers() -> usize {
    4
}

fn default_pause_every() -> usize {
    10
}

fn default_pause_ms() -> u64 {
    1000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Attempts per text when the service rate limits us
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff step, doubled on every retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gemini_endpoint(),
            model: default_embedding_model(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_gemini_endpoint() -> String {
    GEMINI_ENDPOINT.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_embedding_timeout_secs() -> u64 {
    120
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// `gl` parameter
    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_google_domain")]
    pub google_domain: String,

    /// Hosts (and their subdomains) never handed to the fetcher
    #[serde(default = "default_disallowed_domains")]
    pub disallowed_domains: Vec<String>,

    /// Sleep before each retry of a 429/5xx response
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: Vec<u64>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            country: default_country(),
            location: default_location(),
            google_domain: default_google_domain(),
            disallowed_domains: default_disallowed_domains(),
            retry_backoff_secs: default_retry_backoff_secs(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_search_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.to_string()
}

fn default_country() -> String {
    "my".to_string()
}

fn default_location() -> String {
    "Malaysia".to_string()
}

fn default_google_domain() -> String {
    "google.com.my".to_string()
}

fn default_disallowed_domains() -> Vec<String> {
    DEFAULT_DISALLOWED_DOMAINS
        .iter()
        .map(|d| d.to_string())
        .collect()
}

fn default_retry_backoff_secs() -> Vec<u64> {
    vec![1, 2, 4]
}

fn default_http_timeout_secs() -> u64 {
    20
}

/// How candidate pages are retrieved before extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Plain HTTP GET
    Http,
    /// Headless Chrome, for pages that need JavaScript
    Headless,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_extraction_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Page text sent to the model is cut at this many characters
    #[serde(default = "default_page_char_limit")]
    pub page_char_limit: usize,

    #[serde(default = "default_fetcher")]
    pub fetcher: FetcherKind,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gemini_endpoint(),
            model: default_extraction_model(),
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
            page_char_limit: default_page_char_limit(),
            fetcher: default_fetcher(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_extraction_model() -> String {
    DEFAULT_EXTRACTION_MODEL.to_string()
}

fn default_max_output_tokens() -> u32 {
    1200
}

fn default_page_char_limit() -> usize {
    24_000
}

fn default_fetcher() -> FetcherKind {
    FetcherKind::Http
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Internal top hit must score strictly above this
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    #[serde(default = "default_k")]
    pub default_k: usize,

    #[serde(default = "default_max_chars")]
    pub default_max_chars: usize,

    /// Give up on pages still being fetched after this long (0 waits forever)
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            default_k: default_k(),
            default_max_chars: default_max_chars(),
            batch_deadline_secs: default_batch_deadline_secs(),
        }
    }
}

impl RouterConfig {
    pub fn batch_deadline(&self) -> Option<Duration> {
        match self.batch_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_k() -> usize {
    3
}

fn default_max_chars() -> usize {
    8000
}

fn default_batch_deadline_secs() -> u64 {
    90
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("router.confidence_threshold must be between 0.0 and 1.0, got {threshold}");
        }

        if self.router.default_k == 0 {
            bail!("router.default_k must be greater than 0");
        }

        if self.router.default_max_chars == 0 {
            bail!("router.default_max_chars must be greater than 0");
        }

        if self.index.build_workers == 0 {
            bail!("index.build_workers must be greater than 0");
        }

        if self.embedding.max_retries == 0 {
            bail!("embedding.max_retries must be greater than 0");
        }

        if self.index.text_column.trim().is_empty() {
            bail!("index.text_column must not be empty");
        }

        for (name, endpoint) in [
            ("embedding.endpoint", &self.embedding.endpoint),
            ("web_search.endpoint", &self.web_search.endpoint),
            ("extraction.endpoint", &self.extraction.endpoint),
        ] {
            url::Url::parse(endpoint)
                .with_context(|| format!("{name} is not a valid URL: {endpoint:?}"))?;
        }

        if !(0.0..=2.0).contains(&self.extraction.temperature) {
            bail!(
                "extraction.temperature must be between 0.0 and 2.0, got {}",
                self.extraction.temperature
            );
        }

        Ok(())
    }

    /// Base directory from `NEWSRAG_HOME`, falling back to the working directory.
    pub fn default_base_path() -> PathBuf {
        std::env::var("NEWSRAG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&Self::default_base_path())
    }

    /// Load `config.yaml` from `base_path`, writing the defaults on first run.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&path, defaults)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&path, config_str)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path against the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
