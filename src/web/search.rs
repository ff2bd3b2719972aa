//! News search provider.
//!
//! Turns a query into `WebCandidate`s. The query language decides the
//! `hl` parameter; queries in unsupported languages are not searched at all.

use std::thread::sleep;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::WebSearchConfig;
use crate::errors::{kind_for_status, ErrorKind};
use crate::semantic::truncate_chars;
use crate::types::WebCandidate;
use crate::web::lang::detect_locale;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const PROVIDER_NAME: &str = "serper";
const CANDIDATE_NOTE: &str = "Searched from the web";
const MAX_SNIPPET_CHARS: usize = 400;
const MAX_RESULTS: usize = 10;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("Failed to compile entity regex")
});

#[derive(Debug, thiserror::Error)]
pub enum SearchProviderError {
    #[error("No search provider configured (set SERPAPI_API_KEY)")]
    NoProviderConfigured,

    #[error("Search provider still failing after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },

    #[error("Search provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode search response: {0}")]
    Decode(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl SearchProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchProviderError::NoProviderConfigured | SearchProviderError::Client(_) => {
                ErrorKind::Configuration
            }
            SearchProviderError::Status { status, .. } => kind_for_status(*status),
            SearchProviderError::RetriesExhausted { .. } | SearchProviderError::Decode(_) => {
                ErrorKind::TransientProvider
            }
        }
    }
}

/// Anything that can produce candidate pages for a query.
pub trait WebSearch: Send + Sync {
    /// At most `k` candidates, provider order.
    fn search(&self, query: &str, k: usize) -> Result<Vec<WebCandidate>, SearchProviderError>;
}

/// Serper news endpoint.
pub struct SerperProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    country: String,
    location: String,
    google_domain: String,
    disallowed_domains: Vec<String>,
    /// Sleep before each attempt; the first entry is the initial request
    schedule: Vec<Duration>,
}

impl SerperProvider {
    pub fn new(config: &WebSearchConfig, api_key: Option<String>) -> Result<Self, SearchProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let schedule = std::iter::once(Duration::ZERO)
            .chain(config.retry_backoff_secs.iter().map(|s| Duration::from_secs(*s)))
            .collect();

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            country: config.country.clone(),
            location: config.location.clone(),
            google_domain: config.google_domain.clone(),
            disallowed_domains: config
                .disallowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_lowercase())
                .collect(),
            schedule,
        })
    }

    fn request_news(
        &self,
        params: &[(&str, String)],
        api_key: &str,
    ) -> Result<NewsResponse, SearchProviderError> {
        let mut last = String::new();

        for (attempt, backoff) in self.schedule.iter().enumerate() {
            if !backoff.is_zero() {
                sleep(*backoff);
            }

            let resp = match self
                .client
                .get(&self.endpoint)
                .header("X-API-KEY", api_key)
                .query(params)
                .send()
            {
                Ok(resp) => resp,
                Err(err) => {
                    log::warn!("search request failed (attempt {}): {err}", attempt + 1);
                    last = err.to_string();
                    continue;
                }
            };

            let status = resp.status();
            if is_retryable(status) {
                log::warn!("retryable search status={status} attempt={}", attempt + 1);
                last = status.to_string();
                continue;
            }

            if !status.is_success() {
                let body = resp.text().unwrap_or_default();
                log::error!("search failed status={status} body={body}");
                return Err(SearchProviderError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return resp
                .json::<NewsResponse>()
                .map_err(|e| SearchProviderError::Decode(e.to_string()));
        }

        Err(SearchProviderError::RetriesExhausted {
            attempts: self.schedule.len(),
            last,
        })
    }

    fn to_candidates(&self, response: NewsResponse, k: usize) -> Vec<WebCandidate> {
        response
            .news
            .into_iter()
            .filter_map(|item| {
                let link = item.link.filter(|l| !l.trim().is_empty())?;
                if is_disallowed(&link, &self.disallowed_domains) {
                    log::debug!("dropping disallowed result {link}");
                    return None;
                }
                Some(WebCandidate {
                    title: item.title.unwrap_or_default(),
                    url: link,
                    snippet: clean_snippet(item.snippet.as_deref().unwrap_or_default()),
                    source: item
                        .source
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "web".to_string()),
                    provider: PROVIDER_NAME.to_string(),
                    note: CANDIDATE_NOTE.to_string(),
                })
            })
            .take(k)
            .collect()
    }
}

impl WebSearch for SerperProvider {
    fn search(&self, query: &str, k: usize) -> Result<Vec<WebCandidate>, SearchProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SearchProviderError::NoProviderConfigured)?;

        let Some(locale) = detect_locale(query) else {
            log::info!("unsupported query language, no web search");
            return Ok(vec![]);
        };

        if k == 0 {
            return Ok(vec![]);
        }

        let params = [
            ("engine", "google".to_string()),
            ("location", self.location.clone()),
            ("q", query.to_string()),
            ("hl", locale.hl().to_string()),
            ("gl", self.country.clone()),
            ("num", k.clamp(1, MAX_RESULTS).to_string()),
            ("google_domain", self.google_domain.clone()),
            ("api_key", api_key.to_string()),
        ];

        let response = self.request_news(&params, api_key)?;
        let candidates = self.to_candidates(response, k);
        log::info!("web search hl={} candidates={}", locale.hl(), candidates.len());

        Ok(candidates)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// True when the URL's host is one of `domains` or a subdomain of one.
/// Links that do not parse are treated as disallowed.
pub fn is_disallowed(link: &str, domains: &[String]) -> bool {
    let host = match url::Url::parse(link) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => return true,
        },
        Err(_) => return true,
    };

    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Unescape HTML entities, collapse whitespace, cut at 400 characters.
pub fn clean_snippet(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let unescaped = unescape_entities(text);
    let collapsed = WHITESPACE.replace_all(&unescaped, " ");

    truncate_chars(collapsed.trim(), MAX_SNIPPET_CHARS).to_string()
}

/// Decode numeric and common named entities in one pass. Markup is left
/// alone, so `x<y` survives; unknown entities stay as written.
fn unescape_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name.strip_prefix('#') {
                Some(num) => {
                    let code = match num.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
                None => named_entity(name),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        _ => return None,
    };
    Some(c)
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    news: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        WebSearchConfig::default().disallowed_domains
    }

    fn provider() -> SerperProvider {
        SerperProvider::new(&WebSearchConfig::default(), Some("key".to_string())).unwrap()
    }

    #[test]
    fn test_disallowed_hosts_and_subdomains() {
        let d = domains();
        assert!(is_disallowed("https://facebook.com/story", &d));
        assert!(is_disallowed("https://m.facebook.com/story", &d));
        assert!(is_disallowed("https://t.co/abc", &d));
        assert!(is_disallowed("not a url", &d));
        assert!(!is_disallowed("https://www.thestar.com.my/news", &d));
        // substring is not enough
        assert!(!is_disallowed("https://notx.com/a", &d));
        assert!(!is_disallowed("https://example.com/facebook.com", &d));
    }

    #[test]
    fn test_clean_snippet() {
        assert_eq!(
            clean_snippet("Ringgit &amp; bonds\n\n  rally &quot;sharply&quot;"),
            "Ringgit & bonds rally \"sharply\""
        );
        assert_eq!(clean_snippet(""), "");
        assert_eq!(clean_snippet("RM1&#8217;s &#x41;&amp;lt; &bogus;"), "RM1\u{2019}s A&lt; &bogus;");

        let long = "a ".repeat(500);
        assert_eq!(clean_snippet(&long).chars().count(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn test_clean_snippet_keeps_angle_brackets() {
        assert_eq!(
            clean_snippet("inflation x<y while rates &gt; 3% stay"),
            "inflation x<y while rates > 3% stay"
        );
        assert_eq!(clean_snippet("<b>Banjir</b> kilat"), "<b>Banjir</b> kilat");
    }

    #[test]
    fn test_candidates_filtered_and_capped() {
        let response: NewsResponse = serde_json::from_value(serde_json::json!({
            "news": [
                {"title": "One", "link": "https://www.bernama.com/1", "snippet": "s1", "source": "Bernama"},
                {"title": "Social", "link": "https://www.facebook.com/post", "snippet": "s"},
                {"title": "No link", "snippet": "s"},
                {"title": "Two", "link": "https://www.malaymail.com/2", "snippet": "s2"},
                {"title": "Three", "link": "https://www.thestar.com.my/3", "snippet": "s3"}
            ]
        }))
        .unwrap();

        let candidates = provider().to_candidates(response, 2);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source, "Bernama");
        assert_eq!(candidates[1].title, "Two");
        assert_eq!(candidates[1].source, "web");
        assert_eq!(candidates[1].provider, "serper");
        assert_eq!(candidates[1].note, "Searched from the web");
    }

    #[test]
    fn test_missing_key() {
        let provider = SerperProvider::new(&WebSearchConfig::default(), None).unwrap();
        let err = provider.search("latest news on floods", 3).unwrap_err();
        assert!(matches!(err, SearchProviderError::NoProviderConfigured));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_unsupported_language_skips_request() {
        // endpoint is unreachable, so any request would fail
        let mut config = WebSearchConfig::default();
        config.endpoint = "http://127.0.0.1:9/news".to_string();
        config.retry_backoff_secs = vec![];
        let provider = SerperProvider::new(&config, Some("key".to_string())).unwrap();

        let results = provider.search("Quelle est la capitale de la France ?", 3).unwrap();
        assert!(results.is_empty());
    }
}
