//! Page retrieval for the extraction worker.
//!
//! `HttpFetcher` is a plain GET with retries that falls back to `OPT_PROXY`
//! after a failure. `HeadlessFetcher` drives Chrome for pages that only
//! render with JavaScript.

use std::error::Error;
use std::thread::sleep;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::StatusCode;
use scraper::{Html, Node};

const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Elements whose text is never article content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "svg", "template", "iframe"];

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}: invalid URL")]
    InvalidUrl(String),

    #[error("{url}: server returned {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: giving up after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("{url}: browser error: {message}")]
    Browser { url: String, message: String },
}

/// Anything that can turn a URL into HTML.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Get the name of this fetcher for logging/debugging
    fn name(&self) -> &'static str;
}

pub struct HttpFetcher {
    timeout: Duration,
    max_attempts: u32,
    /// Multiplied by the attempt number after a 429
    rate_limit_backoff: Duration,
    proxy: Option<String>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let proxy = std::env::var("OPT_PROXY").ok().filter(|p| !p.is_empty());
        Self {
            timeout,
            max_attempts: 4,
            rate_limit_backoff: Duration::from_secs(4),
            proxy,
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32, rate_limit_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.rate_limit_backoff = rate_limit_backoff;
        self
    }

    fn client(&self, use_proxy: bool) -> Result<reqwest::blocking::Client, String> {
        let mut client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .timeout(self.timeout)
            .pool_idle_timeout(Duration::from_secs(10));

        if let (true, Some(proxy)) = (use_proxy, &self.proxy) {
            log::debug!("using proxy {proxy:#?}");
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| e.to_string())?;
            client = client.proxy(proxy);
        }

        client.build().map_err(|e| e.to_string())
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let url = if url.starts_with("//") {
            format!("https:{url}")
        } else {
            url.to_string()
        };

        let url_parsed =
            reqwest::Url::parse(&url).map_err(|_| FetchError::InvalidUrl(url.clone()))?;
        let host = url_parsed.host_str().unwrap_or_default();
        let iden = format!("{host}{}", url_parsed.path());

        let mut force_proxy = false;
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                log::debug!("{iden}: retrying");
            }

            let client = match self.client(force_proxy) {
                Ok(client) => client,
                Err(err) => {
                    last = err;
                    break;
                }
            };

            log::debug!("{iden}: requesting");

            let resp = match client.get(&url).send() {
                Ok(r) => r,
                Err(err) => {
                    force_proxy = true;
                    last = get_error(&err);
                    log::warn!("{iden}: {err}: {last}");
                    continue;
                }
            };

            let status = resp.status();

            if status.is_success() {
                // we might get OK, but no body
                let bytes = match resp.bytes() {
                    Ok(b) => b,
                    Err(err) => {
                        force_proxy = true;
                        last = err.to_string();
                        continue;
                    }
                };

                return Ok(FetchedPage {
                    url,
                    status: status.as_u16(),
                    html: String::from_utf8_lossy(&bytes).to_string(),
                });
            }

            log::debug!("{iden}: {status}");
            last = status.to_string();

            if status == StatusCode::TOO_MANY_REQUESTS {
                sleep(self.rate_limit_backoff * attempt);
                continue;
            }

            if status.is_client_error() {
                // no need to try again, it's over...
                if force_proxy || self.proxy.is_none() {
                    return Err(FetchError::Status {
                        url,
                        status: status.as_u16(),
                    });
                }

                force_proxy = true;
            }
        }

        Err(FetchError::Exhausted {
            url,
            attempts: self.max_attempts,
            last,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

#[cfg(feature = "headless")]
pub use headless::HeadlessFetcher;

#[cfg(feature = "headless")]
mod headless {
    use std::path::PathBuf;
    use std::thread::sleep;
    use std::time::Duration;

    use headless_chrome::protocol::cdp::Target::CreateTarget;
    use headless_chrome::{Browser, LaunchOptionsBuilder};

    use super::{FetchError, FetchedPage, PageFetcher};

    /// Renders the page in Chrome (`CHROME_PATH`, default `chromium`).
    pub struct HeadlessFetcher {
        timeout: Duration,
        /// Time given to client-side rendering after navigation
        settle: Duration,
    }

    impl HeadlessFetcher {
        pub fn new(timeout: Duration) -> Self {
            Self {
                timeout,
                settle: Duration::from_secs(2),
            }
        }

        fn render(&self, url: &str, proxy: Option<&str>) -> Result<String, String> {
            let chrome_path = std::env::var("CHROME_PATH").unwrap_or("chromium".to_string());
            let options = LaunchOptionsBuilder::default()
                .proxy_server(proxy)
                .path(Some(PathBuf::from(chrome_path)))
                .build()
                .map_err(|e| e.to_string())?;

            let browser = Browser::new(options).map_err(|e| format!("failed to start chrome: {e}"))?;
            let tab = browser
                .new_tab_with_options(CreateTarget {
                    url: "about:blank".to_string(),
                    width: Some(1366),
                    height: Some(768),
                    browser_context_id: None,
                    enable_begin_frame_control: None,
                    new_window: None,
                    background: None,
                    left: None,
                    top: None,
                    window_state: None,
                    for_tab: None,
                    hidden: None,
                })
                .map_err(|e| e.to_string())?;

            tab.set_default_timeout(self.timeout);
            tab.navigate_to(url).map_err(|e| e.to_string())?;
            tab.wait_until_navigated().map_err(|e| e.to_string())?;

            sleep(self.settle);

            let html = tab.get_content().map_err(|e| e.to_string());
            let _ = tab.close(true);
            html
        }
    }

    impl PageFetcher for HeadlessFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            let opt_proxy = std::env::var("OPT_PROXY").ok().filter(|p| !p.is_empty());

            let html = match self.render(url, None) {
                Ok(html) => html,
                Err(err) if opt_proxy.is_some() => {
                    log::warn!("{url}: {err}, retrying through proxy");
                    self.render(url, opt_proxy.as_deref())
                        .map_err(|message| FetchError::Browser {
                            url: url.to_string(),
                            message,
                        })?
                }
                Err(message) => {
                    return Err(FetchError::Browser {
                        url: url.to_string(),
                        message,
                    })
                }
            };

            Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                html,
            })
        }

        fn name(&self) -> &'static str {
            "headless"
        }
    }
}

/// Readable text of an HTML document: every text node outside of
/// scripts, styles and similar, one line per node.
pub fn page_text(html: &str) -> String {
    static BLANKS: Lazy<regex::Regex> =
        Lazy::new(|| regex::Regex::new(r"[ \t\u{a0}]+").expect("Failed to compile whitespace regex"));

    let document = Html::parse_document(html);
    let mut lines: Vec<String> = vec![];

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIPPED_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        if skipped {
            continue;
        }

        let line = BLANKS.replace_all(text.trim(), " ");
        if !line.is_empty() {
            lines.push(line.into_owned());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_text_skips_scripts_and_styles() {
        let html = r#"
            <html>
              <head><title>Floods in Kelantan</title><style>body { color: red }</style></head>
              <body>
                <script>var tracking = "nope";</script>
                <h1>Floods   worsen</h1>
                <p>Thousands evacuated &amp; relocated.</p>
                <noscript>enable js</noscript>
              </body>
            </html>"#;

        let text = page_text(html);
        assert_eq!(
            text,
            "Floods in Kelantan\nFloods worsen\nThousands evacuated & relocated."
        );
    }

    #[test]
    fn test_invalid_url() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1));
        assert!(matches!(
            fetcher.fetch("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    #[ignore = "requires network"]
    fn test_fetch_live_page() {
        let fetcher = HttpFetcher::new(Duration::from_secs(10));
        let page = fetcher.fetch("https://example.com").unwrap();
        assert_eq!(page.status, 200);
        assert!(page_text(&page.html).contains("Example Domain"));
    }
}
