//! Fakes and a tiny HTTP stub shared by the integration tests.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::semantic::{
    normalized, Embedder, EmbeddingError, IndexPaths, IndexStore, InternalSearchService,
    MetadataTable, TaskType, VectorIndex,
};
use crate::types::{DocumentRecord, ExtractedArticle, WebCandidate};
use crate::web::{
    FetchOrchestrator, PageExtraction, PageWorker, SearchProviderError, WebRetriever, WebSearch,
    WorkerError,
};

const WORD_DIMS: usize = 64;

/// Bag of words: every lowercased word is hashed onto one of 64 axes.
///
/// Identical texts get identical vectors, so a document searched by its own
/// text scores 1.0.
pub struct WordHashEmbedder;

impl Embedder for WordHashEmbedder {
    fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut v = vec![0.0; WORD_DIMS];
        for word in text.split_whitespace() {
            v[bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(v)
    }

    fn model_name(&self) -> &str {
        "word-hash"
    }
}

fn bucket(word: &str) -> usize {
    let hash = word
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
    (hash % WORD_DIMS as u64) as usize
}

/// Returns a fixed vector per query text; unknown texts fail.
#[derive(Default)]
pub struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl ScriptedEmbedder {
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

impl Embedder for ScriptedEmbedder {
    fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::MalformedResponse(format!("no vector for {text:?}")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn doc(vector_id: i64, title: &str, content: &str) -> DocumentRecord {
    DocumentRecord {
        vector_id,
        title: title.to_string(),
        url: format!("https://news.example/{vector_id}"),
        article_content: content.to_string(),
        metadata: Default::default(),
    }
}

/// Internal search over an in-memory store; vectors are normalized first.
pub fn internal_service(
    embedder: Arc<dyn Embedder>,
    dims: usize,
    docs: Vec<(DocumentRecord, Vec<f32>)>,
) -> Arc<InternalSearchService> {
    let mut index = VectorIndex::new(dims);
    let mut records = vec![];
    for (record, vector) in docs {
        index.insert(record.vector_id, normalized(vector)).unwrap();
        records.push(record);
    }
    let table = MetadataTable::from_records(records).unwrap();

    Arc::new(InternalSearchService::with_store(
        embedder,
        IndexPaths::new("unused.idx", "unused.csv"),
        IndexStore::new(index, table),
    ))
}

/// Returns one candidate per entry of `urls` and counts calls.
#[derive(Default)]
pub struct FakeSearch {
    pub urls: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WebSearch for FakeSearch {
    fn search(&self, _query: &str, k: usize) -> Result<Vec<WebCandidate>, SearchProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .urls
            .iter()
            .take(k)
            .map(|url| WebCandidate {
                title: format!("about {url}"),
                url: url.clone(),
                snippet: "snippet".to_string(),
                source: "web".to_string(),
                provider: "fake".to_string(),
                note: String::new(),
            })
            .collect())
    }
}

/// Search that always fails like an exhausted provider.
pub struct FailingSearch;

impl WebSearch for FailingSearch {
    fn search(&self, _query: &str, _k: usize) -> Result<Vec<WebCandidate>, SearchProviderError> {
        Err(SearchProviderError::RetriesExhausted {
            attempts: 3,
            last: "503 Service Unavailable".to_string(),
        })
    }
}

/// Scores pages by the number embedded in their URL path (`/0.8`).
/// URLs without one yield a page with no article.
pub struct UrlScoreWorker;

impl PageWorker for UrlScoreWorker {
    fn fetch_and_extract(
        &self,
        _query: &str,
        url: &str,
        _snippet: &str,
        max_chars: usize,
    ) -> Result<PageExtraction, WorkerError> {
        let score = url.rsplit('/').next().and_then(|s| s.parse::<f32>().ok());
        let article = score.map(|score| ExtractedArticle {
            title: format!("article {url}"),
            content: "web article body ".repeat(50).chars().take(max_chars).collect(),
            source: "news.example".to_string(),
            published_date: Some("2024-11-02".to_string()),
            url: url.to_string(),
            score,
        });

        Ok(PageExtraction {
            url: url.to_string(),
            status: 200,
            articles_found: usize::from(article.is_some()),
            article,
        })
    }
}

pub fn web_retriever(search: Arc<dyn WebSearch>) -> WebRetriever {
    WebRetriever::new(
        search,
        FetchOrchestrator::new(Arc::new(UrlScoreWorker), Some(Duration::from_secs(5))),
    )
}

/// Serves canned responses in order on a loopback port, repeating the last
/// one, and records every raw request.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn start(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(vec![]));
        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let seen = requests.clone();
        std::thread::spawn(move || {
            for (i, stream) in listener.incoming().enumerate() {
                let Ok(mut stream) = stream else { continue };
                let request = read_request(&mut stream);
                seen.lock().unwrap().push(request);

                let (status, body) = responses
                    .get(i)
                    .or(responses.last())
                    .cloned()
                    .unwrap_or((404, String::new()));
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { url, requests }
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut request = String::new();
    let mut content_length = 0usize;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        request.push_str(&line);
    }

    let mut body = vec![0; content_length];
    if reader.read_exact(&mut body).is_ok() {
        request.push_str("\r\n");
        request.push_str(&String::from_utf8_lossy(&body));
    }
    request
}
