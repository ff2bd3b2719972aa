use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A row of the internal news corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable identifier, shared by the vector index and the metadata table
    pub vector_id: i64,
    pub title: String,
    pub url: String,
    pub article_content: String,
    /// Every other column of the source row (timestamps, sentiment, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A document returned by the internal semantic search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Cosine similarity between the query and the document
    pub score: f32,
    pub vector_id: i64,
    pub title: String,
    pub url: String,
    pub article_content: String,
    pub metadata: BTreeMap<String, String>,
}

impl SearchHit {
    pub fn from_record(record: &DocumentRecord, score: f32) -> Self {
        Self {
            score,
            vector_id: record.vector_id,
            title: record.title.clone(),
            url: record.url.clone(),
            article_content: record.article_content.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// A search provider hit, before the page is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebCandidate {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub provider: String,
    pub note: String,
}

/// An article pulled out of a fetched page by the extraction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub source: String,
    /// `YYYY-MM-DD`, `None` when the model gave no usable date
    pub published_date: Option<String>,
    pub url: String,
    /// Relevance to the query as estimated by the extraction model, in [0, 1]
    pub score: f32,
}

/// Which retrieval tier produced an evidence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Internal,
    Web,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceSource::Internal => write!(f, "internal"),
            EvidenceSource::Web => write!(f, "web"),
        }
    }
}

/// One piece of evidence handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub title: String,
    pub article_content: String,
    pub url: String,
    pub score: Option<f32>,
    /// Internal corpus identifier, only set for internal evidence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_id: Option<i64>,
}

impl From<SearchHit> for EvidenceItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            title: hit.title,
            article_content: hit.article_content,
            url: hit.url,
            score: Some(hit.score),
            news_id: Some(hit.vector_id),
        }
    }
}

/// Ranked evidence plus the tier it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub results: Vec<EvidenceItem>,
}

impl Evidence {
    pub fn top_score(&self) -> Option<f32> {
        self.results.first().and_then(|r| r.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_serializes_source_lowercase() {
        let evidence = Evidence {
            source: EvidenceSource::Web,
            results: vec![EvidenceItem {
                title: "t".to_string(),
                article_content: "c".to_string(),
                url: "https://example.com".to_string(),
                score: Some(0.7),
                news_id: None,
            }],
        };

        let json = serde_json::to_value(&evidence).unwrap();
        assert_eq!(json["source"], "web");
        assert!(json["results"][0].get("news_id").is_none());
        assert_eq!(json["results"][0]["article_content"], "c");
    }

    #[test]
    fn test_search_hit_into_evidence_keeps_id() {
        let record = DocumentRecord {
            vector_id: 42,
            title: "Title".to_string(),
            url: "https://news.example/42".to_string(),
            article_content: "Body".to_string(),
            metadata: BTreeMap::new(),
        };
        let item: EvidenceItem = SearchHit::from_record(&record, 0.9).into();

        assert_eq!(item.news_id, Some(42));
        assert_eq!(item.score, Some(0.9));
        assert_eq!(item.title, "Title");
    }
}
