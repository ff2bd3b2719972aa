//! Relevance reordering shared by both retrieval tiers.

use std::collections::HashSet;

use crate::types::{EvidenceItem, SearchHit};

/// Anything the reranker can order.
pub trait Rankable {
    fn score(&self) -> Option<f32>;
    fn title(&self) -> &str;
    fn body(&self) -> &str;
}

impl Rankable for EvidenceItem {
    fn score(&self) -> Option<f32> {
        self.score
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.article_content
    }
}

impl Rankable for SearchHit {
    fn score(&self) -> Option<f32> {
        Some(self.score)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.article_content
    }
}

/// Order `results` best first and keep `top_k`.
///
/// When any result carries a score only the scored results are kept,
/// ordered by score. Otherwise results are ordered by how many distinct
/// query terms appear in their title and body. Sorting is stable, so
/// equal results keep their input order.
pub fn rerank<T: Rankable>(results: Vec<T>, query: &str, top_k: usize) -> Vec<T> {
    let mut ranked: Vec<T> = if results.iter().any(|r| r.score().is_some()) {
        let mut scored: Vec<T> = results.into_iter().filter(|r| r.score().is_some()).collect();
        scored.sort_by(|a, b| {
            let a = a.score().unwrap_or(f32::MIN);
            let b = b.score().unwrap_or(f32::MIN);
            b.total_cmp(&a)
        });
        scored
    } else {
        let terms = query_terms(query);
        let mut keyed: Vec<(usize, T)> = results
            .into_iter()
            .map(|r| (keyword_score(&terms, &r), r))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        keyed.into_iter().map(|(_, r)| r).collect()
    };

    ranked.truncate(top_k);
    ranked
}

fn query_terms(query: &str) -> HashSet<String> {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

/// Number of distinct query terms contained in `title + " " + body`.
pub fn keyword_score<T: Rankable>(terms: &HashSet<String>, result: &T) -> usize {
    let text = format!("{} {}", result.title(), result.body()).to_lowercase();
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}
