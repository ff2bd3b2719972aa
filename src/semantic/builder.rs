//! Batch construction of the internal index from corpus documents.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::IndexConfig;
use crate::semantic::embeddings::{Embedder, EmbeddingError, TaskType};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::metadata::MetadataTable;
use crate::semantic::preprocess::normalize;
use crate::semantic::store::IndexStore;
use crate::types::DocumentRecord;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Concurrent embedding calls
    pub workers: usize,
    /// Pause every worker after this many completed calls (0 disables)
    pub pause_every: usize,
    pub pause: Duration,
    pub show_progress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for BuildOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            workers: config.build_workers.max(1),
            pause_every: config.pause_every,
            pause: Duration::from_millis(config.pause_ms),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildFailure {
    pub vector_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub indexed: usize,
    /// Rows dropped because an earlier row had the same id
    pub duplicates: usize,
    pub failed: Vec<BuildFailure>,
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    options: BuildOptions,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, options: BuildOptions) -> Self {
        Self { embedder, options }
    }

    /// Identifies the embedding model in the saved index header.
    pub fn model_id(&self) -> [u8; 32] {
        self.embedder.model_id()
    }

    /// Embed every document and assemble the index and its metadata table.
    ///
    /// Per-document failures end up in the report and their rows are left
    /// out of the table. Fails only when nothing could be embedded.
    pub fn build(
        &self,
        documents: Vec<DocumentRecord>,
    ) -> Result<(IndexStore, BuildReport), IndexError> {
        let (documents, duplicates) = dedup_documents(documents);
        log::info!(
            "building index documents={} duplicates={duplicates} workers={}",
            documents.len(),
            self.options.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
            .map_err(|e| IndexError::Pool(e.to_string()))?;

        let progress = self.progress_bar(documents.len() as u64);
        let throttle = Throttle::new(self.options.pause_every, self.options.pause);

        let embeddings: Vec<Result<Vec<f32>, EmbeddingError>> = pool.install(|| {
            documents
                .par_iter()
                .map(|doc| {
                    throttle.wait();
                    let result = self.embedder.embed(&doc.article_content, TaskType::Document);
                    if let Err(e) = &result {
                        log::warn!("failed to embed vector_id={}: {e}", doc.vector_id);
                    }
                    progress.inc(1);
                    throttle.record_completion();
                    result
                })
                .collect()
        });
        progress.finish_and_clear();

        let mut report = BuildReport {
            duplicates,
            ..Default::default()
        };
        let mut index: Option<VectorIndex> = None;
        let mut table = MetadataTable::new();

        for (doc, embedding) in documents.into_iter().zip(embeddings) {
            let mut embedding = match embedding {
                Ok(embedding) => embedding,
                Err(e) => {
                    report.failed.push(BuildFailure {
                        vector_id: doc.vector_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            normalize(&mut embedding);

            // the first successful embedding fixes the dimensions
            let index = index.get_or_insert_with(|| VectorIndex::new(embedding.len()));
            if let Err(e) = index.insert(doc.vector_id, embedding) {
                report.failed.push(BuildFailure {
                    vector_id: doc.vector_id,
                    error: e.to_string(),
                });
                continue;
            }
            table.insert(doc)?;
            report.indexed += 1;
        }

        let index = index.ok_or(IndexError::NoEmbeddings)?;

        if !report.failed.is_empty() {
            log::warn!("{} documents were not indexed", report.failed.len());
        }
        log::info!(
            "index built vectors={} dimensions={}",
            index.len(),
            index.dimensions()
        );

        Ok((IndexStore::new(index, table), report))
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            bar.set_style(style);
        }
        bar.set_message("embedding");
        bar
    }
}

/// Drop rows whose id was already seen, keeping the first occurrence.
pub fn dedup_documents(documents: Vec<DocumentRecord>) -> (Vec<DocumentRecord>, usize) {
    let before = documents.len();
    let mut seen = HashSet::new();
    let kept: Vec<DocumentRecord> = documents
        .into_iter()
        .filter(|doc| seen.insert(doc.vector_id))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Pool-wide pause: after every `every` completed calls one worker holds the
/// gate for `pause` and every other worker blocks on it before its next call.
struct Throttle {
    every: usize,
    pause: Duration,
    completed: AtomicUsize,
    gate: Mutex<()>,
}

impl Throttle {
    fn new(every: usize, pause: Duration) -> Self {
        Self {
            every,
            pause,
            completed: AtomicUsize::new(0),
            gate: Mutex::new(()),
        }
    }

    fn wait(&self) {
        drop(self.gate.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn record_completion(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.every > 0 && done % self.every == 0 && !self.pause.is_zero() {
            let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            log::debug!("pausing embedding for {}ms after {done} calls", self.pause.as_millis());
            thread::sleep(self.pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::metadata::record;
    use crate::semantic::preprocess::l2_norm;

    /// Maps the first byte of the text to an axis; fails on texts starting with '!'.
    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, EmbeddingError> {
            if text.starts_with('!') {
                return Err(EmbeddingError::MalformedResponse("refused".to_string()));
            }
            let mut v = vec![0.0; 4];
            v[text.as_bytes()[0] as usize % 4] = 3.0;
            Ok(v)
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    fn options() -> BuildOptions {
        BuildOptions {
            workers: 2,
            pause_every: 0,
            pause: Duration::ZERO,
            show_progress: false,
        }
    }

    #[test]
    fn test_dedup_keeps_first() {
        let (docs, dropped) = dedup_documents(vec![
            record(1, "first", "u", "aaaaa"),
            record(2, "other", "u", "bbbbb"),
            record(1, "second", "u", "ccccc"),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "first");
    }

    #[test]
    fn test_failures_excluded_from_table() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), options());
        let (store, report) = builder
            .build(vec![
                record(1, "a", "u", "a text"),
                record(2, "b", "u", "! fails"),
                record(3, "c", "u", "b text"),
            ])
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].vector_id, 2);
        assert_eq!(store.len(), 2);
        assert!(store.table().get(2).is_none());
        assert!(!store.index().contains(2));
    }

    #[test]
    fn test_vectors_normalized() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), options());
        let (store, _) = builder.build(vec![record(5, "a", "u", "a text")]).unwrap();

        let v = store.index().get(5).unwrap();
        assert!((l2_norm(v) - 1.0).abs() < 1e-5);
        assert_eq!(store.dimensions(), 4);
    }

    #[test]
    fn test_nothing_embedded() {
        let builder = IndexBuilder::new(Arc::new(AxisEmbedder), options());
        let result = builder.build(vec![record(1, "a", "u", "! nope")]);
        assert!(matches!(result, Err(IndexError::NoEmbeddings)));
    }

    #[test]
    fn test_throttle_counts_across_workers() {
        let throttle = Throttle::new(2, Duration::from_millis(1));
        for _ in 0..5 {
            throttle.wait();
            throttle.record_completion();
        }
        assert_eq!(throttle.completed.load(Ordering::SeqCst), 5);
    }
}
