//! Metadata table persisted next to the vector index.
//!
//! One CSV row per indexed document: `vector_id,title,url,article_content`
//! followed by every extra column the source corpus carried. The table is
//! the only place documents are resolved from after a search, so an id in
//! the index without a row here is a lookup inconsistency.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;

use crate::errors::ErrorKind;
use crate::types::DocumentRecord;

const CORE_HEADERS: [&str; 4] = ["vector_id", "title", "url", "article_content"];

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Metadata table is missing column '{0}'")]
    MissingColumn(String),

    #[error("Row {row}: invalid vector id '{value}'")]
    InvalidId { row: usize, value: String },

    #[error("Vector id {0} appears more than once")]
    DuplicateId(i64),
}

impl MetadataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetadataError::Io(_) => ErrorKind::Configuration,
            MetadataError::Csv(_)
            | MetadataError::MissingColumn(_)
            | MetadataError::InvalidId { .. }
            | MetadataError::DuplicateId(_) => ErrorKind::LookupInconsistency,
        }
    }
}

/// Documents addressed by `vector_id`.
#[derive(Debug, Default, Clone)]
pub struct MetadataTable {
    rows: HashMap<i64, DocumentRecord>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(
        records: impl IntoIterator<Item = DocumentRecord>,
    ) -> Result<Self, MetadataError> {
        let mut table = Self::new();
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, record: DocumentRecord) -> Result<(), MetadataError> {
        if self.rows.contains_key(&record.vector_id) {
            return Err(MetadataError::DuplicateId(record.vector_id));
        }
        self.rows.insert(record.vector_id, record);
        Ok(())
    }

    pub fn get(&self, vector_id: i64) -> Option<&DocumentRecord> {
        self.rows.get(&vector_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ascending id order.
    pub fn records(&self) -> Vec<&DocumentRecord> {
        let mut records: Vec<&DocumentRecord> = self.rows.values().collect();
        records.sort_by_key(|r| r.vector_id);
        records
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let now = Instant::now();
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut positions = [0usize; 4];
        for (slot, name) in positions.iter_mut().zip(CORE_HEADERS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| MetadataError::MissingColumn(name.to_string()))?;
        }
        let [id_pos, title_pos, url_pos, content_pos] = positions;

        let extras: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !positions.contains(i))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut table = Self::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |pos: usize| record.get(pos).unwrap_or_default().to_string();

            let raw_id = field(id_pos);
            let vector_id = raw_id
                .trim()
                .parse::<i64>()
                .map_err(|_| MetadataError::InvalidId {
                    row: row + 1,
                    value: raw_id.clone(),
                })?;

            // Empty extra cells are columns this document never had.
            let metadata = extras
                .iter()
                .filter_map(|(pos, name)| {
                    let value = record.get(*pos)?;
                    (!value.is_empty()).then(|| (name.clone(), value.to_string()))
                })
                .collect();

            table.insert(DocumentRecord {
                vector_id,
                title: field(title_pos),
                url: field(url_pos),
                article_content: field(content_pos),
                metadata,
            })?;
        }

        log::debug!(
            "took {}ms to read {} metadata rows",
            now.elapsed().as_micros() as f64 / 1000.0,
            table.len()
        );

        Ok(table)
    }

    /// Write the table as CSV. Uses a temp file and rename so readers never
    /// see a half-written table.
    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        let extra_columns: BTreeSet<&str> = self
            .rows
            .values()
            .flat_map(|r| r.metadata.keys().map(String::as_str))
            .filter(|k| !CORE_HEADERS.contains(k))
            .collect();

        let temp_path = path.with_extension("csv-tmp");
        let result = self.write_csv(&temp_path, &extra_columns);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn write_csv(&self, path: &Path, extra_columns: &BTreeSet<&str>) -> Result<(), MetadataError> {
        let mut writer = csv::Writer::from_path(path)?;

        let headers: Vec<&str> = CORE_HEADERS
            .iter()
            .copied()
            .chain(extra_columns.iter().copied())
            .collect();
        writer.write_record(&headers)?;

        for record in self.records() {
            let id = record.vector_id.to_string();
            let mut row: Vec<&str> = vec![
                id.as_str(),
                record.title.as_str(),
                record.url.as_str(),
                record.article_content.as_str(),
            ];
            row.extend(
                extra_columns
                    .iter()
                    .map(|col| record.metadata.get(*col).map(String::as_str).unwrap_or("")),
            );
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub fn record(vector_id: i64, title: &str, url: &str, content: &str) -> DocumentRecord {
    DocumentRecord {
        vector_id,
        title: title.to_string(),
        url: url.to_string(),
        article_content: content.to_string(),
        metadata: Default::default(),
    }
}
