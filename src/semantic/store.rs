//! Vector index plus metadata table, persisted as two files joined on `vector_id`.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::metadata::MetadataTable;
use crate::semantic::storage::VectorStorage;
use crate::types::SearchHit;

/// Where a built index lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            index: config.resolve(&config.index.index_path),
            metadata: config.resolve(&config.index.metadata_path),
        }
    }

    pub fn exist(&self) -> bool {
        self.index.exists() && self.metadata.exists()
    }
}

pub struct IndexStore {
    index: VectorIndex,
    table: MetadataTable,
}

impl IndexStore {
    pub fn new(index: VectorIndex, table: MetadataTable) -> Self {
        Self { index, table }
    }

    /// Load both files. Either one missing is `IndexError::NotFound`, and a
    /// vector without a metadata row is `IndexError::LookupInconsistency`.
    pub fn open(paths: &IndexPaths, model_id: &[u8; 32]) -> Result<Self, IndexError> {
        for path in [&paths.index, &paths.metadata] {
            if !path.exists() {
                return Err(IndexError::NotFound {
                    path: path.display().to_string(),
                });
            }
        }

        let index = VectorStorage::new(paths.index.clone()).load(model_id)?;
        let table = MetadataTable::load(&paths.metadata)?;

        if let Some((vector_id, _)) = index.iter().find(|(id, _)| table.get(*id).is_none()) {
            return Err(IndexError::LookupInconsistency { vector_id });
        }
        if table.len() > index.len() {
            log::warn!(
                "metadata has rows without vectors vectors={} rows={}",
                index.len(),
                table.len()
            );
        }
        log::info!(
            "opened index vectors={} dimensions={}",
            index.len(),
            index.dimensions()
        );

        Ok(Self { index, table })
    }

    pub fn save(&self, paths: &IndexPaths, model_id: &[u8; 32]) -> Result<(), IndexError> {
        for path in [&paths.index, &paths.metadata] {
            ensure_parent(path)?;
        }

        VectorStorage::new(paths.index.clone()).save(&self.index, model_id)?;
        self.table.save(&paths.metadata)?;

        log::info!(
            "saved index to {} and metadata to {}",
            paths.index.display(),
            paths.metadata.display()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn table(&self) -> &MetadataTable {
        &self.table
    }

    /// Top-`k` documents for an already normalized query vector.
    ///
    /// Unfilled slots are skipped. A found id with no metadata row is an
    /// error rather than a silently shorter result.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let neighbors = self.index.search(query, k)?;

        neighbors
            .into_iter()
            .filter(|n| n.is_found())
            .map(|n| {
                self.table
                    .get(n.id)
                    .map(|record| SearchHit::from_record(record, n.score))
                    .ok_or(IndexError::LookupInconsistency { vector_id: n.id })
            })
            .collect()
    }
}

fn ensure_parent(path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(crate::semantic::storage::VectorStorageError::from)?;
        }
    }
    Ok(())
}
