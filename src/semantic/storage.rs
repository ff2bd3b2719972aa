//! Binary vector index file.
//!
//! Little-endian throughout. A 49 byte header:
//!
//! | offset | field       | type     |
//! |--------|-------------|----------|
//! | 0      | version     | u8 (1)   |
//! | 1      | model_id    | [u8; 32] |
//! | 33     | dimensions  | u32      |
//! | 37     | entry_count | u64      |
//! | 45     | crc32       | u32      |
//!
//! The CRC covers bytes 0..45. Entries follow in ascending id order, each
//! an `i64` vector id and `dimensions` f32 values.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::errors::ErrorKind;
use crate::semantic::index::VectorIndex;

const FORMAT_VERSION: u8 = 1;
const HEADER_SIZE: usize = 49;
const CRC_OFFSET: usize = 45;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: index was built with a different embedding model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

impl VectorStorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VectorStorageError::InvalidFormat(_) | VectorStorageError::ChecksumMismatch => {
                ErrorKind::LookupInconsistency
            }
            VectorStorageError::Io(_)
            | VectorStorageError::VersionMismatch(..)
            | VectorStorageError::ModelMismatch => ErrorKind::Configuration,
        }
    }
}

#[derive(Debug, PartialEq)]
struct Header {
    model_id: [u8; 32],
    dimensions: u32,
    entry_count: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = FORMAT_VERSION;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..37].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[37..CRC_OFFSET].copy_from_slice(&self.entry_count.to_le_bytes());
        let crc = crc32fast::hash(&bytes[..CRC_OFFSET]);
        bytes[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self, VectorStorageError> {
        let version = bytes[0];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored = u32::from_le_bytes(array(&bytes[CRC_OFFSET..]));
        if stored != crc32fast::hash(&bytes[..CRC_OFFSET]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Self {
            model_id: array(&bytes[1..33]),
            dimensions: u32::from_le_bytes(array(&bytes[33..37])),
            entry_count: u64::from_le_bytes(array(&bytes[37..CRC_OFFSET])),
        })
    }
}

/// Reads and writes one index file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the whole index, refusing files written for another model.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<VectorIndex, VectorStorageError> {
        let mut reader = BufReader::new(File::open(&self.path)?);

        let mut header_bytes = [0u8; HEADER_SIZE];
        read_exactly(&mut reader, &mut header_bytes, "truncated header")?;
        let header = Header::decode(&header_bytes)?;
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut index = VectorIndex::with_capacity(dimensions, header.entry_count as usize);
        let mut entry = vec![0u8; 8 + 4 * dimensions];

        for _ in 0..header.entry_count {
            read_exactly(&mut reader, &mut entry, "file ends before the last entry")?;
            let id = i64::from_le_bytes(array(&entry[..8]));
            let values = entry[8..]
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes(array(chunk)))
                .collect();

            index
                .insert(id, values)
                .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))?;
        }

        Ok(index)
    }

    /// Write to a sibling temp file, fsync, then rename over the target.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("idx-tmp");

        if let Err(err) = write_index(&temp_path, index, model_id) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn write_index(path: &Path, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
    let dimensions = u32::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("{} dimensions", index.dimensions()))
    })?;
    let header = Header {
        model_id: *model_id,
        dimensions,
        entry_count: index.len() as u64,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header.encode())?;
    for (id, embedding) in index.iter() {
        writer.write_all(&id.to_le_bytes())?;
        for value in embedding {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn read_exactly(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<(), VectorStorageError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => VectorStorageError::InvalidFormat(what.to_string()),
        _ => e.into(),
    })
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    const MODEL: [u8; 32] = [0x5a; 32];

    fn storage(dir: &Path) -> VectorStorage {
        VectorStorage::new(dir.join("news.idx"))
    }

    #[test]
    fn test_header_layout() {
        let header = Header {
            model_id: MODEL,
            dimensions: 768,
            entry_count: 12,
        };
        let bytes = header.encode();

        assert_eq!(bytes[0], FORMAT_VERSION);
        assert_eq!(&bytes[33..37], &768u32.to_le_bytes());
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_empty_index_keeps_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path());

        storage.save(&VectorIndex::new(768), &MODEL).unwrap();

        let loaded = storage.load(&MODEL).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimensions(), 768);
    }

    #[test]
    fn test_negative_and_large_ids_survive() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path());

        let mut index = VectorIndex::new(3);
        index.insert(-7, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(1 << 40, vec![0.0, 0.0, 1.0]).unwrap();
        storage.save(&index, &MODEL).unwrap();

        let loaded = storage.load(&MODEL).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(-7).unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(loaded.get(1 << 40).unwrap(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_other_model_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path());
        storage.save(&VectorIndex::new(3), &MODEL).unwrap();

        let result = storage.load(&[0u8; 32]);
        assert!(matches!(result, Err(VectorStorageError::ModelMismatch)));
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let path = PathBuf::from("/nonexistent/directory/news.idx");
        let storage = VectorStorage::new(path.clone());

        assert!(storage.save(&VectorIndex::new(3), &MODEL).is_err());
        assert!(!path.with_extension("idx-tmp").exists());
    }

    #[test]
    fn test_corrupt_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("news.idx");
        let storage = VectorStorage::new(path.clone());

        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        storage.save(&index, &MODEL).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(40)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let err = match storage.load(&MODEL) {
            Err(err) => err,
            Ok(_) => panic!("corrupt header accepted"),
        };
        assert!(matches!(err, VectorStorageError::ChecksumMismatch));
        assert_eq!(err.kind(), ErrorKind::LookupInconsistency);
    }

    #[test]
    fn test_truncated_entries_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("news.idx");
        let storage = VectorStorage::new(path.clone());

        let mut index = VectorIndex::new(4);
        index.insert(1, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        storage.save(&index, &MODEL).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let result = storage.load(&MODEL);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }
}
