use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    persist,
};

/// Chunk texts in index order: entry `i` is the text whose embedding sits at
/// position `i` of the vector index.
///
/// Persisted as a JSON array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMapping {
    chunks: Vec<String>,
}

impl ChunkMapping {
    pub fn new(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.chunks.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.chunks
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(&self.chunks)?;
        persist::write_atomic(path, &bytes)
    }

    /// Read a mapping from `path`.
    ///
    /// Returns [`Error::IndexMissing`] if the file does not exist.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IndexMissing(PathBuf::from(path)));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            chunks: serde_json::from_slice(&bytes)?,
        })
    }
}
