use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    chunking::ChunkingConfig,
    error::Result,
    persist,
    walker::DiscoveredFile,
};

/// Last-indexed modification time for every file in the index, plus the
/// embedding model and chunking settings the index was built with.
///
/// Persisted as JSON with sorted keys, so identical maps always serialize
/// to identical bytes.
///
/// # Examples
///
/// ```
/// use docrag::incremental::MetadataMap;
///
/// let mut meta = MetadataMap::new("all-MiniLM-L6-v2");
/// meta.insert("/docs/a.py".to_string(), 1_700_000_000);
/// assert_eq!(meta.mtime("/docs/a.py"), Some(1_700_000_000));
/// assert_eq!(meta.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMap {
    /// Embedding model id used for every cached vector.
    pub model: String,
    /// Chunking settings used for every cached chunk.
    #[serde(default)]
    pub chunking: Option<ChunkingConfig>,
    /// Absolute file path -> mtime in nanoseconds.
    pub files: BTreeMap<String, u64>,
}

impl MetadataMap {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            chunking: None,
            files: BTreeMap::new(),
        }
    }

    /// Load the map from `path`. A missing file is an empty map with no
    /// model recorded.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the map to `path`, replacing any previous copy atomically.
    pub fn store(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        persist::write_atomic(path, &bytes)
    }

    pub fn mtime(&self, path: &str) -> Option<u64> {
        self.files.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn insert(&mut self, path: String, mtime: u64) {
        self.files.insert(path, mtime);
    }

    pub fn remove(&mut self, path: &str) -> Option<u64> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of comparing discovered files against stored metadata.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Files that are new, or whose mtime advanced past the stored value.
    pub changed: Vec<DiscoveredFile>,
    /// Files whose stored mtime is not older than the current one.
    pub unchanged: Vec<DiscoveredFile>,
    /// Paths present in metadata but no longer on disk, sorted.
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// True when neither changed nor deleted files were found.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Classify `discovered` against `metadata`.
///
/// A file is changed when it is absent from metadata or when its stored
/// mtime is strictly older than its current one. Content edits that do not
/// advance the mtime go unnoticed.
pub fn diff_files(
    metadata: &MetadataMap,
    discovered: &[DiscoveredFile],
) -> ChangeSet {
    let mut result = ChangeSet::default();
    let mut seen = HashSet::with_capacity(discovered.len());

    for file in discovered {
        let key = file.key();
        match metadata.mtime(&key) {
            Some(stored) if stored >= file.mtime => {
                result.unchanged.push(file.clone());
            }
            _ => result.changed.push(file.clone()),
        }
        seen.insert(key);
    }

    // BTreeMap iteration keeps `deleted` sorted.
    result.deleted = metadata
        .files
        .keys()
        .filter(|path| !seen.contains(*path))
        .cloned()
        .collect();

    result
}
