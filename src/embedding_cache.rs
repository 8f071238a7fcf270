use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use redb::{
    Database,
    ReadOnlyDatabase,
    ReadableDatabase,
    ReadableTable,
    TableDefinition,
    TableError,
};
use tracing::{debug, warn};

use crate::{chunking::ChunkingConfig, error::Result};

const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const MODEL_KEY: &str = "model";
const CHUNKING_KEY: &str = "chunking";

/// Header size: 4 bytes chunk count + 4 bytes dimension + 8 bytes mtime.
const HEADER_SIZE: usize = 16;

/// Chunks and vectors of one indexed file.
///
/// `vectors[i]` is the embedding of `chunks[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Modification time (nanoseconds since the epoch) the record was
    /// built from.
    pub mtime: u64,
    pub chunks: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

impl FileRecord {
    /// Dimension of the stored vectors, or 0 for a file without chunks.
    pub fn dimension(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }

    /// One vector per chunk, all of the same dimension.
    pub fn is_consistent(&self) -> bool {
        let dim = self.dimension();
        self.vectors.len() == self.chunks.len()
            && self.vectors.iter().all(|v| v.len() == dim)
    }

    /// Binary format:
    /// - 4 bytes: chunk count C (u32 LE)
    /// - 4 bytes: dimension D (u32 LE)
    /// - 8 bytes: mtime (u64 LE)
    /// - C * D * 4 bytes: f32 LE vectors, row-major
    /// - C times: 4 bytes text length (u32 LE) followed by UTF-8 bytes
    fn encode(&self) -> Vec<u8> {
        let dim = self.dimension();
        let text_len: usize = self.chunks.iter().map(|c| 4 + c.len()).sum();
        let mut out =
            Vec::with_capacity(HEADER_SIZE + self.chunks.len() * dim * 4 + text_len);

        out.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
        out.extend_from_slice(&(dim as u32).to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        for vector in &self.vectors {
            out.extend_from_slice(bytemuck::cast_slice(vector.as_slice()));
        }
        for chunk in &self.chunks {
            out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            out.extend_from_slice(chunk.as_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_SIZE)?;
        let count = u32::from_le_bytes(header[0..4].try_into().ok()?) as usize;
        let dim = u32::from_le_bytes(header[4..8].try_into().ok()?) as usize;
        let mtime = u64::from_le_bytes(header[8..16].try_into().ok()?);

        let vector_bytes = count.checked_mul(dim)?.checked_mul(4)?;
        let vectors_end = HEADER_SIZE.checked_add(vector_bytes)?;
        let flat: Vec<f32> =
            bytemuck::pod_collect_to_vec(bytes.get(HEADER_SIZE..vectors_end)?);
        let vectors = if dim == 0 {
            vec![Vec::new(); count]
        } else {
            flat.chunks_exact(dim).map(<[f32]>::to_vec).collect()
        };

        let mut chunks = Vec::with_capacity(count);
        let mut pos = vectors_end;
        for _ in 0..count {
            let len_bytes = bytes.get(pos..pos + 4)?;
            let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
            pos += 4;
            let text = bytes.get(pos..pos.checked_add(len)?)?;
            chunks.push(String::from_utf8(text.to_vec()).ok()?);
            pos += len;
        }
        if pos != bytes.len() {
            return None;
        }

        Some(Self {
            mtime,
            chunks,
            vectors,
        })
    }
}

/// Per-file chunks and embeddings, persisted in a redb database.
///
/// The cache is read completely by [`EmbeddingCache::load`], mutated in
/// memory, and written back by a single [`EmbeddingCache::flush`]. The flush
/// is one write transaction: if it fails, the previously committed contents
/// stay intact.
pub struct EmbeddingCache {
    path: PathBuf,
    model: Option<String>,
    chunking: Option<ChunkingConfig>,
    entries: BTreeMap<String, FileRecord>,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
    cleared: bool,
}

impl EmbeddingCache {
    /// Load the cache stored at `path`.
    ///
    /// A missing file is an empty cache. Entries that cannot be decoded are
    /// skipped with a warning, as if they had never been cached. The file
    /// is opened read-only; only [`EmbeddingCache::flush`] writes to it.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use docrag::embedding_cache::EmbeddingCache;
    ///
    /// let cache = EmbeddingCache::load(&tmp.path().join("cache.redb")).unwrap();
    /// assert!(cache.is_empty());
    /// assert_eq!(cache.model(), None);
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let mut cache = Self {
            path: path.to_path_buf(),
            model: None,
            chunking: None,
            entries: BTreeMap::new(),
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
            cleared: false,
        };
        if !path.exists() {
            return Ok(cache);
        }

        let db = ReadOnlyDatabase::open(path)?;
        let txn = db.begin_read()?;

        match txn.open_table(SETTINGS) {
            Ok(table) => {
                cache.model =
                    table.get(MODEL_KEY)?.map(|v| v.value().to_string());
                cache.chunking = table
                    .get(CHUNKING_KEY)?
                    .and_then(|v| serde_json::from_str(v.value()).ok());
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let table = match txn.open_table(FILES) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(cache),
            Err(e) => return Err(e.into()),
        };
        for entry in table.iter()? {
            let (k, v) = entry?;
            let key = k.value().to_string();
            match FileRecord::decode(v.value()) {
                Some(record) => {
                    cache.entries.insert(key, record);
                }
                None => warn!(path = %key, "dropping unreadable cache entry"),
            }
        }

        debug!(entries = cache.entries.len(), "loaded embedding cache");
        Ok(cache)
    }

    /// Embedding model the cached vectors were produced with.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_model(&mut self, model: &str) {
        self.model = Some(model.to_string());
    }

    /// Chunking settings the cached chunks were cut with.
    pub fn chunking(&self) -> Option<ChunkingConfig> {
        self.chunking
    }

    pub fn set_chunking(&mut self, chunking: ChunkingConfig) {
        self.chunking = Some(chunking);
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or fully replace the record for `path`.
    pub fn put(&mut self, path: String, record: FileRecord) {
        self.removed.remove(&path);
        self.dirty.insert(path.clone());
        self.entries.insert(path, record);
    }

    /// Remove the record for `path`. Returns whether one existed.
    pub fn delete(&mut self, path: &str) -> bool {
        let existed = self.entries.remove(path).is_some();
        self.dirty.remove(path);
        if existed {
            self.removed.insert(path.to_string());
        }
        existed
    }

    /// Drop every record, e.g. after the embedding model changed.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty.clear();
        self.removed.clear();
        self.cleared = true;
    }

    /// Records in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether there are in-memory changes not yet flushed.
    pub fn has_pending_changes(&self) -> bool {
        self.cleared || !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Write all pending changes in a single transaction.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&self.path)?;
        let txn = db.begin_write()?;
        {
            if self.cleared {
                txn.delete_table(FILES)?;
            }
            let mut table = txn.open_table(FILES)?;
            for path in &self.removed {
                table.remove(path.as_str())?;
            }
            for path in &self.dirty {
                if let Some(record) = self.entries.get(path) {
                    table.insert(path.as_str(), record.encode().as_slice())?;
                }
            }

            let mut settings = txn.open_table(SETTINGS)?;
            if let Some(model) = &self.model {
                settings.insert(MODEL_KEY, model.as_str())?;
            }
            if let Some(chunking) = &self.chunking {
                let value = serde_json::to_string(chunking)?;
                settings.insert(CHUNKING_KEY, value.as_str())?;
            }
        }
        txn.commit()?;

        debug!(
            written = self.dirty.len(),
            removed = self.removed.len(),
            "flushed embedding cache"
        );
        self.dirty.clear();
        self.removed.clear();
        self.cleared = false;
        Ok(())
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
