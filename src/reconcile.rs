//! One incremental indexing pass over a document directory.
//!
//! A pass compares the directory against the stored metadata, re-embeds
//! new and modified files, drops deleted ones, and then rebuilds the vector
//! index and chunk mapping from the whole embedding cache. When nothing
//! changed the pass returns early without opening the cache or writing any
//! artifact.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    chunking::ChunkingConfig,
    embedding::{Embedder, validate_vectors},
    embedding_cache::{EmbeddingCache, FileRecord},
    error::Result,
    extract::ExtractorRegistry,
    incremental::{MetadataMap, diff_files},
    index_builder,
    walker::{DiscoveredFile, discover_files},
};

pub const INDEX_FILE: &str = "vectors.idx";
pub const MAPPING_FILE: &str = "mapping.json";
pub const METADATA_FILE: &str = "index_meta.json";
pub const CACHE_FILE: &str = "embedding_cache.redb";

/// Locations of the four persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub mapping: PathBuf,
    pub metadata: PathBuf,
    pub cache: PathBuf,
}

impl ArtifactPaths {
    /// Use the given index and mapping paths, with the metadata and cache
    /// files placed in the index's directory.
    pub fn beside_index(index: &Path, mapping: &Path) -> Self {
        let dir = index.parent().unwrap_or(Path::new(""));
        Self {
            index: index.to_path_buf(),
            mapping: mapping.to_path_buf(),
            metadata: dir.join(METADATA_FILE),
            cache: dir.join(CACHE_FILE),
        }
    }

    /// All four artifacts under `dir` with their default file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join(INDEX_FILE),
            mapping: dir.join(MAPPING_FILE),
            metadata: dir.join(METADATA_FILE),
            cache: dir.join(CACHE_FILE),
        }
    }

    fn all_exist(&self) -> bool {
        [&self.index, &self.mapping, &self.metadata, &self.cache]
            .iter()
            .all(|p| p.exists())
    }
}

/// Tunables for a pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub chunking: ChunkingConfig,
    pub extractors: ExtractorRegistry,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            extractors: ExtractorRegistry::with_defaults(),
        }
    }
}

/// What a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files found in the document directory.
    pub discovered: usize,
    /// Files extracted and embedded during this pass.
    pub embedded: usize,
    /// Files reused from the cache.
    pub unchanged: usize,
    /// Files removed because they no longer exist.
    pub deleted: usize,
    /// Previously indexed files dropped because extraction now fails.
    pub evicted: usize,
    /// New files that could not be extracted.
    pub skipped: usize,
    /// Chunks embedded during this pass.
    pub chunks_embedded: usize,
    /// Total chunks in the index after the pass.
    pub total_chunks: usize,
    /// Whether the index and mapping were rebuilt and written.
    pub rebuilt: bool,
}

/// Bring the artifacts at `paths` up to date with `document_dir`.
///
/// Re-running with no filesystem changes performs no writes and no
/// embedding calls. Per-file extraction failures are logged and skipped. An
/// embedding failure aborts the pass before anything is persisted, leaving
/// the previous artifacts untouched.
///
/// Artifacts are written in the order index, mapping, cache, metadata. The
/// metadata goes last so that an interrupted pass reprocesses its files on
/// the next run.
pub fn reconcile(
    document_dir: &Path,
    paths: &ArtifactPaths,
    embedder: &mut dyn Embedder,
    options: &ReconcileOptions,
) -> Result<ReconcileReport> {
    let model_id = embedder.model_id().to_string();
    let dimension = embedder.dimension();
    let chunking = options.chunking;

    let mut metadata = MetadataMap::load(&paths.metadata)?;
    let indexed_before = !metadata.model.is_empty();
    let model_changed = indexed_before && metadata.model != model_id;
    let chunking_changed = indexed_before && metadata.chunking != Some(chunking);
    if model_changed {
        info!(
            previous = %metadata.model,
            current = %model_id,
            "embedding model changed, re-embedding everything"
        );
    } else if chunking_changed {
        info!(
            max_lines = chunking.max_lines,
            overlap_lines = chunking.overlap_lines,
            "chunking settings changed, re-chunking everything"
        );
    }
    let settings_changed = model_changed || chunking_changed;
    if settings_changed {
        metadata.files.clear();
    }
    metadata.model = model_id.clone();
    metadata.chunking = Some(chunking);
    let before = metadata.clone();

    let discovered = discover_files(document_dir)?;
    let mut changes = diff_files(&metadata, &discovered);

    let mut report = ReconcileReport {
        discovered: discovered.len(),
        ..Default::default()
    };

    // Unreadable file types that were never indexed cannot change anything.
    changes.changed.retain(|file| {
        let keep = options.extractors.supports(&file.path)
            || metadata.contains(&file.key());
        if !keep {
            debug!(path = %file.path.display(), "no extractor, skipping");
            report.skipped += 1;
        }
        keep
    });

    let artifacts_missing = !paths.all_exist();
    if changes.is_empty() && !settings_changed && !artifacts_missing {
        report.unchanged = changes.unchanged.len();
        info!(files = report.discovered, "index is up to date");
        return Ok(report);
    }

    let mut cache = EmbeddingCache::load(&paths.cache)?;
    if settings_changed
        || cache.model().is_some_and(|m| m != model_id)
        || cache.chunking().is_some_and(|c| c != chunking)
    {
        cache.clear();
    }
    cache.set_model(&model_id);
    cache.set_chunking(chunking);

    // An unchanged file the cache lost must be embedded again.
    let (missing, unchanged): (Vec<DiscoveredFile>, Vec<DiscoveredFile>) =
        changes
            .unchanged
            .into_iter()
            .partition(|file| !cache.contains(&file.key()));
    for file in &missing {
        debug!(path = %file.path.display(), "cache entry missing");
    }
    report.unchanged = unchanged.len();
    changes.changed.extend(missing);
    changes.changed.sort_by(|a, b| a.path.cmp(&b.path));

    for path in &changes.deleted {
        debug!(path = %path, "removing deleted file");
        cache.delete(path);
        metadata.remove(path);
        report.deleted += 1;
    }

    let on_disk: HashSet<String> =
        discovered.iter().map(DiscoveredFile::key).collect();
    let orphans: Vec<String> = cache
        .iter()
        .map(|(path, _)| path.clone())
        .filter(|path| !on_disk.contains(path))
        .collect();
    for path in &orphans {
        debug!(path = %path, "dropping orphaned cache entry");
        cache.delete(path);
    }

    for file in &changes.changed {
        let key = file.key();
        let text = match options.extractors.extract(&file.path) {
            Ok(text) => text,
            Err(e) => {
                let had_cache = cache.delete(&key);
                let had_meta = metadata.remove(&key).is_some();
                if had_cache || had_meta {
                    warn!(path = %key, error = %e, "extraction failed, evicting");
                    report.evicted += 1;
                } else {
                    warn!(path = %key, error = %e, "extraction failed, skipping");
                    report.skipped += 1;
                }
                continue;
            }
        };

        let chunks = chunking.chunk(&text);
        let vectors = embedder.embed(&chunks)?;
        validate_vectors(&vectors, chunks.len(), dimension)?;
        debug!(path = %key, chunks = chunks.len(), "embedded");

        report.embedded += 1;
        report.chunks_embedded += chunks.len();
        cache.put(key.clone(), FileRecord {
            mtime: file.mtime,
            chunks,
            vectors,
        });
        metadata.insert(key, file.mtime);
    }

    let mutated = settings_changed
        || artifacts_missing
        || cache.has_pending_changes()
        || metadata != before;
    if !mutated {
        info!(files = report.discovered, "index is up to date");
        return Ok(report);
    }

    let (index, mapping) =
        index_builder::rebuild(&cache, &metadata, dimension, &model_id)?;
    index.write(&paths.index)?;
    mapping.write(&paths.mapping)?;
    cache.flush()?;
    metadata.store(&paths.metadata)?;

    report.total_chunks = mapping.len();
    report.rebuilt = true;
    info!(
        embedded = report.embedded,
        unchanged = report.unchanged,
        deleted = report.deleted,
        evicted = report.evicted,
        skipped = report.skipped,
        chunks = report.total_chunks,
        "index rebuilt"
    );
    Ok(report)
}
