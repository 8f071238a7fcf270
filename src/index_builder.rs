use tracing::{debug, warn};

use crate::{
    embedding_cache::EmbeddingCache,
    error::Result,
    incremental::MetadataMap,
    mapping::ChunkMapping,
    vector_index::FlatIndex,
};

/// Rebuild the vector index and chunk mapping from the whole cache.
///
/// Files are visited in sorted path order and chunks in document order,
/// so identical cache contents always produce identical artifacts. Entries
/// whose path is absent from `metadata`, or whose vectors do not match
/// their chunks or `dimension`, are skipped with a warning. An empty cache
/// produces an empty index.
pub fn rebuild(
    cache: &EmbeddingCache,
    metadata: &MetadataMap,
    dimension: usize,
    model_id: &str,
) -> Result<(FlatIndex, ChunkMapping)> {
    let mut index = FlatIndex::new(dimension, model_id);
    let mut chunks = Vec::new();
    let mut files = 0usize;

    for (path, record) in cache.iter() {
        if !metadata.contains(path) {
            warn!(path = %path, "cache entry has no metadata, skipping");
            continue;
        }
        if !record.is_consistent() {
            warn!(path = %path, "cache entry has mismatched chunks and vectors, skipping");
            continue;
        }
        if !record.chunks.is_empty() && record.dimension() != dimension {
            warn!(
                path = %path,
                found = record.dimension(),
                expected = dimension,
                "cache entry has wrong embedding dimension, skipping"
            );
            continue;
        }

        for (chunk, vector) in record.chunks.iter().zip(&record.vectors) {
            index.add(vector)?;
            chunks.push(chunk.clone());
        }
        files += 1;
    }

    for path in metadata.files.keys() {
        if !cache.contains(path) {
            warn!(path = %path, "indexed file has no cache entry");
        }
    }

    debug!(files, chunks = chunks.len(), "rebuilt index");
    Ok((index, ChunkMapping::new(chunks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding_cache::FileRecord;

    const DIM: usize = 2;

    fn record(chunks: &[&str], base: f32) -> FileRecord {
        FileRecord {
            mtime: 1,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            vectors: (0..chunks.len())
                .map(|i| vec![base + i as f32, base])
                .collect(),
        }
    }

    fn fixture() -> (tempfile::TempDir, EmbeddingCache, MetadataMap) {
        let tmp = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::load(&tmp.path().join("c.redb")).unwrap();
        (tmp, cache, MetadataMap::new("m"))
    }

    #[test]
    fn files_in_sorted_order_chunks_in_document_order() {
        let (_tmp, mut cache, mut meta) = fixture();
        cache.put("/d/b.py".into(), record(&["b0", "b1"], 10.0));
        cache.put("/d/a.py".into(), record(&["a0", "a1", "a2"], 0.0));
        meta.insert("/d/a.py".into(), 1);
        meta.insert("/d/b.py".into(), 1);

        let (index, mapping) = rebuild(&cache, &meta, DIM, "m").unwrap();

        assert_eq!(mapping.as_slice(), ["a0", "a1", "a2", "b0", "b1"]);
        assert_eq!(index.len(), mapping.len());
        assert_eq!(index.vector(0), Some([0.0, 0.0].as_slice()));
        assert_eq!(index.vector(3), Some([10.0, 10.0].as_slice()));
        assert_eq!(index.model_id(), "m");
    }

    #[test]
    fn rebuild_is_deterministic() {
        let (_tmp, mut cache, mut meta) = fixture();
        for (i, name) in ["/d/z", "/d/a", "/d/q"].iter().enumerate() {
            cache.put(name.to_string(), record(&["x", "y"], i as f32));
            meta.insert(name.to_string(), 1);
        }

        let first = rebuild(&cache, &meta, DIM, "m").unwrap();
        let second = rebuild(&cache, &meta, DIM, "m").unwrap();
        assert_eq!(first.0.to_bytes(), second.0.to_bytes());
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn skips_entries_missing_from_metadata() {
        let (_tmp, mut cache, mut meta) = fixture();
        cache.put("/d/kept.py".into(), record(&["kept"], 0.0));
        cache.put("/d/orphan.py".into(), record(&["orphan"], 1.0));
        meta.insert("/d/kept.py".into(), 1);

        let (index, mapping) = rebuild(&cache, &meta, DIM, "m").unwrap();
        assert_eq!(mapping.as_slice(), ["kept"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn skips_inconsistent_entries() {
        let (_tmp, mut cache, mut meta) = fixture();
        let mut broken = record(&["a", "b"], 0.0);
        broken.vectors.pop();
        cache.put("/d/broken.py".into(), broken);
        cache.put("/d/wrong_dim.py".into(), FileRecord {
            mtime: 1,
            chunks: vec!["w".into()],
            vectors: vec![vec![1.0, 2.0, 3.0]],
        });
        cache.put("/d/good.py".into(), record(&["g"], 5.0));
        for path in ["/d/broken.py", "/d/wrong_dim.py", "/d/good.py"] {
            meta.insert(path.into(), 1);
        }

        let (index, mapping) = rebuild(&cache, &meta, DIM, "m").unwrap();
        assert_eq!(mapping.as_slice(), ["g"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_cache_gives_empty_index() {
        let (_tmp, cache, meta) = fixture();
        let (index, mapping) = rebuild(&cache, &meta, 384, "m").unwrap();
        assert!(index.is_empty());
        assert!(mapping.is_empty());
        assert_eq!(index.dimension(), 384);
    }

    #[test]
    fn files_without_chunks_contribute_nothing() {
        let (_tmp, mut cache, mut meta) = fixture();
        cache.put("/d/empty.txt".into(), record(&[], 0.0));
        meta.insert("/d/empty.txt".into(), 1);

        let (index, mapping) = rebuild(&cache, &meta, DIM, "m").unwrap();
        assert!(index.is_empty());
        assert!(mapping.is_empty());
    }
}
