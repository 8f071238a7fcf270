//! Query-time lookup of context passages.

use std::path::Path;

use tracing::{debug, warn};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    mapping::ChunkMapping,
    vector_index::FlatIndex,
};

/// Returned when there is no index, or the index holds no chunks.
pub const NO_DOCUMENTS_INDEXED: &str = "No documents indexed.";

/// Returned when the index exists but yields no usable match.
pub const NO_RELEVANT_CONTENT: &str = "No relevant documents found.";

/// Number of chunks retrieved per query when not specified.
pub const DEFAULT_TOP_K: usize = 5;

/// Load the vector index and chunk mapping written by a reconcile pass.
///
/// Returns [`Error::IndexMissing`] if either file is absent.
pub fn load_index(
    index_path: &Path,
    mapping_path: &Path,
) -> Result<(FlatIndex, ChunkMapping)> {
    let index = FlatIndex::read(index_path)?;
    let mapping = ChunkMapping::read(mapping_path)?;
    if index.len() != mapping.len() {
        warn!(
            vectors = index.len(),
            chunks = mapping.len(),
            "index and mapping lengths differ"
        );
    }
    Ok((index, mapping))
}

/// Find the chunks closest to `query` and join them with blank lines,
/// closest first.
///
/// Matches whose position falls outside `mapping` are dropped. Never fails:
/// an empty index gives [`NO_DOCUMENTS_INDEXED`]; an embedding failure, a
/// model mismatch, or no surviving match gives [`NO_RELEVANT_CONTENT`].
pub fn search_context(
    query: &str,
    index: &FlatIndex,
    mapping: &ChunkMapping,
    embedder: &mut dyn Embedder,
    top_k: usize,
) -> String {
    if index.is_empty() || mapping.is_empty() {
        return NO_DOCUMENTS_INDEXED.to_string();
    }

    if index.model_id() != embedder.model_id() {
        warn!(
            index = %index.model_id(),
            embedder = %embedder.model_id(),
            "index was built with a different embedding model"
        );
        return NO_RELEVANT_CONTENT.to_string();
    }

    let query_vector = match embedder.embed_query(query) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to embed query");
            return NO_RELEVANT_CONTENT.to_string();
        }
    };

    let passages: Vec<&str> = index
        .search(&query_vector, top_k)
        .into_iter()
        .filter_map(|hit| {
            debug!(position = hit.position, distance = hit.distance, "match");
            mapping.get(hit.position)
        })
        .collect();

    if passages.is_empty() {
        return NO_RELEVANT_CONTENT.to_string();
    }
    passages.join("\n\n")
}

/// Load the artifacts and run [`search_context`].
///
/// Missing or unreadable artifacts give [`NO_DOCUMENTS_INDEXED`]. Never
/// writes anything.
pub fn retrieve(
    query: &str,
    index_path: &Path,
    mapping_path: &Path,
    top_k: usize,
    embedder: &mut dyn Embedder,
) -> String {
    match load_index(index_path, mapping_path) {
        Ok((index, mapping)) => {
            search_context(query, &index, &mapping, embedder, top_k)
        }
        Err(Error::IndexMissing(path)) => {
            debug!(path = %path.display(), "no index on disk");
            NO_DOCUMENTS_INDEXED.to_string()
        }
        Err(e) => {
            warn!(error = %e, "could not load index");
            NO_DOCUMENTS_INDEXED.to_string()
        }
    }
}
