use std::path::Path;

use tracing::debug;

use crate::{
    error::{Error, Result},
    model_manager::{DEFAULT_MODEL_ID, ModelManager},
};

/// Dimension of every vector produced by the supported models.
pub const EMBEDDING_DIM: usize = 384;

/// Model id of [`HashingEmbedder`].
pub const HASHING_MODEL_ID: &str = "feature-hashing";

/// Maps text to fixed-dimension vectors.
///
/// Index and query vectors must come from the same model: distances between
/// vectors of different models are meaningless. [`Embedder::model_id`] is
/// recorded in the persisted artifacts so a mismatch can be detected.
pub trait Embedder {
    /// Stable identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embed `texts`, returning one vector per input in order.
    ///
    /// Failures are reported as [`Error::EmbeddingUnavailable`].
    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        self.embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::EmbeddingUnavailable(
                    "provider returned no vector for the query".to_string(),
                )
            })
    }
}

/// Resolve an embedder from a model id.
///
/// [`HASHING_MODEL_ID`] selects the offline [`HashingEmbedder`]; anything
/// else must be a model [`ModelManager`] knows about. Downloaded model files
/// go to `cache_dir` when given.
pub fn from_model_id(
    model_id: &str,
    cache_dir: Option<&Path>,
) -> Result<Box<dyn Embedder>> {
    if model_id == HASHING_MODEL_ID {
        return Ok(Box::new(HashingEmbedder::new()));
    }
    let mut manager = ModelManager::with_model_id(model_id.to_string())?;
    if let Some(dir) = cache_dir {
        manager = manager.with_cache_dir(dir.to_path_buf());
    }
    Ok(Box::new(manager))
}

/// Resolve the model id from an explicit value, the `DOCRAG_MODEL`
/// environment variable, or the default model, in that order.
pub fn resolve_model_id(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(crate::model_manager::MODEL_ENV_VAR).ok())
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
}

/// Check that `vectors` holds exactly `expected` vectors of `dimension`
/// components each.
pub fn validate_vectors(
    vectors: &[Vec<f32>],
    expected: usize,
    dimension: usize,
) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected {expected} vectors, provider returned {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected dimension {dimension}, provider returned {}",
            bad.len()
        )));
    }
    Ok(())
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Each lowercase alphanumeric token is hashed with BLAKE3 into one of
/// `dimension` buckets with a pseudo-random sign, and the result is
/// L2-normalized. No model download is needed, which makes it suitable for
/// offline use and tests. Identical texts always map to identical vectors.
///
/// # Examples
///
/// ```
/// use docrag::embedding::{Embedder, HashingEmbedder, EMBEDDING_DIM};
///
/// let mut embedder = HashingEmbedder::new();
/// let vectors = embedder.embed(&["hello world".to_string()]).unwrap();
/// assert_eq!(vectors[0].len(), EMBEDDING_DIM);
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(EMBEDDING_DIM)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        for token in tokens {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64)
                as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), "hashing embedder");
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_have_expected_dimension() {
        let mut embedder = HashingEmbedder::new();
        let vectors = embedder
            .embed(&["fn main() {}".to_string(), "second".to_string()])
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == EMBEDDING_DIM));
    }

    #[test]
    fn identical_text_identical_vector() {
        let mut embedder = HashingEmbedder::new();
        let a = embedder.embed_query("def parse(tokens):").unwrap();
        let b = embedder.embed_query("def parse(tokens):").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tokens_are_case_insensitive() {
        let mut embedder = HashingEmbedder::new();
        let a = embedder.embed_query("Hello World").unwrap();
        let b = embedder.embed_query("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_empty_vectors_are_normalized() {
        let mut embedder = HashingEmbedder::new();
        let v = embedder.embed_query("some words to hash").unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let mut embedder = HashingEmbedder::with_dimension(8);
        let v = embedder.embed_query("   ").unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn validate_rejects_wrong_count() {
        let vectors = vec![vec![0.0; 4]];
        assert!(matches!(
            validate_vectors(&vectors, 2, 4),
            Err(Error::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn validate_rejects_wrong_dimension() {
        let vectors = vec![vec![0.0; 4], vec![0.0; 3]];
        assert!(validate_vectors(&vectors, 2, 4).is_err());
        assert!(validate_vectors(&vectors[..1], 1, 4).is_ok());
    }

    #[test]
    fn hashing_id_resolves_offline() {
        let embedder = from_model_id(HASHING_MODEL_ID, None).unwrap();
        assert_eq!(embedder.model_id(), HASHING_MODEL_ID);
        assert_eq!(embedder.dimension(), EMBEDDING_DIM);
    }

    #[test]
    fn unknown_model_id_is_rejected() {
        assert!(from_model_id("no-such-model", None).is_err());
    }

    #[test]
    fn explicit_model_id_wins() {
        assert_eq!(resolve_model_id(Some("bge-small-en-v1.5")), "bge-small-en-v1.5");
    }
}
