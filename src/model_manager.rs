use std::path::PathBuf;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::{
    embedding::{EMBEDDING_DIM, Embedder},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";
pub const MODEL_ENV_VAR: &str = "DOCRAG_MODEL";

/// Model ids accepted by [`ModelManager`], all producing
/// [`EMBEDDING_DIM`]-dimensional vectors.
pub const SUPPORTED_MODELS: &[&str] =
    &["all-MiniLM-L6-v2", "all-MiniLM-L12-v2", "bge-small-en-v1.5"];

fn fastembed_model(model_id: &str) -> Option<EmbeddingModel> {
    match model_id {
        "all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        _ => None,
    }
}

/// Manages a local sentence-embedding model, loading it on first use.
///
/// Loading downloads the ONNX weights on the first run, so constructing a
/// `ModelManager` is cheap and never touches the network; only
/// [`Embedder::embed`] does.
pub struct ModelManager {
    model: Option<TextEmbedding>,
    model_id: String,
    kind: EmbeddingModel,
    cache_dir: Option<PathBuf>,
}

impl ModelManager {
    /// Creates a `ModelManager` for the default model
    /// (`all-MiniLM-L6-v2`).
    pub fn new() -> Self {
        Self {
            model: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            kind: EmbeddingModel::AllMiniLML6V2,
            cache_dir: None,
        }
    }

    /// Creates a `ModelManager` for an explicit model id.
    ///
    /// Fails with [`Error::Config`] if the id is not one of
    /// [`SUPPORTED_MODELS`].
    pub fn with_model_id(model_id: String) -> Result<Self> {
        let kind = fastembed_model(&model_id).ok_or_else(|| {
            Error::Config(format!(
                "unknown embedding model '{model_id}' (supported: {})",
                SUPPORTED_MODELS.join(", ")
            ))
        })?;
        Ok(Self {
            model: None,
            model_id,
            kind,
            cache_dir: None,
        })
    }

    /// Store downloaded model files under `dir` instead of the working
    /// directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&mut TextEmbedding> {
        if self.model.is_none() {
            info!(model = %self.model_id, "loading embedding model");
            let mut options = InitOptions::new(self.kind.clone())
                .with_show_download_progress(false);
            if let Some(dir) = &self.cache_dir {
                options = options.with_cache_dir(dir.clone());
            }
            let model = TextEmbedding::try_new(options).map_err(|e| {
                Error::EmbeddingUnavailable(format!(
                    "failed to load {}: {e}",
                    self.model_id
                ))
            })?;
            self.model = Some(model);
        }

        self.model.as_mut().ok_or_else(|| {
            Error::EmbeddingUnavailable("model not loaded".to_string())
        })
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for ModelManager {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.ensure_loaded()?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_not_loaded() {
        let manager = ModelManager::new();
        assert_eq!(manager.model_id(), DEFAULT_MODEL_ID);
        assert_eq!(manager.dimension(), EMBEDDING_DIM);
        assert!(!manager.is_loaded());
    }

    #[test]
    fn all_supported_ids_resolve() {
        for id in SUPPORTED_MODELS {
            let manager = ModelManager::with_model_id(id.to_string()).unwrap();
            assert_eq!(manager.model_id(), *id);
            assert!(!manager.is_loaded());
        }
    }

    #[test]
    fn unknown_id_is_a_config_error() {
        assert!(matches!(
            ModelManager::with_model_id("custom/model".to_string()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_batch_does_not_load_model() {
        let mut manager = ModelManager::new();
        assert!(manager.embed(&[]).unwrap().is_empty());
        assert!(!manager.is_loaded());
    }
}
