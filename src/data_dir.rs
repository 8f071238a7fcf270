use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    reconcile::{
        ArtifactPaths,
        CACHE_FILE,
        INDEX_FILE,
        MAPPING_FILE,
        METADATA_FILE,
    },
};

pub const DATA_DIR_ENV_VAR: &str = "DOCRAG_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCRAG_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docrag/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docrag")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_file(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn mapping_file(&self) -> PathBuf {
        self.root.join(MAPPING_FILE)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    pub fn cache_file(&self) -> PathBuf {
        self.root.join(CACHE_FILE)
    }

    /// Where downloaded embedding models are stored.
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.root)
    }
}
