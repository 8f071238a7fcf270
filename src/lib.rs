//! docrag - retrieval-augmented question answering over a folder of documents.
//!
//! docrag keeps an incrementally maintained semantic index of a document
//! directory. Each [`reconcile`] pass re-embeds only files whose
//! modification time advanced, drops deleted files, and rebuilds a flat
//! vector index from a persistent per-file embedding cache. At query time
//! [`retrieve`] returns the chunks nearest to a question, ready to be
//! handed to a language model through a [`generation::Generator`].
//!
//! # Quick start
//!
//! ```no_run
//! use docrag::{ArtifactPaths, DataDir, ReconcileOptions, reconcile, retrieve};
//! use docrag::embedding::HashingEmbedder;
//! use std::path::Path;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let paths = data_dir.artifact_paths();
//! let mut embedder = HashingEmbedder::new();
//!
//! let report = reconcile(
//!     Path::new("./code_docs"),
//!     &paths,
//!     &mut embedder,
//!     &ReconcileOptions::default(),
//! )
//! .unwrap();
//! println!("{} chunks indexed", report.total_chunks);
//!
//! let context = retrieve(
//!     "how are files parsed?",
//!     &paths.index,
//!     &paths.mapping,
//!     5,
//!     &mut embedder,
//! );
//! println!("{context}");
//! ```

pub mod chunking;
pub mod data_dir;
pub mod embedding;
pub mod embedding_cache;
pub mod error;
pub mod extract;
pub mod generation;
pub mod incremental;
pub mod index_builder;
pub mod mapping;
pub mod model_manager;
pub mod persist;
pub mod reconcile;
pub mod retrieval;
pub mod vector_index;
pub mod walker;

pub use data_dir::DataDir;
pub use embedding::Embedder;
pub use error::{Error, ExtractError, Result};
pub use model_manager::ModelManager;
pub use reconcile::{
    ArtifactPaths,
    ReconcileOptions,
    ReconcileReport,
    reconcile,
};
pub use retrieval::retrieve;
