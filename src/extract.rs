//! Turning files on disk into plain text.
//!
//! Each supported format is a [`ContentExtractor`]; the
//! [`ExtractorRegistry`] picks one by file extension. Adding a format means
//! registering another extractor, nothing else in the pipeline changes.

use std::{collections::HashMap, path::Path, sync::Arc};

use tracing::debug;

use crate::error::ExtractError;

/// Extensions read as UTF-8 text by [`TextExtractor`].
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "org", "py", "pyi", "rs", "toml", "js",
    "jsx", "ts", "tsx", "json", "yaml", "yml", "css", "html", "htm", "xml",
    "csv", "log", "sh", "bash", "c", "h", "cpp", "hpp", "cc", "go", "java",
    "kt", "rb", "php", "sql", "ini", "cfg",
];

/// Converts one kind of file into plain text.
pub trait ContentExtractor: Send + Sync {
    /// Lowercase extensions (without the dot) this extractor handles.
    fn extensions(&self) -> &[&str];

    /// Extract the text content of the file at `path`.
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Reads files as UTF-8 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl ContentExtractor for TextExtractor {
    fn extensions(&self) -> &[&str] {
        TEXT_EXTENSIONS
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes).map_err(|_| ExtractError::Encoding)
    }
}

/// Extracts the text layer of PDF documents.
///
/// The parser panics on some malformed files. The panic is caught and
/// reported as [`ExtractError::Pdf`], so the file is skipped, but the
/// process panic hook still prints the parser's message to stderr first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl ContentExtractor for PdfExtractor {
    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = std::fs::read(path)?;
        std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
            .map_err(|payload| ExtractError::Pdf(panic_message(payload.as_ref())))?
            .map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    if detail.is_empty() {
        "parser panicked".to_string()
    } else {
        format!("parser panicked: {detail}")
    }
}

/// Extractors keyed by file extension.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    /// An empty registry that rejects every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in text and PDF extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TextExtractor);
        registry.register(PdfExtractor);
        registry
    }

    /// Register `extractor` for all of its extensions, replacing any
    /// extractor previously registered for the same extension.
    pub fn register<E: ContentExtractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn ContentExtractor> = Arc::new(extractor);
        for ext in extractor.extensions() {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), Arc::clone(&extractor));
        }
    }

    /// Whether some extractor handles `path`'s extension.
    pub fn supports(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.by_extension.contains_key(&ext))
    }

    /// Extract the text of `path` with the extractor for its extension.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = extension_of(path).unwrap_or_default();
        let extractor = self
            .by_extension
            .get(&ext)
            .ok_or_else(|| ExtractError::UnsupportedType(display_ext(&ext)))?;

        debug!(path = %path.display(), "extracting");
        extractor.extract(path)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn display_ext(ext: &str) -> String {
    if ext.is_empty() {
        "(no extension)".to_string()
    } else {
        format!(".{ext}")
    }
}
