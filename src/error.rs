use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("no index found at {0}")]
    IndexMissing(PathBuf),

    #[error("malformed index file {path}: {reason}")]
    IndexFormat { path: PathBuf, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

/// Why a single file could not be turned into text.
///
/// These never abort a reconciliation pass: the file is skipped and, if it
/// was indexed before, evicted.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8 text")]
    Encoding,

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}
