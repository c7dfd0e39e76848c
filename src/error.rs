use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("invalid query: {0}")]
    QueryParser(#[from] tantivy::query::QueryParserError),

    #[error("note store error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("cannot open database: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid note: {0}")]
    InvalidNote(String),

    #[error("{0}")]
    AmbiguousNote(String),

    #[error("export rejected: {0}")]
    ExportRejected(String),

    /// A caller broke an invariant of the store (duplicate ids, updating a
    /// note that was never saved). Not a runtime condition.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
