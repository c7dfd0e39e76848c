//! notedb - a note store with tags, attachments and full-text search.
//!
//! Notes live in one JSON file (`notes.json`) with their attachment files
//! under `attachments/<id>/`. A [Tantivy](https://github.com/quickwit-oss/tantivy)
//! index derived from them answers phrase, term and tag queries and can be
//! rebuilt from the records at any time.
//!
//! # Quick start
//!
//! ```no_run
//! use notedb::{
//!     ConfigDb, DataDir, IndexInit, NoteStore, SearchConfig, SearchIndex,
//!     config::Overrides,
//!     document::WriteMode,
//!     note::Note,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let config = SearchConfig::resolve(&Overrides::default(), &config_db).unwrap();
//! let index =
//!     SearchIndex::open(NoteStore::new(data_dir), IndexInit::Open, config).unwrap();
//!
//! let note = Note::new("buy a new bike lock", vec!["errands".into()], vec![]);
//! index.upsert(&note, WriteMode::Insert).unwrap();
//!
//! let result = index
//!     .search_for_description("bike lock", true, &["errands".into()])
//!     .unwrap();
//! for note in &result.notes {
//!     println!("{}", note.description);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod document;
pub mod error;
pub mod ingestion;
pub mod note;
pub mod note_id;
pub mod note_store;
mod query;
pub mod search;
pub mod tantivy_index;

pub use config::{IndexInit, SearchConfig};
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use note::{Attachment, Note};
pub use note_id::NoteId;
pub use note_store::{ExportOutcome, NoteStore};
pub use tantivy_index::{SearchIndex, SearchResult};
