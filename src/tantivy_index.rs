use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::{Count, TopDocs},
    query::{AllQuery, TermQuery},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        StopWordFilter,
        TextAnalyzer,
    },
};
use tracing::{info, warn};

use crate::{
    config::{IndexInit, SearchConfig},
    document::{self, SearchDocument, WriteMode},
    error::{Error, Result},
    ingestion,
    note::{Note, normalize_tags},
    note_id::{NoteId, short_of},
    note_store::NoteStore,
    query::QueryBuilder,
};

/// Matches considered per search before truncation to [`MAX_RESULTS`].
pub const CANDIDATE_WINDOW: usize = 10_000;
/// Notes returned by one search.
pub const MAX_RESULTS: usize = 100;
/// Documents scanned when collecting tags.
pub const TAG_SCAN_LIMIT: usize = 1_000;

const WRITER_MEMORY_BUDGET: usize = 15_000_000;
const ENGLISH: &str = "english";

/// Dropped from analyzed text before stemming.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in",
    "into", "is", "it", "no", "not", "of", "on", "or", "such", "that", "the",
    "their", "then", "there", "these", "they", "this", "to", "was", "will",
    "with",
];

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const DESCRIPTION: &str = "description";
    pub const TAG: &str = "tag";
    pub const ATTACH_COUNT: &str = "attach-count";
    pub const CREATED: &str = "createDate";
    pub const MODIFIED: &str = "modifiedDate";
    pub const CREATED_ON: &str = "created-on";
    pub const MODIFIED_ON: &str = "modified-on";

    pub const ATTACH_FILE: &str = "attach-file";
    pub const ATTACH_NOTE: &str = "attach-note";
    pub const ATTACH_URL: &str = "attach-url";

    /// Name of the `index`th field of a per-slot family, e.g.
    /// `attach-file_0`.
    pub fn slot(prefix: &str, index: usize) -> String {
        format!("{prefix}_{index}")
    }
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub id: Field,
    pub description: Field,
    pub tag: Field,
    pub attach_count: Field,
    pub created: Field,
    pub modified: Field,
    pub created_on: Field,
    pub modified_on: Field,
    /// Every slot present in the schema, in slot order.
    pub slots: Vec<SlotFields>,
}

/// Sidecar fields of one attachment slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotFields {
    pub file: Field,
    pub note: Field,
    pub url: Field,
}

/// Notes matched by a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub notes: Vec<Note>,
    /// Matches found, bounded by [`CANDIDATE_WINDOW`].
    pub total_hits: usize,
    pub elapsed: Duration,
}

/// Schema with `slots` attachment slots.
pub fn build_schema(slots: usize) -> Schema {
    let mut builder = Schema::builder();

    let analyzed = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(ENGLISH)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    builder.add_text_field(fields::ID, STRING | STORED);
    builder.add_text_field(fields::DESCRIPTION, analyzed.clone());
    builder.add_text_field(fields::TAG, STRING | STORED);
    builder.add_u64_field(fields::ATTACH_COUNT, STORED);
    builder.add_i64_field(fields::CREATED, INDEXED | STORED);
    builder.add_i64_field(fields::MODIFIED, INDEXED | STORED);
    builder.add_text_field(fields::CREATED_ON, STRING | STORED);
    builder.add_text_field(fields::MODIFIED_ON, STRING | STORED);

    for i in 0..slots {
        builder.add_text_field(
            &fields::slot(fields::ATTACH_FILE, i),
            analyzed.clone(),
        );
        builder.add_text_field(
            &fields::slot(fields::ATTACH_NOTE, i),
            analyzed.clone(),
        );
        builder.add_text_field(&fields::slot(fields::ATTACH_URL, i), STORED);
    }

    builder.build()
}

/// Lower-cased, Porter-stemmed English with [`STOP_WORDS`] removed. Removed
/// words leave a gap in token positions, which phrase queries respect.
pub(crate) fn register_tokenizers(index: &Index) {
    let english = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(|word| word.to_string()),
        ))
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register(ENGLISH, english);
}

/// Number of consecutive attachment slots defined by `schema`.
fn slot_count(schema: &Schema) -> usize {
    (0..)
        .take_while(|&i| {
            schema
                .get_field(&fields::slot(fields::ATTACH_FILE, i))
                .is_ok()
        })
        .count()
}

impl SchemaFields {
    /// Resolve every field of `schema`, which must define at least
    /// `min_slots` attachment slots.
    pub fn resolve(schema: &Schema, min_slots: usize) -> Result<Self> {
        let available = slot_count(schema);
        if available < min_slots {
            return Err(Error::Config(format!(
                "search index has {available} attachment slots but \
                 max_attachments is {min_slots}; rebuild it with \
                 --rebuild-index"
            )));
        }

        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                Error::Config(format!(
                    "search index has no '{name}' field; rebuild it with \
                     --rebuild-index"
                ))
            })
        };
        let slots = (0..available)
            .map(|i| {
                Ok(SlotFields {
                    file: field(&fields::slot(fields::ATTACH_FILE, i))?,
                    note: field(&fields::slot(fields::ATTACH_NOTE, i))?,
                    url: field(&fields::slot(fields::ATTACH_URL, i))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: field(fields::ID)?,
            description: field(fields::DESCRIPTION)?,
            tag: field(fields::TAG)?,
            attach_count: field(fields::ATTACH_COUNT)?,
            created: field(fields::CREATED)?,
            modified: field(fields::MODIFIED)?,
            created_on: field(fields::CREATED_ON)?,
            modified_on: field(fields::MODIFIED_ON)?,
            slots,
        })
    }
}

/// Full-text index over the notes of a [`NoteStore`].
///
/// The store stays the record of truth; this index can always be rebuilt
/// from it. Every mutation goes through here and is forwarded to the store
/// once the index has committed.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
    store: NoteStore,
    config: SearchConfig,
}

impl SearchIndex {
    /// Bring up the index in the store's data directory.
    pub fn open(
        store: NoteStore,
        init: IndexInit,
        config: SearchConfig,
    ) -> Result<Self> {
        match init {
            IndexInit::Rebuild => Self::rebuild(store, config),
            IndexInit::Open => Self::open_existing(store, config),
        }
    }

    /// Open the index on disk. An empty one is created only while the
    /// store holds no records; otherwise a missing index must be rebuilt.
    fn open_existing(store: NoteStore, config: SearchConfig) -> Result<Self> {
        let dir = store.data_dir().index_dir();
        std::fs::create_dir_all(&dir)?;

        let mmap_dir = tantivy::directory::MmapDirectory::open(&dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            let records = store.load_all()?.len();
            if records > 0 {
                return Err(Error::Config(format!(
                    "no search index for {records} stored note(s); build it \
                     with --rebuild-index"
                )));
            }
            Index::create(
                mmap_dir,
                build_schema(config.max_attachments),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index, store, config)
    }

    /// Discard the index and the attachment tree and regenerate both from
    /// the records in the store.
    fn rebuild(store: NoteStore, config: SearchConfig) -> Result<Self> {
        let dir = store.data_dir().index_dir();
        warn!(dir = %dir.display(), "rebuilding search index from note store");
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }

        let notes =
            ingestion::prepare_records(store.load_all()?, config.max_attachments)?;
        let notes = store.rebuild_attachments(notes)?;

        std::fs::create_dir_all(&dir)?;
        let mmap_dir = tantivy::directory::MmapDirectory::open(&dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = Index::create(
            mmap_dir,
            build_schema(config.max_attachments),
            tantivy::IndexSettings::default(),
        )?;
        let search_index = Self::from_index(index, store, config)?;

        let indexed = {
            let mut writer = search_index.writer()?;
            ingestion::index_notes(&search_index, &mut writer, &notes)?
        };
        search_index.store.save_all(&notes)?;
        search_index.reader.reload()?;

        info!(notes = indexed, "search index rebuilt");
        Ok(search_index)
    }

    /// Create an in-memory index over `store` (for testing).
    pub fn open_in_ram(store: NoteStore, config: SearchConfig) -> Result<Self> {
        let index = Index::create_in_ram(build_schema(config.max_attachments));
        Self::from_index(index, store, config)
    }

    fn from_index(
        index: Index,
        store: NoteStore,
        config: SearchConfig,
    ) -> Result<Self> {
        register_tokenizers(&index);
        let fields =
            SchemaFields::resolve(&index.schema(), config.max_attachments)?;
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
            store,
            config,
        })
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn fields(&self) -> &SchemaFields {
        &self.fields
    }

    /// Number of indexed notes.
    pub fn doc_count(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Whether a note with this exact id is indexed.
    pub fn contains(&self, note_id: &str) -> Result<bool> {
        self.reader.reload()?;
        let query = TermQuery::new(
            Term::from_field_text(self.fields.id, note_id),
            IndexRecordOption::Basic,
        );
        Ok(self.reader.searcher().search(&query, &Count)? > 0)
    }

    /// Write `note` to the index, then stage its attachments and persist
    /// the record.
    ///
    /// An insert assigns an id when the note has none; an update replaces
    /// the document sharing the note's id. The index commit, the attachment
    /// copy and the record write are separate steps: if a later one fails,
    /// the earlier ones stay applied.
    ///
    /// Returns the note as stored, with canonical attachment paths.
    pub fn upsert(&self, note: &Note, mode: WriteMode) -> Result<Note> {
        let mut note = note.clone();
        note.tags = normalize_tags(&note.tags);
        note.validate(self.config.max_attachments)?;

        let id = match (mode, note.id.clone()) {
            (WriteMode::Insert, None) => NoteId::generate().into_string(),
            (WriteMode::Insert, Some(id)) => {
                if self.contains(&id)? {
                    return Err(Error::Invariant(format!(
                        "note {id} is already indexed"
                    )));
                }
                id
            }
            (WriteMode::Update, Some(id)) => id,
            (WriteMode::Update, None) => {
                return Err(Error::Invariant(
                    "cannot update a note that was never saved".into(),
                ));
            }
        };
        note.id = Some(id.clone());

        let document =
            SearchDocument::from_note(&note, mode, self.config.max_attachments)?;
        {
            let mut writer = self.writer()?;
            if mode == WriteMode::Update {
                writer.delete_term(Term::from_field_text(self.fields.id, &id));
            }
            writer.add_document(document.to_tantivy(&self.fields))?;
            writer.commit()?;
        }
        self.reader.reload()?;

        let canonical = self.store.stage_attachments(&note)?;
        self.store.put(&canonical)?;

        info!(note = short_of(&id), ?mode, "note saved");
        Ok(canonical)
    }

    /// Remove a note from the index, its attachment directory and the
    /// record store.
    pub fn delete(&self, note: &Note) -> Result<()> {
        let id = note.id.as_deref().ok_or_else(|| {
            Error::Invariant("cannot delete a note that was never saved".into())
        })?;

        {
            let mut writer = self.writer()?;
            writer.delete_term(Term::from_field_text(self.fields.id, id));
            writer.commit()?;
        }
        self.reader.reload()?;

        self.store.remove_attachments(id)?;
        self.store.remove(id)?;

        info!(note = short_of(id), "note deleted");
        Ok(())
    }

    /// Find notes whose description or attachments match `text` and that
    /// carry every tag in `tags`.
    ///
    /// With `phrase` the words of `text` must appear in order, at most
    /// `phrase_slop` positions apart, in any one of the description and
    /// the attachment fields. Otherwise `text` is parsed as a query that
    /// the description must match. A blank `text` filters by tags only.
    pub fn search_for_description(
        &self,
        text: &str,
        phrase: bool,
        tags: &[String],
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let query = QueryBuilder::new(
            &self.index,
            &self.fields,
            self.config.phrase_slop,
            self.config.max_attachments,
        )
        .build(text, phrase, tags)?;

        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let top_docs =
            searcher.search(&*query, &TopDocs::with_limit(CANDIDATE_WINDOW))?;

        let total_hits = top_docs.len();
        let mut notes = Vec::with_capacity(total_hits.min(MAX_RESULTS));
        for (_score, address) in top_docs.into_iter().take(MAX_RESULTS) {
            let doc: TantivyDocument = searcher.doc(address)?;
            notes.push(document::project(&doc, &self.fields, &self.store));
        }

        let elapsed = started.elapsed();
        info!(
            total_hits,
            returned = notes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "search complete"
        );
        Ok(SearchResult {
            notes,
            total_hits,
            elapsed,
        })
    }

    /// Distinct tags of the first [`TAG_SCAN_LIMIT`] documents, sorted.
    pub fn unique_tags(&self) -> Result<Vec<String>> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let top_docs =
            searcher.search(&AllQuery, &TopDocs::with_limit(TAG_SCAN_LIMIT))?;

        let mut tags = BTreeSet::new();
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            for value in doc.get_all(self.fields.tag) {
                if let Some(tag) = value.as_str().map(str::trim)
                    && !tag.is_empty()
                {
                    tags.insert(tag.to_string());
                }
            }
        }

        Ok(tags.into_iter().collect())
    }

    pub(crate) fn writer(&self) -> Result<IndexWriter> {
        Ok(self.index.writer(WRITER_MEMORY_BUDGET)?)
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
