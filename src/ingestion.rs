use std::collections::HashSet;

use rayon::prelude::*;
use tantivy::IndexWriter;
use tracing::debug;

use crate::{
    document::{SearchDocument, WriteMode},
    error::{Error, Result},
    note::{Note, normalize_tags},
    note_id::NoteId,
    tantivy_index::SearchIndex,
};

/// Make loaded records fit for indexing.
///
/// Records without an id get a fresh one, tags are normalized and every
/// note is validated against `max_attachments`. Two records sharing an id
/// mean the store is corrupt.
pub fn prepare_records(
    notes: Vec<Note>,
    max_attachments: usize,
) -> Result<Vec<Note>> {
    let mut seen = HashSet::with_capacity(notes.len());
    let mut prepared = Vec::with_capacity(notes.len());

    for mut note in notes {
        let id = match note.id.take() {
            Some(id) => id,
            None => {
                let id = NoteId::generate().into_string();
                debug!(note = %id, "assigned id to stored record");
                id
            }
        };
        if !seen.insert(id.clone()) {
            return Err(Error::Invariant(format!(
                "note id {id} appears more than once in the note store"
            )));
        }

        note.tags = normalize_tags(&note.tags);
        note.validate(max_attachments).map_err(|e| match e {
            Error::InvalidNote(reason) => {
                Error::InvalidNote(format!("stored note {id}: {reason}"))
            }
            other => other,
        })?;
        note.id = Some(id);
        prepared.push(note);
    }

    Ok(prepared)
}

/// Add a batch of notes to the index as new documents and commit once.
pub fn index_notes(
    index: &SearchIndex,
    writer: &mut IndexWriter,
    notes: &[Note],
) -> Result<usize> {
    let capacity = index.config().max_attachments;
    // Build documents in parallel, then write sequentially through the one
    // writer.
    let documents: Vec<SearchDocument> = notes
        .par_iter()
        .map(|note| SearchDocument::from_note(note, WriteMode::Insert, capacity))
        .collect::<Result<_>>()?;

    let fields = index.fields();
    for document in &documents {
        writer.add_document(document.to_tantivy(fields))?;
    }

    writer.commit()?;
    Ok(documents.len())
}
