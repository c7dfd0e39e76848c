use chrono::{Local, NaiveDate, NaiveTime};
use tantivy::{
    TantivyDocument,
    schema::{Field, Value},
};

use crate::{
    error::{Error, Result},
    note::{Attachment, Note, today},
    note_store::NoteStore,
    tantivy_index::SchemaFields,
};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Whether a note is written for the first time or replaces its previous
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
}

/// Epoch seconds stored with a document, in the field named after the
/// write that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Created(i64),
    Modified(i64),
}

/// Sidecar values of one attachment slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    pub file_name: Option<String>,
    pub note: Option<String>,
    pub url: Option<String>,
}

/// A note as it is written to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    pub id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub timestamp: Timestamp,
    pub created_on: NaiveDate,
    pub modified_on: NaiveDate,
    pub attachment_count: usize,
    /// One entry per configured slot; slots past the note's attachments
    /// are `None`.
    pub slots: Vec<Option<Slot>>,
}

impl SearchDocument {
    pub fn from_note(
        note: &Note,
        mode: WriteMode,
        capacity: usize,
    ) -> Result<Self> {
        let id = note.id.clone().ok_or_else(|| {
            Error::Invariant("cannot index a note without an id".into())
        })?;
        if note.attachments.len() > capacity {
            return Err(Error::InvalidNote(format!(
                "note {id} has {} attachments, at most {capacity} allowed",
                note.attachments.len()
            )));
        }

        let timestamp = match mode {
            WriteMode::Insert => {
                Timestamp::Created(local_midnight_epoch(note.create_date))
            }
            WriteMode::Update => {
                Timestamp::Modified(local_midnight_epoch(note.modify_date))
            }
        };

        let mut slots = vec![None; capacity];
        for (slot, attachment) in slots.iter_mut().zip(&note.attachments) {
            *slot = Some(Slot {
                file_name: attachment.file_name().map(str::to_string),
                note: attachment.note.clone(),
                url: attachment.http_url.clone(),
            });
        }

        Ok(Self {
            id,
            description: note.description.clone(),
            tags: note.tags.clone(),
            timestamp,
            created_on: note.create_date,
            modified_on: note.modify_date,
            attachment_count: note.attachments.len(),
            slots,
        })
    }

    pub fn to_tantivy(&self, f: &SchemaFields) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(f.id, &self.id);
        doc.add_text(f.description, &self.description);
        for tag in &self.tags {
            doc.add_text(f.tag, tag);
        }
        match self.timestamp {
            Timestamp::Created(secs) => doc.add_i64(f.created, secs),
            Timestamp::Modified(secs) => doc.add_i64(f.modified, secs),
        }
        doc.add_text(
            f.created_on,
            &self.created_on.format(DAY_FORMAT).to_string(),
        );
        doc.add_text(
            f.modified_on,
            &self.modified_on.format(DAY_FORMAT).to_string(),
        );
        doc.add_u64(f.attach_count, self.attachment_count as u64);

        for (slot, fields) in self.slots.iter().zip(&f.slots) {
            let Some(slot) = slot else { continue };
            if let Some(name) = &slot.file_name {
                doc.add_text(fields.file, name);
            }
            if let Some(note) = &slot.note {
                doc.add_text(fields.note, note);
            }
            if let Some(url) = &slot.url {
                doc.add_text(fields.url, url);
            }
        }

        doc
    }
}

/// Epoch seconds of local midnight at the start of `date`. A midnight that
/// falls into a DST gap is taken as UTC.
pub fn local_midnight_epoch(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

/// Rebuild a note from a stored document. Attachments are read from the
/// first `attach-count` slots; file attachments resolve to the note's own
/// attachment directory.
pub fn project(
    doc: &TantivyDocument,
    f: &SchemaFields,
    store: &NoteStore,
) -> Note {
    let id = text(doc, f.id).unwrap_or_default();
    let tags = doc
        .get_all(f.tag)
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let count = doc
        .get_first(f.attach_count)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;
    let attachments = f
        .slots
        .iter()
        .take(count)
        .filter_map(|slot| {
            let note = text(doc, slot.note);
            match (text(doc, slot.file), text(doc, slot.url)) {
                (Some(file), _) => {
                    Some(store.resolve_attachment(&id, note, &file))
                }
                (None, Some(url)) => Some(Attachment::url(url, note)),
                (None, None) => note.map(|note| Attachment {
                    note: Some(note),
                    ..Attachment::default()
                }),
            }
        })
        .collect();

    Note {
        description: text(doc, f.description).unwrap_or_default(),
        tags,
        attachments,
        create_date: day(doc, f.created_on),
        modify_date: day(doc, f.modified_on),
        id: Some(id).filter(|id| !id.is_empty()),
    }
}

fn text(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn day(doc: &TantivyDocument, field: Field) -> NaiveDate {
    text(doc, field)
        .and_then(|s| NaiveDate::parse_from_str(&s, DAY_FORMAT).ok())
        .unwrap_or_else(today)
}
