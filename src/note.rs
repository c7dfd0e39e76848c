use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A user record: description text, tags and attachments.
///
/// Serialized with camelCase keys and `yyyy-MM-dd` dates, which is the
/// format of `notes.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Assigned on first save, never changed afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default = "today")]
    pub create_date: NaiveDate,
    #[serde(default = "today")]
    pub modify_date: NaiveDate,
}

/// A file or a URL linked to a note, with an optional annotation.
///
/// At most one of `file_path` and `http_url` is set. An attachment with
/// neither carries only its note text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Today's date in the local time zone.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl Note {
    /// A not-yet-saved note dated today.
    pub fn new(
        description: impl Into<String>,
        tags: Vec<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        let today = today();
        Self {
            id: None,
            description: description.into(),
            tags: normalize_tags(tags),
            attachments,
            create_date: today,
            modify_date: today,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check the constraints every saved note must satisfy.
    pub fn validate(&self, max_attachments: usize) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(Error::InvalidNote(
                "description must not be blank".into(),
            ));
        }
        if self.attachments.len() > max_attachments {
            return Err(Error::InvalidNote(format!(
                "{} attachments given, at most {max_attachments} allowed",
                self.attachments.len()
            )));
        }
        for attachment in &self.attachments {
            if attachment.file_path.is_some() && attachment.http_url.is_some()
            {
                return Err(Error::InvalidNote(
                    "an attachment is either a file or a URL, not both".into(),
                ));
            }
            if let Some(path) = &attachment.file_path
                && file_name_of(path).is_none()
            {
                return Err(Error::InvalidNote(format!(
                    "attachment path has no file name: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl Attachment {
    pub fn file(path: impl Into<PathBuf>, note: Option<String>) -> Self {
        Self {
            http_url: None,
            file_path: Some(path.into()),
            note: non_blank(note),
        }
    }

    pub fn url(url: impl Into<String>, note: Option<String>) -> Self {
        Self {
            http_url: Some(url.into()),
            file_path: None,
            note: non_blank(note),
        }
    }

    /// File name of the attached file, if this is a file attachment.
    pub fn file_name(&self) -> Option<&str> {
        self.file_path.as_deref().and_then(file_name_of)
    }
}

pub(crate) fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Trim tags, drop blank ones and remove duplicates, keeping the first
/// occurrence of each.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
