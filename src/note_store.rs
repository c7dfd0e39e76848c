use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    data_dir::{ATTACHMENTS_DIR, DataDir, NOTES_FILE},
    error::{Error, Result},
    note::{Attachment, Note, file_name_of},
};

/// Durable record of all notes (`notes.json`) and of their attachment
/// files (`attachments/<id>/<filename>`).
#[derive(Debug, Clone)]
pub struct NoteStore {
    data_dir: DataDir,
}

/// Result of [`NoteStore::export_all`]. A rejected export is a normal
/// outcome carrying a message for the user, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported { notes: usize, attachments: usize },
    Rejected(String),
}

impl NoteStore {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    /// Directory holding the attachment files of one note.
    pub fn attachment_dir(&self, note_id: &str) -> PathBuf {
        self.data_dir.attachments_dir().join(note_id)
    }

    // -- Records --

    /// Load every note in file order. A missing file is an empty store; a
    /// malformed one fails as a whole.
    pub fn load_all(&self) -> Result<Vec<Note>> {
        let path = self.data_dir.notes_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace the whole collection. The file is written next to the
    /// target and renamed over it.
    pub fn save_all(&self, notes: &[Note]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(notes)?;
        let mut tmp = tempfile::NamedTempFile::new_in(self.data_dir.root())?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.data_dir.notes_file())
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn get(&self, note_id: &str) -> Result<Option<Note>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|n| n.id.as_deref() == Some(note_id)))
    }

    /// Replace the record sharing `note`'s id, or append it.
    pub fn put(&self, note: &Note) -> Result<()> {
        let id = require_id(note)?;
        let mut notes = self.load_all()?;
        match notes.iter_mut().find(|n| n.id.as_deref() == Some(id)) {
            Some(existing) => *existing = note.clone(),
            None => notes.push(note.clone()),
        }
        self.save_all(&notes)
    }

    /// Remove the record with the given id. Returns whether one existed.
    pub fn remove(&self, note_id: &str) -> Result<bool> {
        let mut notes = self.load_all()?;
        let before = notes.len();
        notes.retain(|n| n.id.as_deref() != Some(note_id));
        if notes.len() == before {
            return Ok(false);
        }
        self.save_all(&notes)?;
        Ok(true)
    }

    // -- Attachments --

    /// The canonical attachment for a file stored under `note_id`.
    pub fn resolve_attachment(
        &self,
        note_id: &str,
        note_text: Option<String>,
        filename: &str,
    ) -> Attachment {
        Attachment {
            http_url: None,
            file_path: Some(self.attachment_dir(note_id).join(filename)),
            note: note_text,
        }
    }

    /// Copy `note`'s attachment files into its attachment directory.
    ///
    /// Sources are first copied into a fresh temporary directory, then the
    /// note's directory is deleted, recreated and filled from the staged
    /// copies. Sources may therefore live in the directory being replaced.
    /// The temporary directory is removed whether or not this succeeds, but
    /// the commit itself is not atomic.
    ///
    /// Returns the note with attachment paths pointing at their canonical
    /// location.
    pub fn stage_attachments(&self, note: &Note) -> Result<Note> {
        self.write_attachments(note, &self.data_dir.attachments_dir())
    }

    /// Delete the attachment directory of a note. Returns whether it
    /// existed.
    pub fn remove_attachments(&self, note_id: &str) -> Result<bool> {
        let dir = self.attachment_dir(note_id);
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    /// Replace the whole attachment tree with one holding exactly the
    /// files of `notes`.
    ///
    /// The current tree is moved into a temporary directory first, so
    /// attachments that already live in it can be staged again. A file is
    /// looked up at its recorded path, then under its note's directory in
    /// the moved tree, so a data directory that was moved or restored
    /// keeps its files. Files found in neither place are dropped with a
    /// warning. Directories of notes not in `notes` disappear with the
    /// temporary directory.
    ///
    /// If any note cannot be staged, the previous tree is put back before
    /// the error is returned.
    pub fn rebuild_attachments(&self, notes: Vec<Note>) -> Result<Vec<Note>> {
        let live_root = self.data_dir.attachments_dir();
        let previous = tempfile::Builder::new()
            .prefix(".previous-")
            .tempdir_in(self.data_dir.root())?;
        let moved_root = previous.path().join(ATTACHMENTS_DIR);
        if live_root.exists() {
            std::fs::rename(&live_root, &moved_root)?;
        }

        match self.restage_all(notes, &live_root, &moved_root) {
            Ok(rebuilt) => {
                previous.close()?;
                info!(notes = rebuilt.len(), "attachment tree rebuilt");
                Ok(rebuilt)
            }
            Err(e) => {
                match restore_tree(&live_root, &moved_root) {
                    Ok(()) => warn!(
                        error = %e,
                        "attachment rebuild failed, previous tree restored"
                    ),
                    Err(restore) => {
                        let kept = previous.keep();
                        warn!(
                            error = %e,
                            restore_error = %restore,
                            kept = %kept.display(),
                            "attachment rebuild failed, previous tree left in place"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn restage_all(
        &self,
        notes: Vec<Note>,
        live_root: &Path,
        moved_root: &Path,
    ) -> Result<Vec<Note>> {
        std::fs::create_dir_all(live_root)?;

        let mut rebuilt = Vec::with_capacity(notes.len());
        for mut note in notes {
            let id = note.id.clone();
            let attachments = std::mem::take(&mut note.attachments);
            note.attachments = attachments
                .into_iter()
                .filter_map(|attachment| {
                    relocate_source(
                        attachment,
                        id.as_deref(),
                        live_root,
                        moved_root,
                    )
                })
                .collect();
            rebuilt.push(self.stage_attachments(&note)?);
        }
        Ok(rebuilt)
    }

    // -- Export --

    /// Write a snapshot of `notes` into `target`: a `notes.json` whose
    /// attachment paths point into the snapshot, and the matching
    /// `attachments/` tree.
    ///
    /// `target` must be empty (it is created if missing). Nothing is ever
    /// overwritten. I/O failures are reported as a rejection.
    pub fn export_all(&self, target: &Path, notes: &[Note]) -> ExportOutcome {
        match is_empty_dir(target) {
            Ok(true) => {}
            Ok(false) => {
                return ExportOutcome::Rejected(format!(
                    "Directory {} must be empty",
                    target.display()
                ));
            }
            Err(e) => {
                warn!(error = %e, dir = %target.display(), "cannot read export directory");
                return ExportOutcome::Rejected(format!(
                    "Error reading {}",
                    target.display()
                ));
            }
        }

        match self.write_snapshot(target, notes) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, dir = %target.display(), "export failed");
                ExportOutcome::Rejected(format!(
                    "Error writing to {}",
                    target.display()
                ))
            }
        }
    }

    fn write_snapshot(
        &self,
        target: &Path,
        notes: &[Note],
    ) -> Result<ExportOutcome> {
        let attachments_root = target.join(ATTACHMENTS_DIR);
        let snapshot: Vec<Note> = notes
            .iter()
            .map(|note| relocate_into(note, &attachments_root))
            .collect();

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target.join(NOTES_FILE))?;
        file.write_all(&serde_json::to_vec_pretty(&snapshot)?)?;
        file.sync_all()?;

        std::fs::create_dir_all(&attachments_root)?;
        let mut attachments = 0;
        for note in notes {
            if note.id.is_none() {
                warn!(
                    description = %note.description,
                    "note without id exported without attachments"
                );
                continue;
            }
            let written = self.write_attachments(note, &attachments_root)?;
            attachments += written
                .attachments
                .iter()
                .filter(|a| a.file_path.is_some())
                .count();
        }

        info!(notes = notes.len(), attachments, dir = %target.display(), "export complete");
        Ok(ExportOutcome::Exported {
            notes: notes.len(),
            attachments,
        })
    }

    /// Copy-then-commit of one note's files into `attachments_root/<id>`.
    fn write_attachments(
        &self,
        note: &Note,
        attachments_root: &Path,
    ) -> Result<Note> {
        let id = require_id(note)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.data_dir.root())?;

        let mut staged = Vec::with_capacity(note.attachments.len());
        for attachment in &note.attachments {
            let file_path = match attachment.file_path.as_deref() {
                Some(source) => {
                    let name = file_name_of(source).ok_or_else(|| {
                        Error::InvalidNote(format!(
                            "attachment path has no file name: {}",
                            source.display()
                        ))
                    })?;
                    let dest = staging.path().join(name);
                    if dest.exists() {
                        warn!(note = id, file = name, "duplicate attachment name, keeping the last one");
                    }
                    std::fs::copy(source, &dest)?;
                    Some(dest)
                }
                None => None,
            };
            staged.push(Attachment {
                file_path,
                ..attachment.clone()
            });
        }
        debug!(note = id, staging = %staging.path().display(), "attachments staged");

        let note_dir = attachments_root.join(id);
        if note_dir.exists() {
            std::fs::remove_dir_all(&note_dir)?;
        }
        std::fs::create_dir_all(&note_dir)?;

        let mut committed = Vec::with_capacity(staged.len());
        for attachment in staged {
            let file_path = match attachment.file_path.as_deref() {
                Some(staged_path) => {
                    let name = file_name_of(staged_path).unwrap_or_default();
                    let dest = note_dir.join(name);
                    std::fs::copy(staged_path, &dest)?;
                    Some(dest)
                }
                None => None,
            };
            committed.push(Attachment {
                file_path,
                ..attachment
            });
        }

        staging.close()?;
        Ok(Note {
            attachments: committed,
            ..note.clone()
        })
    }
}

fn require_id(note: &Note) -> Result<&str> {
    note.id.as_deref().ok_or_else(|| {
        Error::Invariant("note has not been assigned an id".into())
    })
}

fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        return Ok(true);
    }
    Ok(std::fs::read_dir(dir)?.next().is_none())
}

/// Point file attachments at where they will live under `attachments_root`.
fn relocate_into(note: &Note, attachments_root: &Path) -> Note {
    let Some(id) = note.id.as_deref() else {
        return note.clone();
    };
    let attachments = note
        .attachments
        .iter()
        .map(|attachment| Attachment {
            file_path: attachment
                .file_name()
                .map(|name| attachments_root.join(id).join(name)),
            ..attachment.clone()
        })
        .collect();
    Note {
        attachments,
        ..note.clone()
    }
}

/// Put the moved-aside tree back where it came from, discarding a
/// partially rebuilt one.
fn restore_tree(live_root: &Path, moved_root: &Path) -> std::io::Result<()> {
    if !moved_root.exists() {
        return Ok(());
    }
    if live_root.exists() {
        std::fs::remove_dir_all(live_root)?;
    }
    std::fs::rename(moved_root, live_root)
}

/// Find the file of an attachment after the live tree was moved to
/// `moved_root`: at its recorded path (mapped into the moved tree when it
/// pointed into the live one), else at `moved_root/<note_id>/<file name>`.
/// Attachments whose file is gone keep only their URL or note text, or are
/// dropped entirely when nothing is left.
fn relocate_source(
    attachment: Attachment,
    note_id: Option<&str>,
    live_root: &Path,
    moved_root: &Path,
) -> Option<Attachment> {
    let Some(path) = attachment.file_path.as_deref() else {
        return Some(attachment);
    };
    let recorded = match path.strip_prefix(live_root) {
        Ok(relative) => moved_root.join(relative),
        Err(_) => path.to_path_buf(),
    };
    let source = if recorded.is_file() {
        Some(recorded)
    } else {
        note_id
            .zip(attachment.file_name())
            .map(|(id, name)| moved_root.join(id).join(name))
            .filter(|candidate| candidate.is_file())
    };
    if let Some(source) = source {
        return Some(Attachment {
            file_path: Some(source),
            ..attachment
        });
    }

    warn!(file = %path.display(), "attachment file missing, dropped");
    let remainder = Attachment {
        file_path: None,
        ..attachment
    };
    (remainder.http_url.is_some() || remainder.note.is_some())
        .then_some(remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, NoteStore) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(&tmp.path().join("data"))).unwrap();
        (tmp, NoteStore::new(data_dir))
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn leftover_temp_dirs(store: &NoteStore) -> Vec<String> {
        std::fs::read_dir(store.data_dir().root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_tmp, store) = test_store();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_fails_whole_load() {
        let (_tmp, store) = test_store();
        std::fs::write(
            store.data_dir().notes_file(),
            r#"[{"description":"ok"},{"description":"#,
        )
        .unwrap();
        assert!(matches!(store.load_all(), Err(Error::Json(_))));
    }

    #[test]
    fn save_and_reload_preserves_order_and_fields() {
        let (_tmp, store) = test_store();
        let notes: Vec<Note> = (0..5)
            .map(|i| {
                Note::new(
                    format!("note {i}"),
                    vec![format!("t{i}"), "shared".into()],
                    vec![Attachment::url(
                        format!("https://example.com/{i}"),
                        Some(format!("link {i}")),
                    )],
                )
                .with_id(format!("id-{i}"))
            })
            .collect();

        store.save_all(&notes).unwrap();
        assert_eq!(store.load_all().unwrap(), notes);
    }

    #[test]
    fn put_replaces_by_id_and_remove_deletes() {
        let (_tmp, store) = test_store();
        store.put(&Note::new("first", vec![], vec![]).with_id("a")).unwrap();
        store.put(&Note::new("second", vec![], vec![]).with_id("b")).unwrap();
        store
            .put(&Note::new("first, revised", vec![], vec![]).with_id("a"))
            .unwrap();

        let notes = store.load_all().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].description, "first, revised");
        assert_eq!(store.get("b").unwrap().unwrap().description, "second");

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn put_without_id_is_an_invariant_violation() {
        let (_tmp, store) = test_store();
        let result = store.put(&Note::new("no id", vec![], vec![]));
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[test]
    fn stage_copies_files_from_arbitrary_sources() {
        let (tmp, store) = test_store();
        let a = write_file(&tmp.path().join("x/y"), "report.pdf", "pdf");
        let b = write_file(&tmp.path().join("z"), "photo.png", "png");
        let note = Note::new(
            "trip",
            vec![],
            vec![
                Attachment::file(&a, Some("quarterly".into())),
                Attachment::file(&b, None),
            ],
        )
        .with_id("n1");

        let staged = store.stage_attachments(&note).unwrap();

        let dir = store.attachment_dir("n1");
        let mut names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["photo.png", "report.pdf"]);
        assert_eq!(
            staged.attachments[0].file_path.as_deref(),
            Some(dir.join("report.pdf").as_path())
        );
        assert_eq!(staged.attachments[0].note.as_deref(), Some("quarterly"));
        assert!(leftover_temp_dirs(&store).is_empty());
        // Sources are copied, never moved.
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn stage_replaces_previous_directory_wholesale() {
        let (tmp, store) = test_store();
        let old = write_file(&tmp.path().join("src"), "old.txt", "old");
        let new = write_file(&tmp.path().join("src"), "new.txt", "new");

        let note = Note::new("n", vec![], vec![Attachment::file(&old, None)])
            .with_id("n1");
        store.stage_attachments(&note).unwrap();

        let note = Note::new("n", vec![], vec![Attachment::file(&new, None)])
            .with_id("n1");
        store.stage_attachments(&note).unwrap();

        let dir = store.attachment_dir("n1");
        assert!(!dir.join("old.txt").exists());
        assert_eq!(std::fs::read_to_string(dir.join("new.txt")).unwrap(), "new");
    }

    #[test]
    fn restaging_canonical_files_keeps_them() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "keep.txt", "data");
        let note = Note::new("n", vec![], vec![Attachment::file(&src, None)])
            .with_id("n1");
        let staged = store.stage_attachments(&note).unwrap();

        // The sources now live in the directory being replaced.
        let again = store.stage_attachments(&staged).unwrap();
        let path = again.attachments[0].file_path.clone().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "data");
    }

    #[test]
    fn unreadable_source_fails_and_leaves_previous_files() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "a.txt", "a");
        let note = Note::new("n", vec![], vec![Attachment::file(&src, None)])
            .with_id("n1");
        store.stage_attachments(&note).unwrap();

        let broken = Note::new(
            "n",
            vec![],
            vec![Attachment::file(tmp.path().join("missing.txt"), None)],
        )
        .with_id("n1");
        assert!(matches!(
            store.stage_attachments(&broken),
            Err(Error::Io(_))
        ));
        assert!(store.attachment_dir("n1").join("a.txt").exists());
        assert!(leftover_temp_dirs(&store).is_empty());
    }

    #[test]
    fn resolve_attachment_builds_canonical_path() {
        let (_tmp, store) = test_store();
        let attachment =
            store.resolve_attachment("n1", Some("memo".into()), "a.txt");
        assert_eq!(
            attachment.file_path.unwrap(),
            store.data_dir().attachments_dir().join("n1").join("a.txt")
        );
        assert_eq!(attachment.note.as_deref(), Some("memo"));
    }

    #[test]
    fn remove_attachments_deletes_directory() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "a.txt", "a");
        let note = Note::new("n", vec![], vec![Attachment::file(&src, None)])
            .with_id("n1");
        store.stage_attachments(&note).unwrap();

        assert!(store.remove_attachments("n1").unwrap());
        assert!(!store.attachment_dir("n1").exists());
        assert!(!store.remove_attachments("n1").unwrap());
    }

    #[test]
    fn export_into_non_empty_directory_is_rejected() {
        let (tmp, store) = test_store();
        let target = tmp.path().join("export");
        write_file(&target, "existing.txt", "keep");

        let notes = vec![Note::new("n", vec![], vec![]).with_id("n1")];
        let outcome = store.export_all(&target, &notes);

        assert!(matches!(outcome, ExportOutcome::Rejected(ref m) if m.contains("must be empty")));
        let entries: Vec<_> = std::fs::read_dir(&target).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn export_writes_snapshot_and_attachment_tree() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "a.txt", "alpha");
        let staged = store
            .stage_attachments(
                &Note::new("n", vec![], vec![Attachment::file(&src, None)])
                    .with_id("n1"),
            )
            .unwrap();
        let notes = vec![
            staged,
            Note::new("plain", vec!["x".into()], vec![]).with_id("n2"),
        ];

        let target = tmp.path().join("export");
        let outcome = store.export_all(&target, &notes);
        assert_eq!(
            outcome,
            ExportOutcome::Exported {
                notes: 2,
                attachments: 1
            }
        );

        let exported = target.join("attachments").join("n1").join("a.txt");
        assert_eq!(std::fs::read_to_string(&exported).unwrap(), "alpha");

        let snapshot: Vec<Note> = serde_json::from_slice(
            &std::fs::read(target.join("notes.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot[0].attachments[0].file_path.as_deref(),
            Some(exported.as_path())
        );
    }

    #[test]
    fn rebuild_attachments_keeps_live_files_and_drops_orphans() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "a.txt", "alpha");
        let live = store
            .stage_attachments(
                &Note::new("live", vec![], vec![Attachment::file(&src, None)])
                    .with_id("live"),
            )
            .unwrap();
        store
            .stage_attachments(
                &Note::new("gone", vec![], vec![Attachment::file(&src, None)])
                    .with_id("gone"),
            )
            .unwrap();
        let missing = Note::new(
            "missing",
            vec![],
            vec![Attachment::file(
                tmp.path().join("nowhere.txt"),
                Some("kept".into()),
            )],
        )
        .with_id("missing");

        let rebuilt = store.rebuild_attachments(vec![live, missing]).unwrap();

        assert_eq!(
            std::fs::read_to_string(store.attachment_dir("live").join("a.txt"))
                .unwrap(),
            "alpha"
        );
        assert!(!store.attachment_dir("gone").exists());
        assert_eq!(rebuilt[1].attachments.len(), 1);
        assert_eq!(rebuilt[1].attachments[0].file_path, None);
        assert_eq!(rebuilt[1].attachments[0].note.as_deref(), Some("kept"));
        assert!(leftover_temp_dirs(&store).is_empty());
    }

    #[test]
    fn rebuild_attachments_survives_a_moved_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let src = write_file(&tmp.path().join("src"), "plan.txt", "plan");
        let before =
            NoteStore::new(DataDir::resolve(Some(&tmp.path().join("a"))).unwrap());
        let staged = before
            .stage_attachments(
                &Note::new("plan", vec![], vec![Attachment::file(&src, None)])
                    .with_id("n1"),
            )
            .unwrap();
        before.save_all(&[staged]).unwrap();

        // Neither the external source nor the recorded path exist anymore.
        std::fs::remove_file(&src).unwrap();
        std::fs::rename(tmp.path().join("a"), tmp.path().join("b")).unwrap();

        let store =
            NoteStore::new(DataDir::resolve(Some(&tmp.path().join("b"))).unwrap());
        let rebuilt =
            store.rebuild_attachments(store.load_all().unwrap()).unwrap();

        let expected = store.attachment_dir("n1").join("plan.txt");
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "plan");
        assert_eq!(rebuilt[0].attachments.len(), 1);
        assert_eq!(
            rebuilt[0].attachments[0].file_path.as_deref(),
            Some(expected.as_path())
        );
        assert!(leftover_temp_dirs(&store).is_empty());
    }

    #[test]
    fn failed_rebuild_restores_previous_tree() {
        let (tmp, store) = test_store();
        let src = write_file(&tmp.path().join("src"), "a.txt", "alpha");
        let first = store
            .stage_attachments(
                &Note::new("first", vec![], vec![Attachment::file(&src, None)])
                    .with_id("first"),
            )
            .unwrap();
        let last = store
            .stage_attachments(
                &Note::new("last", vec![], vec![Attachment::file(&src, None)])
                    .with_id("last"),
            )
            .unwrap();
        std::fs::remove_file(&src).unwrap();

        // Staging fails on the middle note, after `first` was restaged and
        // before `last` was.
        let unsaved = Note::new("unsaved", vec![], vec![]);
        let result = store.rebuild_attachments(vec![first, unsaved, last]);
        assert!(matches!(result, Err(Error::Invariant(_))));

        for id in ["first", "last"] {
            assert_eq!(
                std::fs::read_to_string(store.attachment_dir(id).join("a.txt"))
                    .unwrap(),
                "alpha"
            );
        }
        assert!(leftover_temp_dirs(&store).is_empty());
    }
}
