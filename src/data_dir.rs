use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const NOTES_FILE: &str = "notes.json";
pub const ATTACHMENTS_DIR: &str = "attachments";
pub const INDEX_DIR: &str = "lucene-index";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir or NOTEDB_DATA_DIR)
    /// 2. The XDG data directory (~/.local/share/notedb/)
    ///
    /// The directory is created if needed and canonicalized, so every
    /// attachment path derived from it is absolute.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else {
            xdg::BaseDirectories::with_prefix("notedb")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        let root = root
            .canonicalize()
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn notes_file(&self) -> PathBuf {
        self.root.join(NOTES_FILE)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let root = tmp.path().canonicalize().unwrap();

        assert_eq!(dir.root(), root);
        assert_eq!(dir.notes_file(), root.join("notes.json"));
        assert_eq!(dir.attachments_dir(), root.join("attachments"));
        assert_eq!(dir.index_dir(), root.join("lucene-index"));
        assert_eq!(dir.config_db(), root.join("config.redb"));
    }

    #[test]
    fn missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(dir.root().is_dir());
        assert!(dir.root().is_absolute());
    }
}
