use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

pub const DEFAULT_PHRASE_SLOP: u32 = 2;
pub const DEFAULT_MAX_ATTACHMENTS: usize = 5;

/// Every attachment slot adds three fields to the schema.
pub const MAX_ATTACHMENT_SLOTS: usize = 64;

/// Keys understood in the settings table.
pub mod keys {
    pub const PHRASE_SLOP: &str = "phrase_slop";
    pub const MAX_ATTACHMENTS: &str = "max_attachments";

    pub const ALL: &[&str] = &[PHRASE_SLOP, MAX_ATTACHMENTS];
}

/// Values the search index is built and queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Number of positions terms of a phrase may be apart.
    pub phrase_slop: u32,
    /// Attachment slots per note, which bounds the sidecar fields.
    pub max_attachments: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            phrase_slop: DEFAULT_PHRASE_SLOP,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
        }
    }
}

/// How the search index is brought up. Decided once, at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexInit {
    /// Discard the index and attachment tree and regenerate both from
    /// `notes.json`.
    Rebuild,
    /// Use the index on disk as is.
    Open,
}

impl IndexInit {
    pub fn from_flag(rebuild: bool) -> Self {
        if rebuild { Self::Rebuild } else { Self::Open }
    }
}

/// Values given on the command line or in the environment. They win over
/// stored settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub phrase_slop: Option<u32>,
    pub max_attachments: Option<usize>,
}

impl SearchConfig {
    /// Resolve each value from the overrides, then the settings table,
    /// then the defaults.
    pub fn resolve(overrides: &Overrides, config_db: &ConfigDb) -> Result<Self> {
        let phrase_slop = match overrides.phrase_slop {
            Some(slop) => slop,
            None => match config_db.get_setting(keys::PHRASE_SLOP)? {
                Some(raw) => parse_phrase_slop(&raw)?,
                None => DEFAULT_PHRASE_SLOP,
            },
        };
        let max_attachments = match overrides.max_attachments {
            Some(max) => check_max_attachments(max)?,
            None => match config_db.get_setting(keys::MAX_ATTACHMENTS)? {
                Some(raw) => parse_max_attachments(&raw)?,
                None => DEFAULT_MAX_ATTACHMENTS,
            },
        };

        Ok(Self {
            phrase_slop,
            max_attachments,
        })
    }
}

/// Check that `value` is acceptable for `key` before it is stored.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        keys::PHRASE_SLOP => parse_phrase_slop(value).map(|_| ()),
        keys::MAX_ATTACHMENTS => parse_max_attachments(value).map(|_| ()),
        other => Err(Error::Config(format!(
            "unknown setting '{other}' (known: {})",
            keys::ALL.join(", ")
        ))),
    }
}

fn parse_phrase_slop(raw: &str) -> Result<u32> {
    raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{} must be a non-negative integer, got '{raw}'",
            keys::PHRASE_SLOP
        ))
    })
}

fn parse_max_attachments(raw: &str) -> Result<usize> {
    let max = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{} must be a non-negative integer, got '{raw}'",
            keys::MAX_ATTACHMENTS
        ))
    })?;
    check_max_attachments(max)
}

fn check_max_attachments(max: usize) -> Result<usize> {
    if max > MAX_ATTACHMENT_SLOTS {
        return Err(Error::Config(format!(
            "{} must be at most {MAX_ATTACHMENT_SLOTS}, got {max}",
            keys::MAX_ATTACHMENTS
        )));
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn defaults_apply_without_settings() {
        let (_tmp, db) = test_db();
        let config = SearchConfig::resolve(&Overrides::default(), &db).unwrap();
        assert_eq!(config, SearchConfig::default());
    }

    #[test]
    fn stored_settings_beat_defaults_and_overrides_beat_both() {
        let (_tmp, db) = test_db();
        db.set_setting(keys::PHRASE_SLOP, "7").unwrap();
        db.set_setting(keys::MAX_ATTACHMENTS, "3").unwrap();

        let stored = SearchConfig::resolve(&Overrides::default(), &db).unwrap();
        assert_eq!(stored.phrase_slop, 7);
        assert_eq!(stored.max_attachments, 3);

        let overrides = Overrides {
            phrase_slop: Some(0),
            max_attachments: None,
        };
        let resolved = SearchConfig::resolve(&overrides, &db).unwrap();
        assert_eq!(resolved.phrase_slop, 0);
        assert_eq!(resolved.max_attachments, 3);
    }

    #[test]
    fn corrupt_stored_value_is_a_config_error() {
        let (_tmp, db) = test_db();
        db.set_setting(keys::PHRASE_SLOP, "-1").unwrap();
        assert!(matches!(
            SearchConfig::resolve(&Overrides::default(), &db),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn validate_setting_checks_keys_and_ranges() {
        assert!(validate_setting(keys::PHRASE_SLOP, "3").is_ok());
        assert!(validate_setting(keys::PHRASE_SLOP, "three").is_err());
        assert!(validate_setting(keys::MAX_ATTACHMENTS, "64").is_ok());
        assert!(validate_setting(keys::MAX_ATTACHMENTS, "65").is_err());
        assert!(validate_setting("model_name", "x").is_err());
    }

    #[test]
    fn init_from_flag() {
        assert_eq!(IndexInit::from_flag(true), IndexInit::Rebuild);
        assert_eq!(IndexInit::from_flag(false), IndexInit::Open);
    }
}
