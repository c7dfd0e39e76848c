use std::{collections::BTreeMap, path::Path};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const REBUILDS: TableDefinition<&str, i64> = TableDefinition::new("rebuilds");

const REBUILT_AT: &str = "rebuilt_at";
const REBUILT_NOTES: &str = "notes";
const REBUILT_SLOTS: &str = "slots";

/// What the last full rebuild of the search index produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildRecord {
    /// Epoch seconds.
    pub at: i64,
    pub notes: u64,
    pub slots: usize,
}

/// Stored settings and rebuild bookkeeping, kept in `config.redb` inside
/// the data directory.
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.open_table(REBUILDS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Remove a stored setting. Returns whether it was set.
    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn settings(&self) -> Result<BTreeMap<String, String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut settings = BTreeMap::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            settings.insert(k.value().to_string(), v.value().to_string());
        }
        Ok(settings)
    }

    // -- Rebuilds --

    pub fn record_rebuild(&self, record: RebuildRecord) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(REBUILDS)?;
            table.insert(REBUILT_AT, record.at)?;
            table.insert(REBUILT_NOTES, record.notes as i64)?;
            table.insert(REBUILT_SLOTS, record.slots as i64)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// The last recorded rebuild, if the index was ever rebuilt.
    pub fn last_rebuild(&self) -> Result<Option<RebuildRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(REBUILDS)?;
        let get = |key: &str| -> Result<Option<i64>> {
            Ok(table.get(key)?.map(|v| v.value()))
        };

        Ok(match (get(REBUILT_AT)?, get(REBUILT_NOTES)?, get(REBUILT_SLOTS)?) {
            (Some(at), Some(notes), Some(slots)) => Some(RebuildRecord {
                at,
                notes: notes.max(0) as u64,
                slots: slots.max(0) as usize,
            }),
            _ => None,
        })
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
