// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Replay-State Store
//!
//! Embedded redb database holding the small amount of state that must
//! survive a process restart:
//!
//! - the last-used account counter per chain, with its fetch timestamp
//!   (consulted by the submission coordinator's freshness window),
//! - boolean bootstrap flags ("account revealed"),
//! - the read-only environment exposed to job scripts,
//! - sealed private-key blobs for the software-backed key store.
//!
//! All tables are created eagerly at open so readers never observe a
//! missing table.

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};

/// chain id -> (last used counter, fetch timestamp in unix millis)
const COUNTERS: TableDefinition<&str, (u64, i64)> = TableDefinition::new("counters");

/// flag key -> value ("tezos/revealed", ...)
const FLAGS: TableDefinition<&str, bool> = TableDefinition::new("flags");

/// environment key -> value, visible to scripts via the `environment` capability
const ENVIRONMENT: TableDefinition<&str, &str> = TableDefinition::new("environment");

/// curve name -> sealed key blob (publicKey(64) || nonce(12) || ciphertext)
const SEALED_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("sealed_keys");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table access failed: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage operation failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit failed: {0}")]
    Commit(#[from] redb::CommitError),
}

/// Cached account counter with its fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterCache {
    /// Counter consumed by the most recent submission.
    pub counter: u64,
    /// Unix millis at which the value was last confirmed or bumped.
    pub fetched_at: i64,
}

/// Handle to the embedded store. Cheap to share behind an `Arc`.
pub struct ProcessorStore {
    db: Database,
}

impl ProcessorStore {
    /// Open (or create) the store at `path` and ensure all tables exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let tx = db.begin_write()?;
        {
            tx.open_table(COUNTERS)?;
            tx.open_table(FLAGS)?;
            tx.open_table(ENVIRONMENT)?;
            tx.open_table(SEALED_KEYS)?;
        }
        tx.commit()?;
        Ok(Self { db })
    }

    // =========================================================================
    // Counters
    // =========================================================================

    pub fn counter(&self, chain: &str) -> Result<Option<CounterCache>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(COUNTERS)?;
        Ok(table.get(chain)?.map(|v| {
            let (counter, fetched_at) = v.value();
            CounterCache {
                counter,
                fetched_at,
            }
        }))
    }

    pub fn set_counter(&self, chain: &str, cache: CounterCache) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(COUNTERS)?;
            table.insert(chain, (cache.counter, cache.fetched_at))?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Bootstrap flags
    // =========================================================================

    pub fn flag(&self, key: &str) -> Result<bool, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(FLAGS)?;
        Ok(table.get(key)?.map(|v| v.value()).unwrap_or(false))
    }

    pub fn set_flag(&self, key: &str, value: bool) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(FLAGS)?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Script environment
    // =========================================================================

    pub fn environment(&self, key: &str) -> Result<Option<String>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ENVIRONMENT)?;
        Ok(table.get(key)?.map(|v| v.value().to_owned()))
    }

    pub fn set_environment(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(ENVIRONMENT)?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Sealed keys
    // =========================================================================

    pub fn sealed_key(&self, curve: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(SEALED_KEYS)?;
        Ok(table.get(curve)?.map(|v| v.value().to_vec()))
    }

    pub fn set_sealed_key(&self, curve: &str, blob: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(SEALED_KEYS)?;
            table.insert(curve, blob)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ProcessorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessorStore::open(&dir.path().join("state.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn counter_round_trip() {
        let (_dir, store) = open_temp();
        assert_eq!(store.counter("tezos").unwrap(), None);

        let cache = CounterCache {
            counter: 20503891,
            fetched_at: 1_700_000_000_000,
        };
        store.set_counter("tezos", cache).unwrap();
        assert_eq!(store.counter("tezos").unwrap(), Some(cache));
    }

    #[test]
    fn flags_default_to_false() {
        let (_dir, store) = open_temp();
        assert!(!store.flag("tezos/revealed").unwrap());
        store.set_flag("tezos/revealed", true).unwrap();
        assert!(store.flag("tezos/revealed").unwrap());
    }

    #[test]
    fn environment_and_sealed_keys_round_trip() {
        let (_dir, store) = open_temp();
        store.set_environment("API_BASE", "https://api.example").unwrap();
        assert_eq!(
            store.environment("API_BASE").unwrap().as_deref(),
            Some("https://api.example")
        );
        assert_eq!(store.environment("MISSING").unwrap(), None);

        let blob = vec![0xAAu8; 140];
        store.set_sealed_key("secp256k1", &blob).unwrap();
        assert_eq!(store.sealed_key("secp256k1").unwrap(), Some(blob));
        assert_eq!(store.sealed_key("secp256r1").unwrap(), None);
    }
}
