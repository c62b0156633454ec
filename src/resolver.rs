//! Query resolution
//!
//! `resolve` runs the per-query state machine:
//! lookup → hit: load the cached rows; miss: materialize, then load.
//! The "all objects" path skips the cache entirely.
//!
//! Lookup and materialization of one key are serialized twice: by an
//! in-process lock per canonical key, and by an IMMEDIATE transaction that
//! re-checks the key before materializing, which covers other processes
//! sharing the database. `rds_index.query` is UNIQUE as a last guard.
//! A hit reads the entry id and its rows inside one read transaction.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rusqlite::TransactionBehavior;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::error::{ResolveError, Result};
use crate::fileset::{self, FileTree};
use crate::models::{CacheOutcome, QueryTree, RdsEntry, RdsStats};
use crate::rds;
use crate::store::TagStore;

/// Objects matching a query, and how they were obtained
#[derive(Debug, Clone)]
pub struct Resolution {
    pub files: FileTree,
    pub outcome: CacheOutcome,
}

/// One mutex per canonical key, created on demand
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

/// Holds a key's lock until dropped
pub struct KeyGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other holder of `key` remains
    pub fn acquire(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, slot| slot.strong_count() > 0);

            match slots.get(key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(Mutex::new(()));
                    slots.insert(key.to_string(), Arc::downgrade(&slot));
                    slot
                }
            }
        };

        KeyGuard {
            _guard: slot.lock_arc(),
        }
    }

    /// Number of keys currently held or awaited
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }
}

/// Resolves query trees against a tag store, through the query cache
#[derive(Debug)]
pub struct Resolver {
    store: TagStore,
    locks: KeyLocks,
}

impl Resolver {
    pub fn new(store: TagStore) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &TagStore {
        &self.store
    }

    /// Resolve a query into the objects satisfying it, grouped by name
    pub fn resolve(&self, query: &QueryTree, is_all_path: bool) -> Result<FileTree> {
        self.resolve_detailed(query, is_all_path)
            .map(|resolution| resolution.files)
    }

    /// Like [`Resolver::resolve`], also reporting cache hit, miss or bypass
    pub fn resolve_detailed(&self, query: &QueryTree, is_all_path: bool) -> Result<Resolution> {
        if is_all_path {
            let conn = self.store.connection()?;
            let files = fileset::load_rows(
                &conn,
                "SELECT objectname, inode FROM objects ORDER BY inode",
                [],
            )?;
            log::debug!("ALL path: {} objects, cache bypassed", files.total_handles());
            return Ok(Resolution {
                files,
                outcome: CacheOutcome::Bypass,
            });
        }

        if query.tree.is_empty() {
            log::error!("Empty query tree provided for '{}'", query.expanded_full_path);
            return Err(ResolveError::EmptyQuery);
        }

        let key = rds::canonical_key(query, &self.store.config().query.delimiter);
        let _key_guard = self.locks.acquire(key);

        let mut conn = self.store.connection()?;

        // Lookup and load share one read snapshot
        let read = conn.transaction()?;
        if let Some(rds_id) = rds::lookup(&read, key)? {
            log::debug!("RDS cache HIT: '{}' -> {}", key, rds_id);
            let files = rds::load(&read, rds_id)?;
            read.commit()?;
            return Ok(Resolution {
                files,
                outcome: CacheOutcome::Hit(rds_id),
            });
        }
        read.commit()?;

        log::debug!("RDS cache MISS: '{}'", key);

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (rds_id, outcome) = match rds::lookup(&tx, key)? {
            Some(rds_id) => {
                log::debug!("RDS for '{}' materialized concurrently as {}", key, rds_id);
                (rds_id, CacheOutcome::Hit(rds_id))
            }
            None => {
                let rds_id = rds::materialize(&tx, query, key)?;
                (rds_id, CacheOutcome::Miss(rds_id))
            }
        };

        let files = rds::load(&tx, rds_id)?;
        tx.commit()?;

        Ok(Resolution { files, outcome })
    }

    /// Drop every cached query
    pub fn invalidate(&self) -> Result<usize> {
        let mut conn = self.store.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let dropped = rds::invalidate_all(&tx)?;
        tx.commit()?;
        Ok(dropped)
    }

    /// Drop the cached queries depending on `tag`
    pub fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let mut conn = self.store.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let dropped = rds::invalidate_tag(&tx, tag)?;
        tx.commit()?;
        Ok(dropped)
    }

    pub fn stats(&self) -> Result<RdsStats> {
        let conn = self.store.connection()?;
        Ok(rds::stats(&conn)?)
    }

    pub fn entries(&self) -> Result<Vec<RdsEntry>> {
        let conn = self.store.connection()?;
        Ok(rds::list_entries(&conn)?)
    }
}
