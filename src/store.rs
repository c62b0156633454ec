//! Tag store management
//!
//! The store lives in a `.tagsift/` directory:
//! - `tags.db`: objects, tags, tag assignments and the query cache (SQLite)
//! - `config.toml`: store settings (TOML text)
//!
//! Mutations of tag assignments go through [`TagStore`] so that the cache
//! invalidation they trigger commits in the same transaction.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{self, InvalidationPolicy, TagsiftConfig, CONFIG_TOML, DEFAULT_CONFIG_TOML};
use crate::models::{tag_id_provenance, FileHandle, Inode};
use crate::rds::invalidator;

/// Default store directory name
pub const STORE_DIR: &str = ".tagsift";

/// Database file within the store directory
pub const TAGS_DB: &str = "tags.db";

/// Fingerprint of the cache-critical sources, computed by build.rs
pub const CACHE_SCHEMA_HASH: &str = env!("CACHE_SCHEMA_HASH");

/// A tag as attached to an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Plain(String),
    Triple {
        namespace: String,
        key: String,
        value: String,
    },
}

impl TagRef {
    /// Name under which cache entries record a dependency on this tag
    pub fn provenance_name(&self) -> &str {
        match self {
            TagRef::Plain(name) => name,
            TagRef::Triple { namespace, .. } => namespace,
        }
    }

    /// `(tagname, key, value)` columns; plain tags have empty key and value
    fn columns(&self) -> (&str, &str, &str) {
        match self {
            TagRef::Plain(name) => (name, "", ""),
            TagRef::Triple { namespace, key, value } => (namespace, key, value),
        }
    }
}

/// Parses `name` or `namespace:key=value`; the namespace keeps its colon
impl FromStr for TagRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            anyhow::bail!("Tag must not be empty");
        }

        if let Some(colon) = s.find(':') {
            let (namespace, rest) = s.split_at(colon + 1);
            if let Some((key, value)) = rest.split_once('=') {
                if namespace.len() == 1 || key.is_empty() {
                    anyhow::bail!("Invalid triple tag '{}' (expected namespace:key=value)", s);
                }
                return Ok(TagRef::Triple {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(TagRef::Plain(s.to_string()))
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagRef::Plain(name) => write!(f, "{}", name),
            TagRef::Triple { namespace, key, value } => write!(f, "{}{}={}", namespace, key, value),
        }
    }
}

/// A tag row with its usage count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub tag_id: i64,
    pub tag: TagRef,
    pub object_count: usize,
}

/// Manages the tagsift store directory
#[derive(Debug, Clone)]
pub struct TagStore {
    store_path: PathBuf,
    config: TagsiftConfig,
}

impl TagStore {
    /// Create a store handle for the given root directory, with default settings
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_config(root, TagsiftConfig::default())
    }

    /// Create a store handle with explicit settings
    pub fn with_config(root: impl AsRef<Path>, config: TagsiftConfig) -> Self {
        let store_path = root.as_ref().join(STORE_DIR);
        Self { store_path, config }
    }

    /// Create a store handle, reading `config.toml` if present
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let store_path = root.as_ref().join(STORE_DIR);
        let config = config::load_config(&store_path)?;
        Ok(Self { store_path, config })
    }

    /// Initialize the store directory structure
    ///
    /// Idempotent: existing tables and config are left alone, except that a
    /// changed schema fingerprint flushes the query cache.
    pub fn init(&self) -> Result<()> {
        log::info!("Initializing tag store at {:?}", self.store_path);

        if !self.store_path.exists() {
            std::fs::create_dir_all(&self.store_path)?;
        }

        self.init_db()?;
        self.init_config_toml()?;

        log::info!("Tag store initialized successfully");
        Ok(())
    }

    fn init_db(&self) -> Result<()> {
        let mut conn = self.connection()
            .context("Failed to create tags.db")?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journaling")?;
        log::debug!("tags.db journal_mode={}", mode);

        let tx = conn.transaction()?;

        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (
                inode INTEGER PRIMARY KEY AUTOINCREMENT,
                objectname TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tagname TEXT NOT NULL,
                \"key\" TEXT NOT NULL DEFAULT '',
                value TEXT NOT NULL DEFAULT '',
                UNIQUE (tagname, \"key\", value)
            );

            CREATE TABLE IF NOT EXISTS tagging (
                inode INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (inode, tag_id),
                FOREIGN KEY (inode) REFERENCES objects(inode) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(tag_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tagging_tag ON tagging(tag_id);
            CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(tagname);

            CREATE TABLE IF NOT EXISTS rds_index (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rds (
                id INTEGER NOT NULL,
                inode INTEGER NOT NULL,
                objectname TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_rds_id ON rds(id);
            CREATE INDEX IF NOT EXISTS idx_rds_inode ON rds(inode);

            CREATE TABLE IF NOT EXISTS rds_tags (
                id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (id, tag)
            );

            CREATE INDEX IF NOT EXISTS idx_rds_tags_tag ON rds_tags(tag);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;

        sync_schema_fingerprint(&tx)?;

        tx.commit()?;
        log::debug!("Created tags.db schema");
        Ok(())
    }

    fn init_config_toml(&self) -> Result<()> {
        let config_path = self.store_path.join(CONFIG_TOML);

        if config_path.exists() {
            return Ok(());
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TOML)?;

        log::debug!("Created default config.toml");
        Ok(())
    }

    /// Check if the store has been initialized
    pub fn exists(&self) -> bool {
        self.store_path.exists() && self.db_path().exists()
    }

    /// Path to the store directory
    pub fn path(&self) -> &Path {
        &self.store_path
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_path.join(TAGS_DB)
    }

    pub fn config(&self) -> &TagsiftConfig {
        &self.config
    }

    /// Remove the whole store directory
    pub fn clear(&self) -> Result<()> {
        log::warn!("Clearing tag store at {:?}", self.store_path);

        if self.store_path.exists() {
            std::fs::remove_dir_all(&self.store_path)?;
        }

        Ok(())
    }

    /// Open a connection with foreign keys and the configured busy timeout
    pub fn connection(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(self.db_path())?;
        conn.busy_timeout(self.config.store.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Create an object and return its inode
    pub fn add_object(&self, name: &str) -> Result<Inode> {
        let conn = self.connection()
            .context("Failed to open tags.db for object insert")?;

        conn.execute("INSERT INTO objects (objectname) VALUES (?)", [name])?;
        let inode = conn.last_insert_rowid();

        log::debug!("Added object {} ('{}')", inode, name);
        Ok(inode)
    }

    /// Rename an object, dropping cached results that list it under the old name
    pub fn rename_object(&self, inode: Inode, name: &str) -> Result<()> {
        let mut conn = self.connection()
            .context("Failed to open tags.db for object rename")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE objects SET objectname = ? WHERE inode = ?",
            rusqlite::params![name, inode],
        )?;
        if changed == 0 {
            anyhow::bail!("No object with inode {}", inode);
        }

        self.invalidate_for_object(&tx, inode)?;

        tx.commit()?;
        Ok(())
    }

    /// Delete an object and its tag assignments
    pub fn remove_object(&self, inode: Inode) -> Result<()> {
        let mut conn = self.connection()
            .context("Failed to open tags.db for object removal")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        self.invalidate_for_object(&tx, inode)?;

        let removed = tx.execute("DELETE FROM objects WHERE inode = ?", [inode])?;
        if removed == 0 {
            anyhow::bail!("No object with inode {}", inode);
        }

        tx.commit()?;
        log::debug!("Removed object {}", inode);
        Ok(())
    }

    /// Attach a tag to an object, creating the tag if needed
    ///
    /// Returns false when the object already carried the tag.
    pub fn tag_object(&self, inode: Inode, tag: &TagRef) -> Result<bool> {
        let mut conn = self.connection()
            .context("Failed to open tags.db for tagging")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_object(&tx, inode)?;

        let (tagname, key, value) = tag.columns();
        tx.execute(
            "INSERT OR IGNORE INTO tags (tagname, \"key\", value) VALUES (?, ?, ?)",
            [tagname, key, value],
        )?;
        let tag_id: i64 = tx.query_row(
            "SELECT tag_id FROM tags WHERE tagname = ? AND \"key\" = ? AND value = ?",
            [tagname, key, value],
            |row| row.get(0),
        )?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO tagging (inode, tag_id) VALUES (?, ?)",
            [inode, tag_id],
        )? > 0;

        if inserted {
            self.invalidate_for_tag(&tx, tag, tag_id)?;
        }

        tx.commit()?;
        log::debug!("Tagged object {} with '{}' (new={})", inode, tag, inserted);
        Ok(inserted)
    }

    /// Detach a tag from an object
    ///
    /// Returns false when the object did not carry the tag.
    pub fn untag_object(&self, inode: Inode, tag: &TagRef) -> Result<bool> {
        let mut conn = self.connection()
            .context("Failed to open tags.db for untagging")?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (tagname, key, value) = tag.columns();
        let tag_id: Option<i64> = tx
            .query_row(
                "SELECT tag_id FROM tags WHERE tagname = ? AND \"key\" = ? AND value = ?",
                [tagname, key, value],
                |row| row.get(0),
            )
            .optional()?;

        let Some(tag_id) = tag_id else {
            log::debug!("Untag of object {}: no tag '{}' in store", inode, tag);
            return Ok(false);
        };

        let removed = tx.execute(
            "DELETE FROM tagging WHERE inode = ? AND tag_id = ?",
            [inode, tag_id],
        )? > 0;

        if removed {
            self.invalidate_for_tag(&tx, tag, tag_id)?;
        }

        tx.commit()?;
        log::debug!("Untagged object {} from '{}' (removed={})", inode, tag, removed);
        Ok(removed)
    }

    /// List every object, ordered by inode
    pub fn list_objects(&self) -> Result<Vec<FileHandle>> {
        let conn = self.connection()
            .context("Failed to open tags.db")?;

        let mut stmt = conn.prepare("SELECT inode, objectname FROM objects ORDER BY inode")?;
        let objects = stmt
            .query_map([], |row| {
                Ok(FileHandle {
                    inode: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(objects)
    }

    /// List every tag with the number of objects carrying it
    pub fn list_tags(&self) -> Result<Vec<TagInfo>> {
        let conn = self.connection()
            .context("Failed to open tags.db")?;

        let mut stmt = conn.prepare(
            "SELECT tags.tag_id, tags.tagname, tags.\"key\", tags.value, COUNT(tagging.inode)
             FROM tags
             LEFT JOIN tagging ON tagging.tag_id = tags.tag_id
             GROUP BY tags.tag_id
             ORDER BY tags.tagname, tags.\"key\", tags.value",
        )?;

        let tags = stmt
            .query_map([], |row| {
                let tagname: String = row.get(1)?;
                let key: String = row.get(2)?;
                let value: String = row.get(3)?;
                let tag = if key.is_empty() && value.is_empty() {
                    TagRef::Plain(tagname)
                } else {
                    TagRef::Triple { namespace: tagname, key, value }
                };
                Ok(TagInfo {
                    tag_id: row.get(0)?,
                    tag,
                    object_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tags)
    }

    fn invalidate_for_tag(&self, conn: &Connection, tag: &TagRef, tag_id: i64) -> Result<()> {
        let dropped = match self.config.cache.invalidation {
            InvalidationPolicy::Scoped => {
                invalidator::invalidate_tag(conn, tag.provenance_name())?
                    + invalidator::invalidate_tag(conn, &tag_id_provenance(tag_id))?
            }
            InvalidationPolicy::FlushAll => invalidator::invalidate_all(conn)?,
        };
        log::debug!("Tag '{}' changed: dropped {} cached queries", tag, dropped);
        Ok(())
    }

    fn invalidate_for_object(&self, conn: &Connection, inode: Inode) -> Result<()> {
        let dropped = match self.config.cache.invalidation {
            InvalidationPolicy::Scoped => invalidator::invalidate_object(conn, inode)?,
            InvalidationPolicy::FlushAll => invalidator::invalidate_all(conn)?,
        };
        log::debug!("Object {} changed: dropped {} cached queries", inode, dropped);
        Ok(())
    }
}

fn ensure_object(conn: &Connection, inode: Inode) -> Result<()> {
    let found: Option<i64> = conn
        .query_row("SELECT inode FROM objects WHERE inode = ?", [inode], |row| row.get(0))
        .optional()?;

    if found.is_none() {
        anyhow::bail!("No object with inode {}", inode);
    }
    Ok(())
}

/// Flush the query cache when the cache-critical sources changed since it was filled
fn sync_schema_fingerprint(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema_hash'", [], |row| row.get(0))
        .optional()?;

    if stored.as_deref() == Some(CACHE_SCHEMA_HASH) {
        return Ok(());
    }

    if let Some(old) = stored {
        log::warn!(
            "Cache schema changed ({} -> {}), flushing cached queries",
            old,
            CACHE_SCHEMA_HASH
        );
        invalidator::invalidate_all(conn)?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_hash', ?)",
        [CACHE_SCHEMA_HASH],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_store() -> (TempDir, TagStore) {
        let temp = TempDir::new().unwrap();
        let store = TagStore::new(temp.path());
        store.init().unwrap();
        (temp, store)
    }

    #[test]
    fn test_store_init() {
        let (_temp, store) = init_store();
        assert!(store.exists());
        assert!(store.path().join(CONFIG_TOML).exists());
    }

    #[test]
    fn test_store_init_idempotent() {
        let (_temp, store) = init_store();
        let inode = store.add_object("keep.txt").unwrap();

        store.init().unwrap();
        let objects = store.list_objects().unwrap();
        assert_eq!(objects, vec![FileHandle { inode, name: "keep.txt".to_string() }]);
    }

    #[test]
    fn test_store_clear() {
        let (_temp, store) = init_store();
        store.clear().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_schema_tables() {
        let (_temp, store) = init_store();
        let conn = store.connection().unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'").unwrap()
            .query_map([], |row| row.get(0)).unwrap()
            .collect::<Result<Vec<_>, _>>().unwrap();

        for table in ["objects", "tags", "tagging", "rds_index", "rds", "rds_tags", "meta"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_schema_fingerprint_recorded() {
        let (_temp, store) = init_store();
        let conn = store.connection().unwrap();
        let hash: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_hash'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(hash, CACHE_SCHEMA_HASH);
    }

    #[test]
    fn test_schema_fingerprint_mismatch_flushes_cache() {
        let (_temp, store) = init_store();
        let conn = store.connection().unwrap();
        conn.execute("INSERT INTO rds_index (query, created_at) VALUES ('/tags/x/', 0)", []).unwrap();
        conn.execute("UPDATE meta SET value = 'stale' WHERE key = 'schema_hash'", []).unwrap();
        drop(conn);

        store.init().unwrap();

        let conn = store.connection().unwrap();
        let entries: i64 = conn.query_row("SELECT COUNT(*) FROM rds_index", [], |row| row.get(0)).unwrap();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_tag_ref_parse() {
        assert_eq!("red".parse::<TagRef>().unwrap(), TagRef::Plain("red".to_string()));
        assert_eq!(
            "time:year=2024".parse::<TagRef>().unwrap(),
            TagRef::Triple {
                namespace: "time:".to_string(),
                key: "year".to_string(),
                value: "2024".to_string(),
            }
        );
        assert_eq!("user:bob".parse::<TagRef>().unwrap(), TagRef::Plain("user:bob".to_string()));
        assert!("".parse::<TagRef>().is_err());
        assert!(":key=v".parse::<TagRef>().is_err());
        assert!("ns:=v".parse::<TagRef>().is_err());
    }

    #[test]
    fn test_tag_ref_display_round_trips() {
        let tag: TagRef = "geo:city=Rome".parse().unwrap();
        assert_eq!(tag.to_string(), "geo:city=Rome");
        assert_eq!(tag.provenance_name(), "geo:");
    }

    #[test]
    fn test_tag_and_untag() {
        let (_temp, store) = init_store();
        let inode = store.add_object("a.txt").unwrap();
        let red = TagRef::Plain("red".to_string());

        assert!(store.tag_object(inode, &red).unwrap());
        assert!(!store.tag_object(inode, &red).unwrap());

        let tags = store.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag, red);
        assert_eq!(tags[0].object_count, 1);

        assert!(store.untag_object(inode, &red).unwrap());
        assert!(!store.untag_object(inode, &red).unwrap());
        assert_eq!(store.list_tags().unwrap()[0].object_count, 0);
    }

    #[test]
    fn test_tag_missing_object() {
        let (_temp, store) = init_store();
        assert!(store.tag_object(99, &TagRef::Plain("red".to_string())).is_err());
    }

    #[test]
    fn test_remove_object_cascades_tagging() {
        let (_temp, store) = init_store();
        let inode = store.add_object("a.txt").unwrap();
        store.tag_object(inode, &TagRef::Plain("red".to_string())).unwrap();

        store.remove_object(inode).unwrap();

        assert!(store.list_objects().unwrap().is_empty());
        assert_eq!(store.list_tags().unwrap()[0].object_count, 0);
        assert!(store.remove_object(inode).is_err());
    }

    #[test]
    fn test_rename_object() {
        let (_temp, store) = init_store();
        let inode = store.add_object("old.txt").unwrap();
        store.rename_object(inode, "new.txt").unwrap();
        assert_eq!(store.list_objects().unwrap()[0].name, "new.txt");
        assert!(store.rename_object(inode + 1, "x").is_err());
    }

    #[test]
    fn test_open_reads_config() {
        let temp = TempDir::new().unwrap();
        let store = TagStore::new(temp.path());
        store.init().unwrap();
        std::fs::write(
            store.path().join(CONFIG_TOML),
            "[cache]\ninvalidation = \"flush-all\"\n",
        )
        .unwrap();

        let reopened = TagStore::open(temp.path()).unwrap();
        assert_eq!(reopened.config().cache.invalidation, InvalidationPolicy::FlushAll);
    }
}
