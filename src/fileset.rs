//! Result assembly
//!
//! Turns `(objectname, inode)` rows into a name-indexed set of file handles.
//! The same object reached through several tag paths is kept once per name;
//! distinct objects sharing a name (homonyms) are all kept.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::models::{FileHandle, Inode};

/// Objects of a resolved query, grouped by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileTree {
    entries: HashMap<String, Vec<FileHandle>>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row, unless the name bucket already holds the same inode
    ///
    /// New handles go to the front of their bucket. Returns true if a
    /// handle was added.
    pub fn insert(&mut self, name: String, inode: Inode) -> bool {
        let bucket = self.entries.entry(name.clone()).or_default();

        if bucket.iter().any(|fh| fh.inode == inode) {
            return false;
        }

        bucket.insert(0, FileHandle { inode, name });
        true
    }

    /// Handles stored under `name`
    pub fn get(&self, name: &str) -> Option<&[FileHandle]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Inodes stored under `name`, sorted
    pub fn inodes(&self, name: &str) -> Vec<Inode> {
        let mut inodes: Vec<Inode> = self
            .get(name)
            .map(|handles| handles.iter().map(|fh| fh.inode).collect())
            .unwrap_or_default();
        inodes.sort_unstable();
        inodes
    }

    /// Sorted object names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of handles across all names
    pub fn total_handles(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FileHandle])> {
        self.entries.iter().map(|(name, handles)| (name.as_str(), handles.as_slice()))
    }

    pub fn into_map(self) -> HashMap<String, Vec<FileHandle>> {
        self.entries
    }
}

/// Run `sql` and assemble its `(objectname, inode)` rows
///
/// Statement and cursor failures are returned; a row whose columns cannot
/// be decoded is logged and skipped.
pub fn load_rows<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<FileTree> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;

    let mut tree = FileTree::new();
    let mut skipped = 0;

    while let Some(row) = rows.next()? {
        let decoded = row
            .get::<_, String>(0)
            .and_then(|name| Ok((name, row.get::<_, Inode>(1)?)));

        match decoded {
            Ok((name, inode)) => {
                tree.insert(name, inode);
            }
            Err(e) => {
                log::debug!("Skipping undecodable result row: {}", e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} undecodable result rows", skipped);
    }

    Ok(tree)
}
