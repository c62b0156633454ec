//! Reusable data sets (RDS): the materialized query cache
//!
//! Each resolved query is stored once under its canonical key:
//! - `rds_index`: `(id, query)`; `query` is UNIQUE so a key maps to one entry
//! - `rds`: `(id, inode, objectname)` result rows
//! - `rds_tags`: `(id, tag)` provenance, the tags an entry depends on

pub mod invalidator;
pub mod materializer;

use rusqlite::{Connection, OptionalExtension};

use crate::fileset::{self, FileTree};
use crate::models::{QueryTree, RdsEntry, RdsId, RdsStats};

pub use invalidator::{invalidate_all, invalidate_object, invalidate_tag};
pub use materializer::materialize;

/// Cache key of a query: its expanded path cut at the first query delimiter
///
/// Pagination, ordering and file name suffixes after the delimiter do not
/// change the set of matching objects, so they are not part of the key.
pub fn canonical_key<'a>(query: &'a QueryTree, delimiter: &str) -> &'a str {
    let path = query.expanded_full_path.as_str();
    match path.find(delimiter) {
        Some(pos) => &path[..pos],
        None => path,
    }
}

/// Find the entry stored under `key`
pub fn lookup(conn: &Connection, key: &str) -> rusqlite::Result<Option<RdsId>> {
    conn.query_row("SELECT id FROM rds_index WHERE query = ?", [key], |row| row.get(0))
        .optional()
}

/// Load the rows of an entry into a file tree
pub fn load(conn: &Connection, id: RdsId) -> rusqlite::Result<FileTree> {
    fileset::load_rows(
        conn,
        "SELECT objectname, inode FROM rds WHERE id = ? ORDER BY inode",
        [id],
    )
}

/// Row counts of the cache tables
pub fn stats(conn: &Connection) -> rusqlite::Result<RdsStats> {
    let count = |table: &str| -> rusqlite::Result<usize> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
    };

    Ok(RdsStats {
        entries: count("rds_index")?,
        rows: count("rds")?,
        provenance_tags: count("rds_tags")?,
    })
}

/// List cached queries, oldest first
pub fn list_entries(conn: &Connection) -> rusqlite::Result<Vec<RdsEntry>> {
    let mut stmt = conn.prepare(
        "SELECT rds_index.id, rds_index.query, rds_index.created_at,
                (SELECT COUNT(*) FROM rds WHERE rds.id = rds_index.id)
         FROM rds_index
         ORDER BY rds_index.id",
    )?;

    let entries = stmt.query_map([], |row| {
        let created_at: i64 = row.get(2)?;
        Ok(RdsEntry {
            id: row.get(0)?,
            query: row.get(1)?,
            created_at: chrono::DateTime::from_timestamp(created_at, 0)
                .unwrap_or_else(chrono::Utc::now)
                .to_rfc3339(),
            row_count: row.get(3)?,
        })
    })?
    .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Tags an entry depends on, sorted
pub fn provenance(conn: &Connection, id: RdsId) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM rds_tags WHERE id = ? ORDER BY tag")?;
    let tags = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tags)
}
