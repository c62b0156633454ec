//! Cache invalidation
//!
//! All functions run on the caller's connection; wrap them in a transaction
//! together with the mutation that made the entries stale.

use rusqlite::Connection;

use crate::models::{Inode, RdsId};

/// Drop every cache entry, result row and provenance tag
///
/// Returns the number of entries dropped.
pub fn invalidate_all(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM rds", [])?;
    conn.execute("DELETE FROM rds_tags", [])?;
    let entries = conn.execute("DELETE FROM rds_index", [])?;

    log::info!("Invalidated all cached queries ({} entries)", entries);
    Ok(entries)
}

/// Drop the entries whose provenance contains `tag`
pub fn invalidate_tag(conn: &Connection, tag: &str) -> rusqlite::Result<usize> {
    let ids = collect_ids(conn, "SELECT DISTINCT id FROM rds_tags WHERE tag = ?", [tag])?;
    drop_entries(conn, &ids)?;

    log::debug!("Invalidated {} cached queries depending on tag '{}'", ids.len(), tag);
    Ok(ids.len())
}

/// Drop the entries whose result rows contain `inode`
pub fn invalidate_object(conn: &Connection, inode: Inode) -> rusqlite::Result<usize> {
    let ids = collect_ids(conn, "SELECT DISTINCT id FROM rds WHERE inode = ?", [inode])?;
    drop_entries(conn, &ids)?;

    log::debug!("Invalidated {} cached queries listing object {}", ids.len(), inode);
    Ok(ids.len())
}

fn collect_ids<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<Vec<RdsId>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn drop_entries(conn: &Connection, ids: &[RdsId]) -> rusqlite::Result<()> {
    let mut rows = conn.prepare("DELETE FROM rds WHERE id = ?")?;
    let mut tags = conn.prepare("DELETE FROM rds_tags WHERE id = ?")?;
    let mut index = conn.prepare("DELETE FROM rds_index WHERE id = ?")?;

    for id in ids {
        rows.execute([id])?;
        tags.execute([id])?;
        index.execute([id])?;
    }
    Ok(())
}
