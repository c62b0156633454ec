//! Query materialization
//!
//! Each OR-branch is evaluated into its own temporary working set:
//!
//! 1. base set: objects matching the first element (or its related tags)
//! 2. intersection: drop objects not matching each further element
//! 3. subtraction: for every element, drop objects matching its negated tags
//!
//! The branch sets are then unioned into `rds` under a fresh entry id, the
//! provenance of every visited tag is recorded, and the working sets dropped.
//! The caller owns the transaction; nothing is visible until it commits.

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::models::{Conjunction, QueryTree, RdsId, TagCondition};
use crate::predicate::Predicate;

/// Join every candidate object with its tags
const TAGGED_OBJECTS: &str = "FROM objects \
     JOIN tagging ON tagging.inode = objects.inode \
     JOIN tags ON tags.tag_id = tagging.tag_id";

/// A branch-local temporary table, named uniquely per materialization
#[derive(Debug)]
struct WorkingSet {
    table: String,
}

impl WorkingSet {
    fn create(conn: &Connection) -> rusqlite::Result<Self> {
        let table = format!("tv_{}", uuid::Uuid::new_v4().simple());
        conn.execute(
            &format!(
                "CREATE TEMP TABLE \"{}\" (inode INTEGER NOT NULL, objectname TEXT)",
                table
            ),
            [],
        )?;
        Ok(Self { table })
    }

    /// Fill with every object matching `pred`
    fn fill(&self, conn: &Connection, pred: &Predicate) -> rusqlite::Result<usize> {
        let sql = format!(
            "INSERT INTO \"{}\" (inode, objectname) \
             SELECT DISTINCT objects.inode, objects.objectname {} WHERE {}",
            self.table,
            TAGGED_OBJECTS,
            pred.clause()
        );
        conn.execute(&sql, params_from_iter(pred.params()))
    }

    /// Keep only objects matching `pred`
    fn retain_matching(&self, conn: &Connection, pred: &Predicate) -> rusqlite::Result<usize> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE inode NOT IN (SELECT objects.inode {} WHERE {})",
            self.table,
            TAGGED_OBJECTS,
            pred.clause()
        );
        conn.execute(&sql, params_from_iter(pred.params()))
    }

    /// Drop objects matching `pred`
    fn remove_matching(&self, conn: &Connection, pred: &Predicate) -> rusqlite::Result<usize> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE inode IN (SELECT objects.inode {} WHERE {})",
            self.table,
            TAGGED_OBJECTS,
            pred.clause()
        );
        conn.execute(&sql, params_from_iter(pred.params()))
    }

    fn drop_table(self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(&format!("DROP TABLE temp.\"{}\"", self.table), [])?;
        Ok(())
    }
}

/// Materialize `query` under `key` and return the new entry id
///
/// Must run inside a write transaction on `conn`; the working sets are
/// connection-local temporary tables, so concurrent materializations on
/// other connections never see them.
pub fn materialize(conn: &Connection, query: &QueryTree, key: &str) -> rusqlite::Result<RdsId> {
    log::debug!("Materializing query '{}'", key);

    // Phase 1: one working set per non-empty branch
    let mut sets = Vec::with_capacity(query.tree.branches.len());
    for branch in query.tree.branches.iter().filter(|b| !b.is_empty()) {
        sets.push(evaluate_branch(conn, branch)?);
    }

    // Phase 2: register the entry and union the working sets into it
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO rds_index (query, created_at) VALUES (?, ?)",
        rusqlite::params![key, now],
    )?;
    let rds_id = conn.last_insert_rowid();

    let rows = if sets.is_empty() {
        0
    } else {
        let union = sets
            .iter()
            .map(|set| format!("SELECT ?1, inode, objectname FROM \"{}\"", set.table))
            .collect::<Vec<_>>()
            .join(" UNION ");
        conn.execute(&format!("INSERT INTO rds (id, inode, objectname) {}", union), [rds_id])?
    };

    let tags = record_provenance(conn, query, rds_id)?;

    // Phase 3: drop the working sets
    for set in sets {
        set.drop_table(conn)?;
    }

    log::info!(
        "Materialized '{}' as RDS {} ({} rows, {} provenance tags)",
        key,
        rds_id,
        rows,
        tags
    );
    Ok(rds_id)
}

fn evaluate_branch(conn: &Connection, branch: &Conjunction) -> rusqlite::Result<WorkingSet> {
    let set = WorkingSet::create(conn)?;

    let Some((first, rest)) = branch.conditions.split_first() else {
        return Ok(set);
    };

    let base = set.fill(conn, &Predicate::with_related(first))?;
    log::trace!("{}: {} objects in base set", set.table, base);

    for element in rest {
        let removed = set.retain_matching(conn, &Predicate::with_related(element))?;
        log::trace!("{}: intersection removed {} objects", set.table, removed);
    }

    for element in &branch.conditions {
        for negated in &element.negated {
            let removed = set.remove_matching(conn, &Predicate::with_related(negated))?;
            log::trace!("{}: negation removed {} objects", set.table, removed);
        }
    }

    Ok(set)
}

/// Record every tag of the tree as a dependency of `rds_id`
///
/// Returns the number of distinct tags recorded.
fn record_provenance(conn: &Connection, query: &QueryTree, rds_id: RdsId) -> rusqlite::Result<usize> {
    let mut insert = conn.prepare("INSERT OR IGNORE INTO rds_tags (id, tag) VALUES (?, ?)")?;
    let mut recorded = 0;

    for cond in query.tree.all_conditions() {
        let mut tags = cond.provenance_names();
        if let Some(name) = id_tag_name(conn, cond)? {
            tags.push(name);
        }

        if tags.is_empty() {
            log::debug!("No provenance for condition {:?}", cond);
        }
        for tag in tags {
            recorded += insert.execute(rusqlite::params![rds_id, tag])?;
        }
    }

    Ok(recorded)
}

/// Name of the tag an id-only condition refers to, if it exists yet
fn id_tag_name(conn: &Connection, cond: &TagCondition) -> rusqlite::Result<Option<String>> {
    if cond.tag.as_deref().is_some_and(|t| !t.is_empty()) || cond.triple.is_some() {
        return Ok(None);
    }

    match cond.tag_id {
        Some(tag_id) => conn
            .query_row("SELECT tagname FROM tags WHERE tag_id = ?", [tag_id], |row| row.get(0))
            .optional(),
        None => Ok(None),
    }
}
