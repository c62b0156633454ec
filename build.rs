//! Build-time fingerprint of the cache-critical sources
//!
//! Cached query results are only valid for the schema and set algebra that
//! produced them. This script hashes the files defining both and exports the
//! result as `CACHE_SCHEMA_HASH`; `TagStore::init` compares it with the value
//! stored in `tags.db` and flushes the query cache on mismatch.
//!
//! ## Cache-critical files:
//! - src/store.rs: SQLite schema (objects, tags, tagging, rds tables)
//! - src/predicate.rs: condition → SQL filter translation
//! - src/rds/materializer.rs: per-branch set algebra and union
//! - src/models.rs: query tree and operator semantics

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const CACHE_CRITICAL_FILES: &[&str] = &[
    "src/store.rs",
    "src/predicate.rs",
    "src/rds/materializer.rs",
    "src/models.rs",
];

fn main() {
    let schema_hash = compute_schema_hash();

    println!("cargo:rustc-env=CACHE_SCHEMA_HASH={}", schema_hash);

    for file in CACHE_CRITICAL_FILES {
        println!("cargo:rerun-if-changed={}", file);
    }
}

/// Hash path and content of every cache-critical file, in sorted order
fn compute_schema_hash() -> String {
    let mut hasher = blake3::Hasher::new();

    let files: BTreeSet<&str> = CACHE_CRITICAL_FILES.iter().copied().collect();

    for file_path in &files {
        let path = Path::new(file_path);

        let content = fs::read(path)
            .unwrap_or_else(|e| panic!("Failed to read cache-critical file {}: {}", file_path, e));

        hasher.update(file_path.as_bytes());
        hasher.update(&content);
    }

    // First 8 bytes are plenty to tell schema revisions apart
    hasher.finalize().as_bytes()[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
