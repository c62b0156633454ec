//! Test Helper Functions for Store-Based Testing
//!
//! This module builds throwaway tag stores and asserts on resolved file trees.

#![allow(dead_code)]

use std::sync::Arc;
use tagsift::config::{InvalidationPolicy, TagsiftConfig};
use tagsift::{
    parse_query_path, CacheOutcome, FileTree, Inode, QueryTree, Resolution, Resolver, TagRef,
    TagStore,
};
use tempfile::TempDir;

/// An initialized store in a temporary directory
pub struct Fixture {
    // Keeps the directory alive for the fixture's lifetime
    pub temp: TempDir,
    pub resolver: Arc<Resolver>,
}

impl Fixture {
    pub fn store(&self) -> &TagStore {
        self.resolver.store()
    }

    /// Add an object carrying the given tags (`name` or `ns:key=value`)
    pub fn object(&self, name: &str, tags: &[&str]) -> Inode {
        let inode = self.store().add_object(name).expect("Failed to add object");
        for tag in tags {
            self.tag(inode, tag);
        }
        inode
    }

    pub fn tag(&self, inode: Inode, tag: &str) {
        let tag: TagRef = tag.parse().expect("Invalid tag");
        self.store().tag_object(inode, &tag).expect("Failed to tag object");
    }

    pub fn untag(&self, inode: Inode, tag: &str) {
        let tag: TagRef = tag.parse().expect("Invalid tag");
        self.store().untag_object(inode, &tag).expect("Failed to untag object");
    }

    /// A second resolver on the same store, with its own key locks
    pub fn other_resolver(&self) -> Resolver {
        Resolver::new(TagStore::with_config(self.temp.path(), self.store().config().clone()))
    }

    /// Resolve a tag path
    pub fn ls(&self, path: &str) -> Resolution {
        let parsed = parse_query_path(path, &self.store().config().query).expect("Invalid tag path");
        self.resolver
            .resolve_detailed(&parsed.query, parsed.is_all_path)
            .expect("Resolve failed")
    }

    pub fn cached_entries(&self) -> usize {
        self.resolver.stats().expect("Stats failed").entries
    }
}

/// Create a fixture with default settings
pub fn fixture() -> Fixture {
    fixture_with_policy(InvalidationPolicy::Scoped)
}

/// Create a fixture with the given invalidation policy
pub fn fixture_with_policy(policy: InvalidationPolicy) -> Fixture {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let mut config = TagsiftConfig::default();
    config.cache.invalidation = policy;

    let store = TagStore::with_config(temp.path(), config);
    store.init().expect("Failed to init store");

    Fixture {
        temp,
        resolver: Arc::new(Resolver::new(store)),
    }
}

/// Objects `{1:"a.txt", 2:"a.txt", 3:"b.txt"}` tagged `{red}`, `{red}`, `{blue}`
pub fn colors_fixture() -> Fixture {
    let fx = fixture();
    fx.object("a.txt", &["red"]);
    fx.object("a.txt", &["red"]);
    fx.object("b.txt", &["blue"]);
    fx
}

/// Parse a tag path with default settings
pub fn query(path: &str) -> QueryTree {
    parse_query_path(path, &Default::default())
        .expect("Invalid tag path")
        .query
}

/// Assert the tree holds exactly `expected` as (name, sorted inodes)
pub fn assert_tree(files: &FileTree, expected: &[(&str, &[Inode])]) {
    let mut expected_names: Vec<&str> = expected.iter().map(|(name, _)| *name).collect();
    expected_names.sort_unstable();
    assert_eq!(files.names(), expected_names, "Unexpected names in {:?}", files);

    for (name, inodes) in expected {
        assert_eq!(
            files.inodes(name),
            inodes.to_vec(),
            "Unexpected inodes under '{}'",
            name
        );
    }
}

/// Assert the set of inodes across all names
pub fn assert_inodes(files: &FileTree, expected: &[Inode]) {
    let mut inodes: Vec<Inode> = files
        .iter()
        .flat_map(|(_, handles)| handles.iter().map(|fh| fh.inode))
        .collect();
    inodes.sort_unstable();
    assert_eq!(inodes, expected.to_vec());
}

pub fn assert_miss(resolution: &Resolution) {
    assert!(
        matches!(resolution.outcome, CacheOutcome::Miss(_)),
        "Expected a materialization, got {:?}",
        resolution.outcome
    );
}

pub fn assert_hit(resolution: &Resolution) {
    assert!(
        matches!(resolution.outcome, CacheOutcome::Hit(_)),
        "Expected a cache hit, got {:?}",
        resolution.outcome
    );
}
