//! Tagsift: boolean tag queries with a materialized result cache
//!
//! Tagsift resolves a boolean tag expression (an OR of AND-chains, each
//! element carrying related and negated alternatives) into the set of
//! stored objects that satisfy it. Every result is materialized in SQLite
//! under a canonical key derived from the query path, so repeated or
//! suffix-only-different queries are served without recomputation.
//!
//! # Architecture
//!
//! - **Models**: the query tree and the file handles returned for it
//! - **Predicate compiler**: one condition → parameterized SQL filter
//! - **RDS**: cache key, lookup, materialization and invalidation
//! - **File set**: deduplicating, homonym-preserving result assembly
//! - **Resolver**: lookup → materialize → assemble, serialized per key
//!
//! # Example Usage
//!
//! ```no_run
//! use tagsift::{Conjunction, Disjunction, QueryTree, Resolver, TagCondition, TagStore};
//!
//! let store = TagStore::new(".");
//! store.init().unwrap();
//!
//! let tree = Disjunction::new(vec![Conjunction::new(vec![
//!     TagCondition::named("red").not(TagCondition::named("draft")),
//! ])]);
//! let query = QueryTree::new(tree, "/tags/red/-/draft/@");
//!
//! let resolver = Resolver::new(store);
//! let files = resolver.resolve(&query, false).unwrap();
//! println!("{} names matched", files.len());
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fileset;
pub mod models;
pub mod output;
pub mod path;
pub mod predicate;
pub mod rds;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use config::{InvalidationPolicy, TagsiftConfig};
pub use error::{QueryParseError, ResolveError};
pub use fileset::FileTree;
pub use models::{
    CacheOutcome, Conjunction, Disjunction, FileHandle, Inode, Operator, QueryTree, RdsId,
    TagCondition,
};
pub use path::{parse_query_path, ParsedPath};
pub use resolver::{Resolution, Resolver};
pub use store::{TagRef, TagStore};
