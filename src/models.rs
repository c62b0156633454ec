//! Core data models for tagsift
//!
//! These structures describe a boolean tag query as handed over by the
//! path layer (an OR of AND-chains), and the handles returned for the
//! objects that satisfy it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Object identifier in the store
pub type Inode = i64;

/// Identifier of a materialized result set (an "RDS")
pub type RdsId = i64;

/// Comparison applied to the value part of a triple tag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, EnumString, Display)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Exact value match
    #[default]
    #[strum(serialize = "eq")]
    Equal,
    /// Substring match
    #[strum(serialize = "inc")]
    Contains,
    /// Lexical `value > V`
    #[strum(serialize = "gt")]
    GreaterThan,
    /// Lexical `value < V`
    #[strum(serialize = "lt")]
    SmallerThan,
}

/// A structured `namespace:/key/op/value` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleTag {
    pub namespace: String,
    pub key: String,
    pub value: String,
    pub operator: Operator,
}

/// One filter unit of an AND-chain
///
/// A condition matches an object tagged with it, or with any of its
/// `related` alternatives. Objects matching any `negated` alternative
/// (or that alternative's own related list) are subtracted from the
/// branch the condition belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCondition {
    /// Plain tag name
    pub tag: Option<String>,
    /// Tag identifier in the `tags` table
    pub tag_id: Option<i64>,
    /// Structured triple; wins over `tag` and `tag_id` when its value is non-empty
    pub triple: Option<TripleTag>,
    /// Alternatives OR'd into this condition
    pub related: Vec<TagCondition>,
    /// Alternatives subtracted from the branch
    pub negated: Vec<TagCondition>,
}

impl TagCondition {
    /// Condition on a plain tag name
    pub fn named(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Default::default()
        }
    }

    /// Condition on a tag identifier
    pub fn with_id(tag_id: i64) -> Self {
        Self {
            tag_id: Some(tag_id),
            ..Default::default()
        }
    }

    /// Condition on a triple tag
    pub fn triple(
        namespace: impl Into<String>,
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            triple: Some(TripleTag {
                namespace: namespace.into(),
                key: key.into(),
                value: value.into(),
                operator,
            }),
            ..Default::default()
        }
    }

    /// Add a related alternative
    pub fn or(mut self, alternative: TagCondition) -> Self {
        self.related.push(alternative);
        self
    }

    /// Add a negated alternative
    pub fn not(mut self, negated: TagCondition) -> Self {
        self.negated.push(negated);
        self
    }

    /// Returns the triple when it carries a non-empty value
    pub fn structured(&self) -> Option<&TripleTag> {
        self.triple.as_ref().filter(|t| !t.value.is_empty())
    }

    /// True when the condition cannot be compiled into a predicate
    pub fn is_empty(&self) -> bool {
        self.structured().is_none() && self.tag.is_none() && self.tag_id.is_none()
    }

    /// Provenance keys recorded for this condition
    ///
    /// The plain tag name when non-empty, the triple namespace when a triple
    /// is present, and the [`tag_id_provenance`] key when a tag id is set.
    /// Every field the predicate may filter on is covered, so a change to
    /// any tag the condition can match reaches the entry.
    pub fn provenance_names(&self) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            names.push(tag.to_string());
        }
        if let Some(triple) = &self.triple {
            names.push(triple.namespace.clone());
        }
        if let Some(tag_id) = self.tag_id {
            names.push(tag_id_provenance(tag_id));
        }

        names
    }
}

/// Provenance key for a dependency on a tag identifier
///
/// Recorded even when no tag carries the id yet; tagging and untagging
/// invalidate it alongside the tag name.
pub fn tag_id_provenance(tag_id: i64) -> String {
    format!("#id:{}", tag_id)
}

/// An AND-chain of conditions (one OR-branch)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conjunction {
    pub conditions: Vec<TagCondition>,
}

impl Conjunction {
    pub fn new(conditions: Vec<TagCondition>) -> Self {
        Self { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// The whole query: a union of AND-chains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disjunction {
    pub branches: Vec<Conjunction>,
}

impl Disjunction {
    pub fn new(branches: Vec<Conjunction>) -> Self {
        Self { branches }
    }

    /// True when no branch has any condition
    pub fn is_empty(&self) -> bool {
        self.branches.iter().all(Conjunction::is_empty)
    }

    /// Every condition of the tree: chain elements, their related and
    /// negated alternatives, and the related alternatives of negated ones
    pub fn all_conditions(&self) -> impl Iterator<Item = &TagCondition> {
        self.branches
            .iter()
            .flat_map(|branch| branch.conditions.iter())
            .flat_map(|cond| {
                std::iter::once(cond)
                    .chain(cond.related.iter())
                    .chain(
                        cond.negated
                            .iter()
                            .flat_map(|neg| std::iter::once(neg).chain(neg.related.iter())),
                    )
            })
    }
}

/// A query tree plus the navigated path it was parsed from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTree {
    pub tree: Disjunction,
    /// Full expanded path, including any suffix after the query delimiter
    pub expanded_full_path: String,
}

impl QueryTree {
    pub fn new(tree: Disjunction, expanded_full_path: impl Into<String>) -> Self {
        Self {
            tree,
            expanded_full_path: expanded_full_path.into(),
        }
    }
}

/// A resolved object as exposed to the filesystem layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle {
    pub inode: Inode,
    pub name: String,
}

/// How a resolution was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "rds_id", rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from an existing cache entry
    Hit(RdsId),
    /// Materialized a new cache entry
    Miss(RdsId),
    /// "All objects" path, cache neither read nor written
    Bypass,
}

/// A cached query as listed by `entries`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdsEntry {
    pub id: RdsId,
    pub query: String,
    pub created_at: String,
    pub row_count: usize,
}

/// Row counts across the cache tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdsStats {
    pub entries: usize,
    pub rows: usize,
    pub provenance_tags: usize,
}
