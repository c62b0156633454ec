//! Predicate compiler
//!
//! Turns a [`TagCondition`] into a parameterized SQL filter over the
//! `objects ⋈ tagging ⋈ tags` join. Tag names and values are always bound
//! as parameters, never spliced into the statement text.

use rusqlite::types::Value;

use crate::models::{Operator, TagCondition};

/// Clause used when no alternative compiles; matches no row
const MATCH_NOTHING: &str = "0";

/// A WHERE-clause fragment with its bound parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    clause: String,
    params: Vec<Value>,
}

impl Predicate {
    /// Compile one condition
    ///
    /// Precedence: triple with a non-empty value, then plain tag name,
    /// then tag identifier. Returns `None` for a condition with none of them.
    pub fn compile(cond: &TagCondition) -> Option<Self> {
        if let Some(triple) = cond.structured() {
            let comparison = match triple.operator {
                Operator::Equal => "tags.value = ?",
                Operator::Contains => "instr(tags.value, ?) > 0",
                Operator::GreaterThan => "tags.value > ?",
                Operator::SmallerThan => "tags.value < ?",
            };

            return Some(Self {
                clause: format!("(tags.tagname = ? AND tags.\"key\" = ? AND {})", comparison),
                params: vec![
                    Value::Text(triple.namespace.clone()),
                    Value::Text(triple.key.clone()),
                    Value::Text(triple.value.clone()),
                ],
            });
        }

        if let Some(tag) = &cond.tag {
            return Some(Self {
                clause: "tags.tagname = ?".to_string(),
                params: vec![Value::Text(tag.clone())],
            });
        }

        cond.tag_id.map(|id| Self {
            clause: "tagging.tag_id = ?".to_string(),
            params: vec![Value::Integer(id)],
        })
    }

    /// OR together every condition that compiles
    ///
    /// When none does, the result matches nothing.
    pub fn any_of<'a>(conds: impl IntoIterator<Item = &'a TagCondition>) -> Self {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for cond in conds {
            match Self::compile(cond) {
                Some(pred) => {
                    clauses.push(pred.clause);
                    params.extend(pred.params);
                }
                None => log::warn!("Skipping empty tag condition: {:?}", cond),
            }
        }

        if clauses.is_empty() {
            return Self {
                clause: MATCH_NOTHING.to_string(),
                params,
            };
        }

        Self {
            clause: format!("({})", clauses.join(" OR ")),
            params,
        }
    }

    /// A condition OR'd with each of its related alternatives
    pub fn with_related(cond: &TagCondition) -> Self {
        Self::any_of(std::iter::once(cond).chain(cond.related.iter()))
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// True when the predicate was built from no compilable condition
    pub fn matches_nothing(&self) -> bool {
        self.clause == MATCH_NOTHING
    }
}
