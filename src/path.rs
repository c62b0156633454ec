//! Query path parsing
//!
//! Builds a [`QueryTree`] from a navigated path such as
//! `/tags/red/blue/+/time:/year/gt/2020/-/draft/@/report.txt`:
//!
//! - `/` separates components; a leading `tags` component is skipped
//! - `+` starts a new OR-branch
//! - `-` negates the next tag, scoped to the previous tag of the branch
//! - `a|b` is tag `a` with related alternative `b`
//! - `ns:/key/op/value` is a triple tag, `op` one of `eq`, `inc`, `gt`, `lt`
//! - the all-objects pseudo-tag (`ALL`) sets `is_all_path`
//! - parsing stops at the first component starting with the query delimiter;
//!   any other component containing it is rejected

use std::str::FromStr;

use crate::config::QueryConfig;
use crate::error::QueryParseError;
use crate::models::{Conjunction, Disjunction, Operator, QueryTree, TagCondition};

const TAGS_ROOT: &str = "tags";
const OR_SEPARATOR: &str = "+";
const NEGATION: &str = "-";
const RELATED_SEPARATOR: char = '|';

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub query: QueryTree,
    pub is_all_path: bool,
}

/// Parse a navigated path into a query tree
pub fn parse_query_path(path: &str, config: &QueryConfig) -> Result<ParsedPath, QueryParseError> {
    let mut components = path
        .split('/')
        .filter(|c| !c.is_empty())
        .take_while(|c| !c.starts_with(config.delimiter.as_str()))
        .peekable();

    if components.peek() == Some(&TAGS_ROOT) {
        components.next();
    }

    let mut branches = Vec::new();
    let mut branch: Vec<TagCondition> = Vec::new();
    let mut negate_next = false;
    let mut is_all_path = false;

    while let Some(component) = components.next() {
        let component = reject_delimiter(component, &config.delimiter)?;
        match component {
            OR_SEPARATOR => {
                if negate_next {
                    return Err(QueryParseError::DanglingNegation);
                }
                if !branch.is_empty() {
                    branches.push(Conjunction::new(std::mem::take(&mut branch)));
                }
            }
            NEGATION => {
                if negate_next {
                    return Err(QueryParseError::DanglingNegation);
                }
                negate_next = true;
            }
            tag if tag == config.all_tag => {
                is_all_path = true;
            }
            namespace if namespace.ends_with(':') => {
                let mut triple_part = || {
                    components
                        .next()
                        .ok_or_else(|| QueryParseError::IncompleteTriple(namespace.to_string()))
                        .and_then(|part| reject_delimiter(part, &config.delimiter))
                };
                let key = triple_part()?;
                let op = triple_part()?;
                let value = triple_part()?;

                let operator = Operator::from_str(op)
                    .map_err(|_| QueryParseError::UnknownOperator(op.to_string()))?;
                let cond = TagCondition::triple(namespace, key, operator, value);
                push_condition(&mut branch, cond, std::mem::take(&mut negate_next), namespace)?;
            }
            tag => {
                let cond = parse_alternatives(tag)?;
                push_condition(&mut branch, cond, std::mem::take(&mut negate_next), tag)?;
            }
        }
    }

    if negate_next {
        return Err(QueryParseError::DanglingNegation);
    }
    if !branch.is_empty() {
        branches.push(Conjunction::new(branch));
    }

    log::trace!("Parsed '{}' into {} branches (all={})", path, branches.len(), is_all_path);

    Ok(ParsedPath {
        query: QueryTree::new(Disjunction::new(branches), path),
        is_all_path,
    })
}

/// The cache key ends at the first delimiter, so no tag may contain one
fn reject_delimiter<'a>(part: &'a str, delimiter: &str) -> Result<&'a str, QueryParseError> {
    if part.contains(delimiter) {
        return Err(QueryParseError::DelimiterInTag {
            tag: part.to_string(),
            delimiter: delimiter.to_string(),
        });
    }
    Ok(part)
}

fn parse_alternatives(component: &str) -> Result<TagCondition, QueryParseError> {
    let mut alternatives = component.split(RELATED_SEPARATOR);
    let mut next_tag = || match alternatives.next() {
        Some(tag) if !tag.is_empty() => Ok(Some(TagCondition::named(tag))),
        Some(_) => Err(QueryParseError::EmptyAlternative(component.to_string())),
        None => Ok(None),
    };

    let Some(mut cond) = next_tag()? else {
        return Err(QueryParseError::EmptyAlternative(component.to_string()));
    };
    while let Some(related) = next_tag()? {
        cond = cond.or(related);
    }
    Ok(cond)
}

fn push_condition(
    branch: &mut Vec<TagCondition>,
    cond: TagCondition,
    negated: bool,
    source: &str,
) -> Result<(), QueryParseError> {
    if !negated {
        branch.push(cond);
        return Ok(());
    }

    match branch.last_mut() {
        Some(previous) => {
            previous.negated.push(cond);
            Ok(())
        }
        None => Err(QueryParseError::NegationWithoutTag(source.to_string())),
    }
}
