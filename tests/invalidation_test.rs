//! Cache freshness tests: store mutations under both invalidation policies

mod test_helpers;

use tagsift::{
    CacheOutcome, Conjunction, Disjunction, InvalidationPolicy, Operator, QueryTree, TagCondition,
};
use test_helpers::*;

fn single_condition(cond: TagCondition, path: &str) -> QueryTree {
    QueryTree::new(Disjunction::new(vec![Conjunction::new(vec![cond])]), path)
}

// ==================== Scoped Policy ====================

#[test]
fn test_tagging_drops_dependent_entries_only() {
    let fx = colors_fixture();
    fx.ls("/tags/red/@");
    fx.ls("/tags/blue/@");

    let green = fx.object("c.txt", &["green"]);
    assert_eq!(fx.cached_entries(), 2);

    fx.tag(green, "red");
    assert_eq!(fx.cached_entries(), 1);

    let red = fx.ls("/tags/red/@");
    assert_miss(&red);
    assert_tree(&red.files, &[("a.txt", &[1, 2]), ("c.txt", &[green])]);

    assert_hit(&fx.ls("/tags/blue/@"));
}

#[test]
fn test_untagging_refreshes_result() {
    let fx = colors_fixture();
    assert_tree(&fx.ls("/tags/red/@").files, &[("a.txt", &[1, 2])]);

    fx.untag(2, "red");

    let red = fx.ls("/tags/red/@");
    assert_miss(&red);
    assert_tree(&red.files, &[("a.txt", &[1])]);
}

#[test]
fn test_negated_tag_change_invalidates() {
    let fx = colors_fixture();
    assert_inodes(&fx.ls("/tags/red/-/draft/@").files, &[1, 2]);

    fx.tag(1, "draft");

    let result = fx.ls("/tags/red/-/draft/@");
    assert_miss(&result);
    assert_inodes(&result.files, &[2]);
}

#[test]
fn test_related_tag_change_invalidates() {
    let fx = colors_fixture();
    assert_inodes(&fx.ls("/tags/red|crimson/@").files, &[1, 2]);

    fx.tag(3, "crimson");

    assert_inodes(&fx.ls("/tags/red|crimson/@").files, &[1, 2, 3]);
}

#[test]
fn test_triple_change_invalidates_by_namespace() {
    let fx = fixture();
    let old = fx.object("old.txt", &["time:year=2019"]);
    assert!(fx.ls("/tags/time:/year/gt/2020/@").files.is_empty());

    let new = fx.object("new.txt", &["time:year=2024"]);

    let result = fx.ls("/tags/time:/year/gt/2020/@");
    assert_miss(&result);
    assert_inodes(&result.files, &[new]);
    assert_ne!(old, new);
}

#[test]
fn test_named_triple_condition_invalidated_by_namespace() {
    let fx = fixture();

    // Filters on the triple; the plain name is ignored by the predicate
    let mut cond = TagCondition::triple("geo:", "city", Operator::Equal, "Rome");
    cond.tag = Some("label".to_string());
    let query = single_condition(cond, "/tags/label-rome/@");

    let before = fx.resolver.resolve_detailed(&query, false).unwrap();
    assert!(before.files.is_empty());

    let rome = fx.object("rome.jpg", &["geo:city=Rome"]);

    let after = fx.resolver.resolve_detailed(&query, false).unwrap();
    assert_miss(&after);
    assert_inodes(&after.files, &[rome]);
}

#[test]
fn test_unknown_tag_id_invalidated_once_assigned() {
    let fx = fixture();
    let query = single_condition(TagCondition::with_id(1), "/tags/by-id/1/@");

    let before = fx.resolver.resolve_detailed(&query, false).unwrap();
    assert!(matches!(before.outcome, CacheOutcome::Miss(_)));
    assert!(before.files.is_empty());

    // First tag created gets id 1
    let first = fx.object("first.txt", &["red"]);

    let after = fx.resolver.resolve_detailed(&query, false).unwrap();
    assert_miss(&after);
    assert_inodes(&after.files, &[first]);

    fx.untag(first, "red");

    let removed = fx.resolver.resolve_detailed(&query, false).unwrap();
    assert_miss(&removed);
    assert!(removed.files.is_empty());
}

#[test]
fn test_unchanged_tagging_keeps_cache() {
    let fx = colors_fixture();
    fx.ls("/tags/red/@");

    // Already tagged: no change, no invalidation
    fx.tag(1, "red");
    assert_hit(&fx.ls("/tags/red/@"));

    // Not tagged: no change either
    fx.untag(3, "red");
    assert_hit(&fx.ls("/tags/red/@"));
}

#[test]
fn test_rename_refreshes_names() {
    let fx = colors_fixture();
    fx.ls("/tags/red/@");
    fx.ls("/tags/blue/@");

    fx.store().rename_object(2, "renamed.txt").unwrap();

    let red = fx.ls("/tags/red/@");
    assert_miss(&red);
    assert_tree(&red.files, &[("a.txt", &[1]), ("renamed.txt", &[2])]);
    assert_hit(&fx.ls("/tags/blue/@"));
}

#[test]
fn test_remove_drops_object_from_results() {
    let fx = colors_fixture();
    fx.ls("/tags/red/+/blue/@");

    fx.store().remove_object(3).unwrap();

    let result = fx.ls("/tags/red/+/blue/@");
    assert_miss(&result);
    assert_tree(&result.files, &[("a.txt", &[1, 2])]);
}

#[test]
fn test_remove_unknown_object_fails() {
    let fx = colors_fixture();
    assert!(fx.store().remove_object(99).is_err());
    assert!(fx.store().rename_object(99, "x").is_err());
}

#[test]
fn test_invalidate_tag_scope() {
    let fx = colors_fixture();
    fx.ls("/tags/red/@");
    fx.ls("/tags/blue/@");
    fx.ls("/tags/red/+/blue/@");

    assert_eq!(fx.resolver.invalidate_tag("red").unwrap(), 2);
    assert_eq!(fx.cached_entries(), 1);
    assert_hit(&fx.ls("/tags/blue/@"));
}

// ==================== Flush-All Policy ====================

#[test]
fn test_flush_all_policy() {
    let fx = fixture_with_policy(InvalidationPolicy::FlushAll);
    let a = fx.object("a.txt", &["red"]);
    fx.object("b.txt", &["blue"]);

    fx.ls("/tags/red/@");
    fx.ls("/tags/blue/@");
    assert_eq!(fx.cached_entries(), 2);

    fx.tag(a, "unrelated");
    assert_eq!(fx.cached_entries(), 0);

    assert_miss(&fx.ls("/tags/blue/@"));
}

#[test]
fn test_flush_all_on_rename() {
    let fx = fixture_with_policy(InvalidationPolicy::FlushAll);
    let a = fx.object("a.txt", &["red"]);
    fx.object("b.txt", &["blue"]);
    fx.ls("/tags/blue/@");

    fx.store().rename_object(a, "z.txt").unwrap();

    assert_eq!(fx.cached_entries(), 0);
}
