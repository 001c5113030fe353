//! Relation merge algebra: dedup by full identity, fold flags by OR
//! within a structural group, drop disabled groups entirely.

use abridge::extraction_model::{dedupe_relations, merge_relations, Relation};
use abridge::schema::RelationType;

fn relation(
    table: usize,
    column: usize,
    disabled: bool,
    propagate_sticky: bool,
    only_if_sticky: bool,
) -> Relation {
    Relation {
        table,
        column,
        foreign_key: 0,
        name: None,
        disabled,
        propagate_sticky,
        only_if_sticky,
        r_type: RelationType::Outgoing,
    }
}

#[test]
fn merge_of_doubled_list_is_dedup() {
    let a = relation(0, 0, false, false, false);
    let b = relation(1, 0, false, false, false);
    let doubled = vec![a.clone(), b.clone(), a.clone(), b.clone()];

    let deduped = dedupe_relations(doubled.clone());
    let merged = merge_relations(doubled);

    assert_eq!(deduped.len(), 2);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].table, a.table);
    assert_eq!(merged[1].table, b.table);
}

#[test]
fn disabled_member_drops_the_whole_group() {
    let enabled = relation(0, 0, false, false, false);
    let disabled = relation(0, 0, true, false, false);

    let merged = merge_relations(vec![enabled, disabled]);
    assert!(merged.is_empty(), "a disabled member must suppress the whole structural group");
}

#[test]
fn sticky_flags_fold_by_logical_or() {
    let plain = relation(0, 0, false, false, false);
    let sticky = relation(0, 0, false, true, true);

    let merged = merge_relations(vec![plain, sticky]);
    assert_eq!(merged.len(), 1);
    assert!(merged[0].propagate_sticky);
    assert!(merged[0].only_if_sticky);
}

#[test]
fn distinct_structural_groups_stay_separate() {
    // Same table/column but a different relation name is a distinct
    // structural group, per the base-key definition.
    let unnamed = relation(0, 0, false, false, false);
    let mut named = relation(0, 0, false, false, false);
    named.name = Some("alias".to_string());

    let merged = merge_relations(vec![unnamed, named]);
    assert_eq!(merged.len(), 2);
}
