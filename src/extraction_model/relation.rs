use crate::schema::{ColumnId, ForeignKeyId, RelationType, TableId};
use std::collections::HashSet;

/// A directed, flag-bearing edge along one foreign key that the extractor
/// is permitted to traverse. `column` is always the FK's first source
/// column, enough to identify which FK this relation rides and to check
/// its NOT NULL-ness; full multi-column traversal goes through
/// `foreign_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub table: TableId,
    pub column: ColumnId,
    pub foreign_key: ForeignKeyId,
    pub name: Option<String>,
    pub disabled: bool,
    pub propagate_sticky: bool,
    pub only_if_sticky: bool,
    pub r_type: RelationType,
}

impl Relation {
    pub fn new(
        table: TableId,
        column: ColumnId,
        foreign_key: ForeignKeyId,
        name: Option<String>,
        disabled: bool,
        sticky: bool,
        r_type: RelationType,
        column_notnull: bool,
    ) -> Relation {
        let only_if_sticky = match r_type {
            RelationType::Outgoing => sticky && !column_notnull,
            RelationType::Incoming => sticky,
        };
        Relation {
            table,
            column,
            foreign_key,
            name,
            disabled,
            propagate_sticky: sticky,
            only_if_sticky,
            r_type,
        }
    }

    /// Everything except `disabled`/`propagate_sticky`/`only_if_sticky`:
    /// the key two relations must share to be folded together by
    /// `merge_relations`.
    fn base_key(&self) -> (TableId, ColumnId, Option<String>, RelationType) {
        (self.table, self.column, self.name.clone(), self.r_type)
    }
}

/// Dedupe relations by full identity (including flags), preserving
/// insertion order.
pub fn dedupe_relations(relations: Vec<Relation>) -> Vec<Relation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for relation in relations {
        if seen.insert(relation.clone()) {
            out.push(relation);
        }
    }
    out
}

/// Group by structural equality (base key), fold flags by logical OR, and
/// drop any group that ends up disabled.
pub fn merge_relations(relations: Vec<Relation>) -> Vec<Relation> {
    let mut order: Vec<(TableId, ColumnId, Option<String>, RelationType)> = Vec::new();
    let mut groups: Vec<Vec<Relation>> = Vec::new();

    for relation in dedupe_relations(relations) {
        let key = relation.base_key();
        match order.iter().position(|k| k == &key) {
            Some(idx) => groups[idx].push(relation),
            None => {
                order.push(key);
                groups.push(vec![relation]);
            }
        }
    }

    let mut results = Vec::new();
    for group in groups {
        let disabled = group.iter().any(|r| r.disabled);
        if disabled {
            continue;
        }
        let propagate_sticky = group.iter().any(|r| r.propagate_sticky);
        let only_if_sticky = group.iter().any(|r| r.only_if_sticky);
        let mut representative = group.into_iter().next().expect("group is non-empty");
        representative.disabled = false;
        representative.propagate_sticky = propagate_sticky;
        representative.only_if_sticky = only_if_sticky;
        results.push(representative);
    }
    results
}
