use crate::schema::TableId;
use crate::value::Value;
use std::collections::BTreeSet;

pub type SubjectId = usize;

/// One row at a given table, plus the set of subjects it was reached
/// under and its multiplicity for tables that allow duplicate rows.
/// `subjects` is a `BTreeSet` rather than a `HashSet` so provenance
/// iterates deterministically.
#[derive(Debug, Clone)]
pub struct ResultsRow {
    pub table: TableId,
    pub row: Vec<Value>,
    pub subjects: BTreeSet<SubjectId>,
    pub count: u64,
}

impl ResultsRow {
    pub fn new(table: TableId, row: Vec<Value>) -> Self {
        ResultsRow {
            table,
            row,
            subjects: BTreeSet::new(),
            count: 1,
        }
    }

    /// Fills any NULL column in `self` from the corresponding non-NULL
    /// column of `existing`. Never overwrites a non-NULL value: the EPK
    /// identity guarantees a collision at non-NULL columns means the same
    /// logical row.
    pub fn merge_from(&mut self, existing: &ResultsRow) {
        for (slot, existing_val) in self.row.iter_mut().zip(existing.row.iter()) {
            if slot.is_null() && !existing_val.is_null() {
                *slot = existing_val.clone();
            }
        }
    }
}
