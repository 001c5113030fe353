//! Topological ordering over NOT NULL foreign-key dependencies plus
//! deferred-update derivation: turns a results store into an ordered
//! stream of insert/update statements that satisfies every NOT NULL FK
//! constraint on first pass and patches up nullable ones afterward.

use crate::error::{Error, ErrorType};
use crate::extraction_model::ExtractionModel;
use crate::extractor::ResultsStore;
use crate::schema::{ColumnId, ForeignKeyId, Schema, TableId};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: TableId,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table: TableId,
    pub epk_cols: Vec<ColumnId>,
    pub epk_values: Vec<Value>,
    pub set_cols: Vec<ColumnId>,
    pub set_values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Insert(InsertStatement),
    Update(UpdateStatement),
}

pub struct Generator<'s> {
    schema: &'s Schema,
    model: &'s ExtractionModel,
}

impl<'s> Generator<'s> {
    pub fn new(schema: &'s Schema, model: &'s ExtractionModel) -> Self {
        Generator { schema, model }
    }

    fn is_promoted(&self, table: TableId, fk: ForeignKeyId) -> bool {
        self.model
            .not_null_cols
            .iter()
            .any(|p| p.table == table && p.foreign_key == fk)
    }

    fn is_column_promoted(&self, table: TableId, fk: ForeignKeyId, column: ColumnId) -> bool {
        self.model
            .not_null_cols
            .iter()
            .any(|p| p.table == table && p.foreign_key == fk && p.column == column)
    }

    /// A table's FK is NOT NULL for ordering purposes if every source
    /// column is NOT NULL in the schema, or the FK has been promoted via
    /// `not-null-columns`. Self-loops are dropped, since a self-referencing
    /// FK can never be an ordering dependency.
    fn notnull_edges(&self) -> HashSet<(TableId, TableId)> {
        let mut edges = HashSet::new();
        for (table_id, table) in self.schema.tables.iter().enumerate() {
            for (fk_id, fk) in table.foreign_keys.iter().enumerate() {
                if fk.dst_table == table_id {
                    continue;
                }
                let notnull = table.fk_notnull(fk) || self.is_promoted(table_id, fk_id);
                if notnull {
                    edges.insert((table_id, fk.dst_table));
                }
            }
        }
        edges
    }

    /// Orders tables so that for every NOT NULL FK edge `u -> v` (u
    /// references v), v precedes u, i.e. every referenced table is
    /// inserted before the table that points at it. Implemented as
    /// repeated removal of tables with no remaining unresolved NOT NULL
    /// dependency ("out-degree" in the dependency graph), ranked by table
    /// name within a round for determinism. Tables left over once no more
    /// can be removed sit on an unbreakable NOT NULL cycle.
    pub fn table_order(&self) -> Result<Vec<TableId>, Error> {
        let n = self.schema.tables.len();
        let edges = self.notnull_edges();

        let mut out_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<TableId>> = vec![Vec::new(); n];
        for &(u, v) in &edges {
            out_degree[u] += 1;
            dependents[v].push(u);
        }

        let mut order = Vec::with_capacity(n);
        let mut remaining: HashSet<TableId> = (0..n).collect();

        loop {
            let mut ready: Vec<TableId> = remaining
                .iter()
                .copied()
                .filter(|&t| out_degree[t] == 0)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort_by(|&a, &b| self.schema.table(a).name.cmp(&self.schema.table(b).name));

            for table in ready {
                remaining.remove(&table);
                order.push(table);
                for &dependent in &dependents[table] {
                    if out_degree[dependent] > 0 {
                        out_degree[dependent] -= 1;
                    }
                }
            }
        }

        if !remaining.is_empty() {
            let mut names: Vec<String> = remaining
                .iter()
                .map(|&t| self.schema.table(t).name.clone())
                .collect();
            names.sort();
            return Err(Error::new(ErrorType::CyclicDependency { tables: names }));
        }

        Ok(order)
    }

    /// Per table, the FK source columns that are genuinely nullable (not
    /// promoted) whose destination table ends up ordered at-or-after the
    /// source, column by column: a multi-column FK can mix NOT NULL and
    /// nullable members, and only the nullable, non-promoted ones get
    /// inserted NULL and patched by a deferred UPDATE.
    fn deferred_columns(&self, order: &[TableId]) -> HashMap<TableId, Vec<ColumnId>> {
        let position: HashMap<TableId, usize> =
            order.iter().enumerate().map(|(i, &t)| (t, i)).collect();
        let mut result: HashMap<TableId, Vec<ColumnId>> = HashMap::new();

        for (table_id, table) in self.schema.tables.iter().enumerate() {
            for (fk_id, fk) in table.foreign_keys.iter().enumerate() {
                if position[&table_id] > position[&fk.dst_table] {
                    continue;
                }
                for &col in &fk.src_cols {
                    if table.columns[col].notnull {
                        continue;
                    }
                    if self.is_column_promoted(table_id, fk_id, col) {
                        continue;
                    }
                    result.entry(table_id).or_default().push(col);
                }
            }
        }
        result
    }

    /// Produces the ordered insert/update statement stream for `results`:
    /// tables in topological order, rows within a table sorted by value
    /// tuple, each row's deferred columns nulled at insert time and
    /// patched by a trailing UPDATE when they carried a value.
    pub fn generate(&self, results: &ResultsStore) -> Result<Vec<Statement>, Error> {
        let order = self.table_order()?;
        let deferred = self.deferred_columns(&order);
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for table in order.iter().copied() {
            let epk = self.schema.table(table).effective_primary_key.clone();
            let can_dup = self.schema.table(table).can_have_duplicated_rows;
            let deferred_cols = deferred.get(&table).cloned().unwrap_or_default();

            let mut rows: Vec<_> = results
                .get(&table)
                .map(|bucket| bucket.values().collect::<Vec<_>>())
                .unwrap_or_default();
            rows.sort_by(|a, b| a.row.cmp(&b.row));

            for row in rows {
                let epk_values: Vec<Value> = epk.iter().map(|&c| row.row[c].clone()).collect();
                let mut emit_row = row.row.clone();
                let mut set_cols = Vec::new();
                let mut set_values = Vec::new();

                for &col in &deferred_cols {
                    if !emit_row[col].is_null() {
                        set_cols.push(col);
                        set_values.push(emit_row[col].clone());
                        emit_row[col] = Value::Null;
                    }
                }

                let count = if can_dup { row.count } else { 1 };
                for _ in 0..count {
                    inserts.push(Statement::Insert(InsertStatement {
                        table,
                        values: emit_row.clone(),
                    }));
                }

                if !set_cols.is_empty() {
                    updates.push(Statement::Update(UpdateStatement {
                        table,
                        epk_cols: epk.clone(),
                        epk_values: epk_values.clone(),
                        set_cols,
                        set_values,
                    }));
                }
            }
        }

        // Every insert must execute before any update: a deferred column's
        // value may point at a row in a table ordered after its own, so an
        // update interleaved between that table's inserts would reference a
        // row that doesn't exist yet.
        inserts.extend(updates);
        Ok(inserts)
    }
}
