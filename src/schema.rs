use crate::error::{Error, ErrorType};
use std::collections::HashMap;

#[cfg(feature = "database")]
pub mod sqlite;

/// Index into `Schema::tables`. Tables form a cyclic ownership graph via
/// their foreign keys, so they're addressed by stable index rather than by
/// reference.
pub type TableId = usize;
/// Index into a table's `columns`.
pub type ColumnId = usize;
/// Index into a table's `foreign_keys`.
pub type ForeignKeyId = usize;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub notnull: bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub src_cols: Vec<ColumnId>,
    pub dst_table: TableId,
    pub dst_cols: Vec<ColumnId>,
}

#[derive(Debug, Clone)]
pub struct UniqueIndex {
    pub name: String,
    pub cols: Vec<ColumnId>,
}

/// Direction a relation travels along a foreign key, relative to the table
/// the caller starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// From the FK's source table, follow to its destination table.
    Outgoing,
    /// From the FK's destination table, follow back to its source table.
    Incoming,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub columns_by_name: HashMap<String, ColumnId>,
    pub primary_key: Option<Vec<ColumnId>>,
    pub unique_indexes: Vec<UniqueIndex>,
    pub foreign_keys: Vec<ForeignKey>,
    /// (owning table, index into that table's foreign_keys) for every FK
    /// whose dst_table is this table.
    pub incoming_foreign_keys: Vec<(TableId, ForeignKeyId)>,
    pub effective_primary_key: Vec<ColumnId>,
    pub can_have_duplicated_rows: bool,
}

impl Table {
    fn new(name: String) -> Self {
        Table {
            name,
            columns: Vec::new(),
            columns_by_name: HashMap::new(),
            primary_key: None,
            unique_indexes: Vec::new(),
            foreign_keys: Vec::new(),
            incoming_foreign_keys: Vec::new(),
            effective_primary_key: Vec::new(),
            can_have_duplicated_rows: false,
        }
    }

    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.columns_by_name.get(name).copied()
    }

    /// A FK is NOT NULL iff every one of its source columns is NOT NULL.
    pub fn fk_notnull(&self, fk: &ForeignKey) -> bool {
        fk.src_cols.iter().all(|&c| self.columns[c].notnull)
    }

    /// Every column that is a source column of some outgoing FK.
    pub fn all_fk_src_cols(&self) -> Vec<ColumnId> {
        let mut cols: Vec<ColumnId> = self
            .foreign_keys
            .iter()
            .flat_map(|fk| fk.src_cols.iter().copied())
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    /// Does `col` participate as a source column of some outgoing FK, and if
    /// so which one?
    pub fn fk_for_src_column(&self, col: ColumnId) -> Option<ForeignKeyId> {
        self.foreign_keys
            .iter()
            .position(|fk| fk.src_cols.contains(&col))
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub tables_by_name: HashMap<String, TableId>,
}

/// One entry of `Schema::relations()`: a FK viewed from one of its two ends.
#[derive(Debug, Clone)]
pub struct SchemaRelation {
    /// Table this entry is anchored at (the traversal's starting table).
    pub table: TableId,
    /// The table that owns the underlying ForeignKey value.
    pub fk_owner: TableId,
    pub fk: ForeignKeyId,
    pub r_type: RelationType,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            schema: Schema {
                tables: Vec::new(),
                tables_by_name: HashMap::new(),
            },
        }
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables_by_name.get(name).copied()
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id]
    }

    /// Every FK enumerated from both ends, matching `Schema.relations()` in
    /// the original: used by `dump-relations` and by default-relation
    /// expansion (`all-outgoing-*`, `all-incoming`, `everything`).
    pub fn relations(&self) -> Vec<SchemaRelation> {
        let mut out = Vec::new();
        for (table_id, table) in self.tables.iter().enumerate() {
            for (fk_id, fk) in table.foreign_keys.iter().enumerate() {
                out.push(SchemaRelation {
                    table: table_id,
                    fk_owner: table_id,
                    fk: fk_id,
                    r_type: RelationType::Outgoing,
                });
                out.push(SchemaRelation {
                    table: fk.dst_table,
                    fk_owner: table_id,
                    fk: fk_id,
                    r_type: RelationType::Incoming,
                });
            }
        }
        out
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Read-only view of the schema under construction, for introspection
    /// code that needs to resolve names it has already added.
    pub fn peek(&self) -> &Schema {
        &self.schema
    }

    pub fn add_table(&mut self, name: &str) -> TableId {
        let id = self.schema.tables.len();
        self.schema.tables.push(Table::new(name.to_string()));
        self.schema.tables_by_name.insert(name.to_string(), id);
        id
    }

    pub fn add_column(&mut self, table: TableId, name: &str, notnull: bool) -> ColumnId {
        let t = &mut self.schema.tables[table];
        let id = t.columns.len();
        t.columns.push(Column {
            name: name.to_string(),
            notnull,
        });
        t.columns_by_name.insert(name.to_string(), id);
        id
    }

    pub fn set_primary_key(&mut self, table: TableId, cols: Vec<ColumnId>) {
        self.schema.tables[table].primary_key = Some(cols);
    }

    pub fn add_unique_index(&mut self, table: TableId, name: &str, cols: Vec<ColumnId>) {
        self.schema.tables[table].unique_indexes.push(UniqueIndex {
            name: name.to_string(),
            cols,
        });
    }

    pub fn add_foreign_key(
        &mut self,
        table: TableId,
        name: Option<String>,
        src_cols: Vec<ColumnId>,
        dst_table: TableId,
        dst_cols: Vec<ColumnId>,
    ) -> ForeignKeyId {
        let t = &mut self.schema.tables[table];
        let id = t.foreign_keys.len();
        t.foreign_keys.push(ForeignKey {
            name,
            src_cols,
            dst_table,
            dst_cols,
        });
        id
    }

    /// Computes incoming FKs, effective primary keys, and rejects NOT NULL
    /// self-referencing foreign keys.
    pub fn finalize(mut self) -> Result<Schema, Error> {
        for table_id in 0..self.schema.tables.len() {
            for fk_id in 0..self.schema.tables[table_id].foreign_keys.len() {
                let fk = self.schema.tables[table_id].foreign_keys[fk_id].clone();
                self.schema.tables[fk.dst_table]
                    .incoming_foreign_keys
                    .push((table_id, fk_id));

                if fk.dst_table == table_id && self.schema.tables[table_id].fk_notnull(&fk) {
                    return Err(Error::new(ErrorType::RelationIntegrity {
                        message: format!(
                            "table \"{}\" has a NOT NULL foreign key referencing itself; this makes initial insert impossible without deferring constraints",
                            self.schema.tables[table_id].name
                        ),
                    }));
                }
            }
        }

        for table in self.schema.tables.iter_mut() {
            let (epk, dup) = effective_primary_key(table);
            table.effective_primary_key = epk;
            table.can_have_duplicated_rows = dup;
        }

        Ok(self.schema)
    }
}

fn effective_primary_key(table: &Table) -> (Vec<ColumnId>, bool) {
    if let Some(pk) = &table.primary_key {
        return (pk.clone(), false);
    }
    if let Some(shortest) = table
        .unique_indexes
        .iter()
        .min_by_key(|idx| idx.cols.len())
    {
        return (shortest.cols.clone(), false);
    }
    ((0..table.columns.len()).collect(), true)
}
