//! SQLite schema introspection: `sqlite_master` for table names,
//! `PRAGMA table_info` for columns/primary key, `PRAGMA foreign_key_list`
//! for foreign keys, `PRAGMA index_list`/`index_info` for unique indexes.
//! Grounded in the CLI's own PRAGMA-based introspection for migrations.

use super::{Schema, SchemaBuilder, TableId};
use crate::error::{Error, ErrorType};
use serde::Deserialize;

const LIST_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name";

#[derive(Debug, Deserialize)]
struct DbTable {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ColumnInfoRow {
    name: String,
    notnull: i64,
    pk: i64,
}

#[derive(Debug, Deserialize)]
struct ForeignKeyRow {
    id: i64,
    table: String,
    from: String,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexListRow {
    name: String,
    unique: i64,
}

#[derive(Debug, Deserialize)]
struct IndexInfoRow {
    name: String,
}

pub async fn introspect(conn: &libsql::Connection) -> Result<Schema, Error> {
    let mut builder = Schema::builder();
    let mut table_ids: Vec<TableId> = Vec::new();

    let mut rows = conn.query(LIST_TABLES, ()).await?;
    while let Some(row) = rows.next().await? {
        let table: DbTable = libsql::de::from_row(&row)?;
        table_ids.push(builder.add_table(&table.name));
    }

    for &table_id in &table_ids {
        add_columns(conn, &mut builder, table_id).await?;
    }
    for &table_id in &table_ids {
        add_foreign_keys(conn, &mut builder, table_id).await?;
    }
    for &table_id in &table_ids {
        add_unique_indexes(conn, &mut builder, table_id).await?;
    }

    builder.finalize()
}

async fn add_columns(
    conn: &libsql::Connection,
    builder: &mut SchemaBuilder,
    table_id: TableId,
) -> Result<(), Error> {
    let table_name = builder_table_name(builder, table_id);
    let sql = format!("PRAGMA table_info('{}')", table_name);
    let mut rows = conn.query(&sql, ()).await?;

    let mut primary_key = Vec::new();
    while let Some(row) = rows.next().await? {
        let col: ColumnInfoRow = libsql::de::from_row(&row)?;
        let col_id = builder.add_column(table_id, &col.name, col.notnull != 0);
        if col.pk > 0 {
            primary_key.push((col.pk, col_id));
        }
    }
    if !primary_key.is_empty() {
        primary_key.sort_by_key(|(seq, _)| *seq);
        builder.set_primary_key(table_id, primary_key.into_iter().map(|(_, c)| c).collect());
    }
    Ok(())
}

async fn add_foreign_keys(
    conn: &libsql::Connection,
    builder: &mut SchemaBuilder,
    table_id: TableId,
) -> Result<(), Error> {
    let table_name = builder_table_name(builder, table_id);
    let sql = format!("PRAGMA foreign_key_list('{}')", table_name);
    let mut rows = conn.query(&sql, ()).await?;

    let mut grouped: Vec<(i64, String, Vec<(String, Option<String>)>)> = Vec::new();
    while let Some(row) = rows.next().await? {
        let fk: ForeignKeyRow = libsql::de::from_row(&row)?;
        match grouped.iter_mut().find(|(id, _, _)| *id == fk.id) {
            Some((_, _, cols)) => cols.push((fk.from, fk.to)),
            None => grouped.push((fk.id, fk.table, vec![(fk.from, fk.to)])),
        }
    }

    for (_id, dst_table_name, cols) in grouped {
        let dst_table_id = builder_table_id(builder, &dst_table_name).ok_or_else(|| {
            Error::new(ErrorType::UnknownTable {
                table: dst_table_name.clone(),
            })
        })?;

        let mut src_cols = Vec::new();
        let mut dst_cols = Vec::new();
        for (i, (src_col_name, dst_col_name)) in cols.iter().enumerate() {
            let src_col = builder_column_id(builder, table_id, src_col_name).ok_or_else(|| {
                Error::new(ErrorType::UnknownColumn {
                    table: table_name.clone(),
                    column: src_col_name.clone(),
                })
            })?;
            let dst_col = match dst_col_name {
                Some(name) => builder_column_id(builder, dst_table_id, name).ok_or_else(|| {
                    Error::new(ErrorType::UnknownColumn {
                        table: dst_table_name.clone(),
                        column: name.clone(),
                    })
                })?,
                None => builder_primary_key_col(builder, dst_table_id, i).ok_or_else(|| {
                    Error::new(ErrorType::RelationIntegrity {
                        message: format!(
                            "foreign key on \"{}\" references \"{}\" positionally but it has no primary key",
                            table_name, dst_table_name
                        ),
                    })
                })?,
            };
            src_cols.push(src_col);
            dst_cols.push(dst_col);
        }

        builder.add_foreign_key(table_id, None, src_cols, dst_table_id, dst_cols);
    }

    Ok(())
}

async fn add_unique_indexes(
    conn: &libsql::Connection,
    builder: &mut SchemaBuilder,
    table_id: TableId,
) -> Result<(), Error> {
    let table_name = builder_table_name(builder, table_id);
    let sql = format!("PRAGMA index_list('{}')", table_name);
    let mut rows = conn.query(&sql, ()).await?;

    let mut index_names = Vec::new();
    while let Some(row) = rows.next().await? {
        let idx: IndexListRow = libsql::de::from_row(&row)?;
        if idx.unique != 0 {
            index_names.push(idx.name);
        }
    }

    for index_name in index_names {
        let sql = format!("PRAGMA index_info('{}')", index_name);
        let mut rows = conn.query(&sql, ()).await?;
        let mut cols = Vec::new();
        while let Some(row) = rows.next().await? {
            let info: IndexInfoRow = libsql::de::from_row(&row)?;
            if let Some(col_id) = builder_column_id(builder, table_id, &info.name) {
                cols.push(col_id);
            }
        }
        builder.add_unique_index(table_id, &index_name, cols);
    }

    Ok(())
}

// SchemaBuilder exposes no public read accessors (it's a write-only
// construction API); introspection needs to read back what it has already
// added, so these helpers go through the schema under construction.
fn builder_table_name(builder: &SchemaBuilder, table_id: TableId) -> String {
    builder.peek().tables[table_id].name.clone()
}

fn builder_table_id(builder: &SchemaBuilder, name: &str) -> Option<TableId> {
    builder.peek().tables_by_name.get(name).copied()
}

fn builder_column_id(
    builder: &SchemaBuilder,
    table_id: TableId,
    name: &str,
) -> Option<super::ColumnId> {
    builder.peek().tables[table_id].column_id(name)
}

fn builder_primary_key_col(
    builder: &SchemaBuilder,
    table_id: TableId,
    position: usize,
) -> Option<super::ColumnId> {
    builder.peek().tables[table_id]
        .primary_key
        .as_ref()
        .and_then(|pk| pk.get(position).copied())
}
