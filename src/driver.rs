//! Dialect-aware SQL generation plus the async `Driver` trait that the
//! extractor and sink run against. Kept isolated from any one connection
//! type (`async-trait`, as the pack's db-resolver code does) so the
//! SQL-script sink can share escaping logic with a live connection.

use crate::error::{Error, ErrorType};
use crate::ext::string;
use crate::schema::{ColumnId, Schema, TableId};
use crate::value::Value;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Sqlite,
    Postgresql,
}

/// SQL/driver variant: placeholder symbols, identifier quoting, and
/// multi-column `IN` syntax. SQLite and PostgreSQL both quote identifiers
/// with double quotes, so only the multi-column `WHERE` clause and literal
/// escaping differ in practice.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;
    /// Whether this dialect's SQL-script sink output is meaningful to
    /// replay ("for observation only" otherwise, see sink.rs).
    fn can_generate_sql(&self) -> bool;
    fn quote_ident(&self, name: &str) -> String;
    fn escape_text(&self, s: &str) -> String;

    /// `(c1,c2) IN ((v1,v2), …)` where the dialect supports row
    /// constructors; `None` asks the caller to fall back to an
    /// `OR`-of-`AND`s clause.
    fn multi_col_in_clause(&self, cols: &[String]) -> Option<String>;
}

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }
    fn can_generate_sql(&self) -> bool {
        true
    }
    fn quote_ident(&self, name: &str) -> String {
        string::quote(name)
    }
    fn escape_text(&self, s: &str) -> String {
        string::single_quote(&s.replace('\'', "''"))
    }
    fn multi_col_in_clause(&self, _cols: &[String]) -> Option<String> {
        None
    }
}

pub struct PostgresqlDialect;

impl Dialect for PostgresqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgresql
    }
    fn can_generate_sql(&self) -> bool {
        true
    }
    fn quote_ident(&self, name: &str) -> String {
        string::quote(name)
    }
    fn escape_text(&self, s: &str) -> String {
        string::single_quote(&s.replace('\'', "''"))
    }
    fn multi_col_in_clause(&self, cols: &[String]) -> Option<String> {
        Some(format!(
            "({}) IN ",
            cols.iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

/// Abstract `insert_row`/`update_row`/`begin`/`commit`/`rollback` plus
/// fetch, over either a live connection or a to-be-rendered SQL script.
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// `SELECT all-cols FROM table WHERE cols IN values`, or a full table
    /// scan when `cols` is `None`.
    async fn fetch_rows(
        &self,
        schema: &Schema,
        table: TableId,
        cols: Option<&[ColumnId]>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Vec<Value>>, Error>;

    async fn insert_row(&self, schema: &Schema, table: TableId, row: &[Value]) -> Result<(), Error>;

    async fn update_row(
        &self,
        schema: &Schema,
        table: TableId,
        epk_cols: &[ColumnId],
        epk_values: &[Value],
        set_cols: &[ColumnId],
        set_values: &[Value],
    ) -> Result<(), Error>;

    async fn begin(&self) -> Result<(), Error>;
    async fn commit(&self) -> Result<(), Error>;
    async fn rollback(&self) -> Result<(), Error>;
}

#[cfg(feature = "database")]
pub struct SqliteDriver {
    pub conn: libsql::Connection,
    dialect: SqliteDialect,
}

#[cfg(feature = "database")]
impl SqliteDriver {
    pub fn new(conn: libsql::Connection) -> Self {
        SqliteDriver {
            conn,
            dialect: SqliteDialect,
        }
    }

    fn select_cols_csv(&self, schema: &Schema, table: TableId) -> String {
        schema
            .table(table)
            .columns
            .iter()
            .map(|c| self.dialect.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn fetch_rows(
        &self,
        schema: &Schema,
        table: TableId,
        cols: Option<&[ColumnId]>,
        values: Option<&[Vec<Value>]>,
    ) -> Result<Vec<Vec<Value>>, Error> {
        if let Some(values) = values {
            if values.is_empty() {
                return Ok(Vec::new());
            }
        }

        let table_name = self.dialect.quote_ident(&schema.table(table).name);
        let cols_csv = self.select_cols_csv(schema, table);
        let mut stmt = format!("SELECT {} FROM {}", cols_csv, table_name);
        let mut params: Vec<libsql::Value> = Vec::new();

        match (cols, values) {
            (None, _) => {}
            (Some(cols), Some(values)) if cols.len() == 1 => {
                let col_name = self.dialect.quote_ident(&schema.table(table).columns[cols[0]].name);
                let placeholders = vec!["?"; values.len()].join(", ");
                stmt.push_str(&format!(" WHERE {} IN ({})", col_name, placeholders));
                for tuple in values {
                    params.push((&tuple[0]).into());
                }
            }
            (Some(cols), Some(values)) => {
                let col_names: Vec<String> = cols
                    .iter()
                    .map(|&c| schema.table(table).columns[c].name.clone())
                    .collect();
                if let Some(prefix) = self.dialect.multi_col_in_clause(&col_names) {
                    let tuples = vec![format!("({})", vec!["?"; cols.len()].join(", ")); values.len()];
                    stmt.push_str(&format!(" WHERE {}({})", prefix, tuples.join(", ")));
                    for tuple in values {
                        for v in tuple {
                            params.push(v.into());
                        }
                    }
                } else {
                    let or_clauses: Vec<String> = values
                        .iter()
                        .map(|_| {
                            let ands: Vec<String> = col_names
                                .iter()
                                .map(|name| format!("{}=?", self.dialect.quote_ident(name)))
                                .collect();
                            format!("({})", ands.join(" AND "))
                        })
                        .collect();
                    stmt.push_str(&format!(" WHERE {}", or_clauses.join(" OR ")));
                    for tuple in values {
                        for v in tuple {
                            params.push(v.into());
                        }
                    }
                }
            }
            (None, None) | (Some(_), None) => {}
        }

        let mut rows = self.conn.query(&stmt, params).await?;
        let ncols = schema.table(table).columns.len();
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut values = Vec::with_capacity(ncols);
            for i in 0..ncols {
                values.push(Value::from(row.get_value(i as i32)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    async fn insert_row(&self, schema: &Schema, table: TableId, row: &[Value]) -> Result<(), Error> {
        let table_name = self.dialect.quote_ident(&schema.table(table).name);
        let cols_csv = self.select_cols_csv(schema, table);
        let placeholders = vec!["?"; row.len()].join(", ");
        let stmt = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_name, cols_csv, placeholders
        );
        let params: Vec<libsql::Value> = row.iter().map(libsql::Value::from).collect();
        self.conn.execute(&stmt, params).await?;
        Ok(())
    }

    async fn update_row(
        &self,
        schema: &Schema,
        table: TableId,
        epk_cols: &[ColumnId],
        epk_values: &[Value],
        set_cols: &[ColumnId],
        set_values: &[Value],
    ) -> Result<(), Error> {
        let t = schema.table(table);
        let table_name = self.dialect.quote_ident(&t.name);

        let sets: Vec<String> = set_cols
            .iter()
            .map(|&c| format!("{}=?", self.dialect.quote_ident(&t.columns[c].name)))
            .collect();
        let wheres: Vec<String> = epk_cols
            .iter()
            .map(|&c| format!("{}=?", self.dialect.quote_ident(&t.columns[c].name)))
            .collect();

        let stmt = format!(
            "UPDATE {} SET {} WHERE {}",
            table_name,
            sets.join(", "),
            wheres.join(" AND ")
        );

        let mut params: Vec<libsql::Value> = set_values.iter().map(libsql::Value::from).collect();
        params.extend(epk_values.iter().map(libsql::Value::from));

        self.conn.execute(&stmt, params).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<(), Error> {
        self.conn.execute("BEGIN", ()).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), Error> {
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

pub fn dialect_for_url(url: &str) -> Result<Box<dyn Dialect>, Error> {
    if url.starts_with("sqlite:") {
        Ok(Box::new(SqliteDialect))
    } else if url.starts_with("postgresql:") || url.starts_with("postgres:") {
        Ok(Box::new(PostgresqlDialect))
    } else {
        Err(Error::new(ErrorType::DatabaseUrl {
            message: format!("unrecognized database URL scheme in \"{}\"", url),
        }))
    }
}

/// Path portion of a `sqlite:///<path>` URL, `:memory:` for either spelling
/// of an in-memory database.
#[cfg(feature = "database")]
fn sqlite_path(url: &str) -> Result<String, Error> {
    let rest = url.strip_prefix("sqlite://").ok_or_else(|| {
        Error::new(ErrorType::DatabaseUrl {
            message: format!("not a sqlite:// URL: \"{}\"", url),
        })
    })?;
    match rest {
        "" | "/" | "/:memory:" | ":memory:" => Ok(":memory:".to_string()),
        path => Ok(path.to_string()),
    }
}

/// Opens a local libsql connection to a `sqlite:///<path>` URL. This is
/// the only live-fetch source dialect this build carries (see
/// DESIGN.md's note on why a live PostgreSQL driver was left out).
#[cfg(feature = "database")]
pub async fn open_sqlite(url: &str) -> Result<libsql::Connection, Error> {
    let path = sqlite_path(url)?;
    let db = libsql::Builder::new_local(&path).build().await?;
    db.connect().map_err(Error::from)
}
