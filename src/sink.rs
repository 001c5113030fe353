//! Output sink: `begin`/`insert_row`/`update_row`/`commit`/`rollback`/
//! `finish`, implemented either against a live destination connection or
//! as dialect-appropriate SQL text.

use crate::driver::Driver;
use crate::error::Error;
use crate::generator::{InsertStatement, UpdateStatement};
use crate::schema::Schema;
use async_trait::async_trait;
use std::io::Write;

#[async_trait]
pub trait Sink: Send {
    async fn begin(&mut self) -> Result<(), Error>;
    async fn insert_row(&mut self, schema: &Schema, stmt: &InsertStatement) -> Result<(), Error>;
    async fn update_row(&mut self, schema: &Schema, stmt: &UpdateStatement) -> Result<(), Error>;
    async fn commit(&mut self) -> Result<(), Error>;
    async fn rollback(&mut self) -> Result<(), Error>;
    async fn finish(&mut self) -> Result<(), Error>;
}

/// Executes parameterized statements against a destination connection,
/// wrapped in an explicit transaction so a failure partway through can be
/// rolled back in full.
pub struct LiveDbSink<D: Driver> {
    driver: D,
}

impl<D: Driver> LiveDbSink<D> {
    pub fn new(driver: D) -> Self {
        LiveDbSink { driver }
    }
}

#[async_trait]
impl<D: Driver> Sink for LiveDbSink<D> {
    async fn begin(&mut self) -> Result<(), Error> {
        self.driver.begin().await
    }

    async fn insert_row(&mut self, schema: &Schema, stmt: &InsertStatement) -> Result<(), Error> {
        self.driver.insert_row(schema, stmt.table, &stmt.values).await
    }

    async fn update_row(&mut self, schema: &Schema, stmt: &UpdateStatement) -> Result<(), Error> {
        self.driver
            .update_row(
                schema,
                stmt.table,
                &stmt.epk_cols,
                &stmt.epk_values,
                &stmt.set_cols,
                &stmt.set_values,
            )
            .await
    }

    async fn commit(&mut self) -> Result<(), Error> {
        self.driver.commit().await
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        self.driver.rollback().await
    }

    async fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Renders each statement as dialect-appropriate SQL text, framed by a
/// BEGIN/COMMIT prologue/epilogue. "For observation only" per the
/// dialect's `can_generate_sql` contract: callers wanting correctness use
/// the live-DB sink.
pub struct SqlScriptSink<W: Write + Send> {
    writer: W,
    dialect: Box<dyn crate::driver::Dialect>,
}

impl<W: Write + Send> SqlScriptSink<W> {
    pub fn new(writer: W, dialect: Box<dyn crate::driver::Dialect>) -> Self {
        SqlScriptSink { writer, dialect }
    }
}

#[async_trait]
impl<W: Write + Send> Sink for SqlScriptSink<W> {
    async fn begin(&mut self) -> Result<(), Error> {
        writeln!(self.writer, "BEGIN;").map_err(io_err)
    }

    async fn insert_row(&mut self, schema: &Schema, stmt: &InsertStatement) -> Result<(), Error> {
        let table = schema.table(stmt.table);
        let cols_csv = table
            .columns
            .iter()
            .map(|c| self.dialect.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let values_csv = stmt
            .values
            .iter()
            .map(|v| v.to_sql_literal(|s| self.dialect.escape_text(s)))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            self.writer,
            "INSERT INTO {} ({}) VALUES ({});",
            self.dialect.quote_ident(&table.name),
            cols_csv,
            values_csv
        )
        .map_err(io_err)
    }

    async fn update_row(&mut self, schema: &Schema, stmt: &UpdateStatement) -> Result<(), Error> {
        let table = schema.table(stmt.table);
        let sets = stmt
            .set_cols
            .iter()
            .zip(stmt.set_values.iter())
            .map(|(&c, v)| {
                format!(
                    "{}={}",
                    self.dialect.quote_ident(&table.columns[c].name),
                    v.to_sql_literal(|s| self.dialect.escape_text(s))
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let wheres = stmt
            .epk_cols
            .iter()
            .zip(stmt.epk_values.iter())
            .map(|(&c, v)| {
                format!(
                    "{}={}",
                    self.dialect.quote_ident(&table.columns[c].name),
                    v.to_sql_literal(|s| self.dialect.escape_text(s))
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        writeln!(
            self.writer,
            "UPDATE {} SET {} WHERE {};",
            self.dialect.quote_ident(&table.name),
            sets,
            wheres
        )
        .map_err(io_err)
    }

    async fn commit(&mut self) -> Result<(), Error> {
        writeln!(self.writer, "COMMIT;").map_err(io_err)
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(io_err)
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::new(crate::error::ErrorType::Driver {
        message: format!("I/O error writing SQL script: {}", e),
    })
}
