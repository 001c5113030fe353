//! Shared scaffolding for integration tests: spins up an in-memory SQLite
//! database from raw DDL, introspects it, and builds an `ExtractionModel`
//! from an inline YAML string (skipping `config::load`'s include
//! resolution, which has its own tests).

use abridge::extraction_model::ExtractionModel;
use abridge::schema::{self, Schema};
use libsql::Connection;

pub async fn open_memory_db(ddl: &str) -> (Connection, Schema) {
    let db = libsql::Builder::new_local(":memory:")
        .build()
        .await
        .expect("failed to open in-memory sqlite database");
    let conn = db.connect().expect("failed to open connection");
    conn.execute_batch(ddl)
        .await
        .expect("failed to run setup DDL");
    let schema = schema::sqlite::introspect(&conn)
        .await
        .expect("failed to introspect schema");
    (conn, schema)
}

pub fn model_from_yaml(schema: &Schema, yaml: &str) -> ExtractionModel {
    let doc: serde_yaml::Value = serde_yaml::from_str(yaml).expect("invalid yaml");
    let entries = doc
        .as_sequence()
        .expect("config root must be a sequence")
        .clone();
    ExtractionModel::load(schema, entries).expect("failed to load extraction model")
}
