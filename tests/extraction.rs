//! End-to-end extraction + generation scenarios covering duplicate-row
//! handling, NOT NULL FK pull-in, deferred-update cycle breaking, sticky
//! propagation, and unbreakable NOT NULL cycles.

mod helpers;

use abridge::driver::SqliteDriver;
use abridge::extraction_model::ExtractionModel;
use abridge::extractor::{Extractor, Verbosity};
use abridge::generator::{Generator, Statement};
use abridge::{ErrorType, Value};

fn text(v: &Value) -> &str {
    match v {
        Value::Text(s) => s,
        other => panic!("expected text, got {:?}", other),
    }
}

fn int(v: &Value) -> i64 {
    match v {
        Value::Integer(i) => *i,
        other => panic!("expected integer, got {:?}", other),
    }
}

/// Single table, no FKs, a table with no primary key so duplicate
/// rows are preserved by multiplicity.
#[tokio::test]
async fn duplicate_rows_preserved_without_primary_key() {
    let (conn, schema) = helpers::open_memory_db(
        "CREATE TABLE test1 (id INTEGER, name TEXT);
         INSERT INTO test1 (id, name) VALUES (1,'a'), (2,'b'), (3,'c'), (3,'c');",
    )
    .await;

    assert!(schema.table(schema.table_id("test1").unwrap()).can_have_duplicated_rows);

    let model = helpers::model_from_yaml(&schema, "- subject:\n    - tables:\n        - table: test1\n");

    let driver = SqliteDriver::new(conn);
    let mut extractor = Extractor::new(&schema, &model, driver, false, Verbosity::Quiet);
    extractor.launch().await.expect("extraction failed");

    let generator = Generator::new(&schema, &model);
    let statements = generator.generate(extractor.results()).expect("generation failed");

    let inserts: Vec<&Value> = statements
        .iter()
        .filter_map(|s| match s {
            Statement::Insert(i) => Some(&i.values[1]),
            Statement::Update(_) => None,
        })
        .collect();

    assert_eq!(inserts.len(), 4);
    let names: Vec<&str> = inserts.iter().map(|v| text(v)).collect();
    assert_eq!(names, vec!["a", "b", "c", "c"]);
}

/// A NOT NULL FK pulls its parent row in even with no relations
/// configured explicitly, because `all-outgoing-not-null` is unconditional.
#[tokio::test]
async fn not_null_fk_pulls_parent_row_in() {
    let (conn, schema) = helpers::open_memory_db(
        "CREATE TABLE test1 (id INTEGER PRIMARY KEY);
         CREATE TABLE test2 (id INTEGER PRIMARY KEY, t1 INTEGER NOT NULL REFERENCES test1(id));
         INSERT INTO test1 (id) VALUES (1), (2);
         INSERT INTO test2 (id, t1) VALUES (1,1), (2,1), (3,2), (4,2);",
    )
    .await;

    let model = helpers::model_from_yaml(&schema, "- subject:\n    - tables:\n        - table: test2\n");

    let driver = SqliteDriver::new(conn);
    let mut extractor = Extractor::new(&schema, &model, driver, false, Verbosity::Quiet);
    extractor.launch().await.expect("extraction failed");

    let generator = Generator::new(&schema, &model);
    let statements = generator.generate(extractor.results()).expect("generation failed");

    let test1_id = schema.table_id("test1").unwrap();
    let test2_id = schema.table_id("test2").unwrap();

    let test1_inserts = statements
        .iter()
        .filter(|s| matches!(s, Statement::Insert(i) if i.table == test1_id))
        .count();
    let test2_inserts = statements
        .iter()
        .filter(|s| matches!(s, Statement::Insert(i) if i.table == test2_id))
        .count();

    assert_eq!(test1_inserts, 2);
    assert_eq!(test2_inserts, 4);

    // test1 rows must be emitted before any test2 row, since test2.t1 is
    // a NOT NULL FK to test1.
    let last_test1 = statements
        .iter()
        .rposition(|s| matches!(s, Statement::Insert(i) if i.table == test1_id))
        .unwrap();
    let first_test2 = statements
        .iter()
        .position(|s| matches!(s, Statement::Insert(i) if i.table == test2_id))
        .unwrap();
    assert!(last_test1 < first_test2);
}

/// A nullable FK cycle is broken by a deferred UPDATE: the
/// insert-order table is chosen by the NOT NULL edge alone, and the
/// nullable back-reference is patched up afterward.
#[tokio::test]
async fn deferred_update_breaks_nullable_fk_cycle() {
    let (conn, schema) = helpers::open_memory_db(
        "CREATE TABLE test1 (id INTEGER PRIMARY KEY, t2_id INTEGER REFERENCES test2(id));
         CREATE TABLE test2 (id INTEGER PRIMARY KEY, t1_id INTEGER NOT NULL REFERENCES test1(id));
         INSERT INTO test1 (id, t2_id) VALUES (1, 10);
         INSERT INTO test2 (id, t1_id) VALUES (10, 1);",
    )
    .await;

    let model = helpers::model_from_yaml(&schema, "- subject:\n    - tables:\n        - table: test1\n");

    let driver = SqliteDriver::new(conn);
    let mut extractor = Extractor::new(&schema, &model, driver, false, Verbosity::Quiet);
    extractor.launch().await.expect("extraction failed");

    let generator = Generator::new(&schema, &model);
    let order = generator.table_order().expect("not cyclic");
    let test1_id = schema.table_id("test1").unwrap();
    let test2_id = schema.table_id("test2").unwrap();
    assert_eq!(order, vec![test1_id, test2_id]);

    let statements = generator.generate(extractor.results()).expect("generation failed");
    assert_eq!(statements.len(), 3);

    // All inserts execute before any update: the deferred column on test1
    // points at a test2 row, so test2 must be fully inserted before test1's
    // update runs, even though test1 is ordered before test2.
    match &statements[0] {
        Statement::Insert(i) if i.table == test1_id => {
            assert_eq!(int(&i.values[0]), 1);
            assert!(i.values[1].is_null(), "t2_id must be NULL at insert time");
        }
        other => panic!("expected test1 insert first, got {:?}", other),
    }
    match &statements[1] {
        Statement::Insert(i) if i.table == test2_id => {
            assert_eq!(int(&i.values[0]), 10);
            assert_eq!(int(&i.values[1]), 1);
        }
        other => panic!("expected test2 insert second, got {:?}", other),
    }
    match &statements[2] {
        Statement::Update(u) if u.table == test1_id => {
            assert_eq!(int(&u.set_values[0]), 10);
        }
        other => panic!("expected a deferred test1 update last, got {:?}", other),
    }
}

/// Disabling an outgoing NOT NULL FK is a contradiction (it would
/// make the child row un-insertable) and must fail at config-load time.
#[tokio::test]
async fn disabled_not_null_outgoing_relation_is_rejected() {
    let (_conn, schema) = helpers::open_memory_db(
        "CREATE TABLE test1 (id INTEGER PRIMARY KEY);
         CREATE TABLE test2 (id INTEGER PRIMARY KEY, t1_nn_id INTEGER NOT NULL REFERENCES test1(id));",
    )
    .await;

    let doc: serde_yaml::Value = serde_yaml::from_str(
        "- relations:\n    - table: test2\n      column: t1_nn_id\n      type: outgoing\n      disabled: true\n",
    )
    .unwrap();
    let entries = doc.as_sequence().unwrap().clone();

    let err = ExtractionModel::load(&schema, entries).expect_err("must be rejected");
    assert!(matches!(err.error_type, ErrorType::RelationIntegrity { .. }));
}

/// A sticky outgoing nullable relation only traverses for rows
/// reached through a sticky path. `ancestor` branches into `mid` via two
/// incoming relations, one marked sticky (propagates `sticky=true`) and
/// one plain (propagates `sticky=false`); `mid.leaf_id` is configured
/// `sticky: true` (nullable + sticky implies `only_if_sticky`), so only the
/// `mid` row reached through the sticky branch should pull its `leaf`.
#[tokio::test]
async fn sticky_propagation_gates_parallel_branch() {
    let (conn, schema) = helpers::open_memory_db(
        "CREATE TABLE ancestor (id INTEGER PRIMARY KEY);
         CREATE TABLE leaf (id INTEGER PRIMARY KEY, label TEXT);
         CREATE TABLE mid (
             id INTEGER PRIMARY KEY,
             sticky_parent_id INTEGER REFERENCES ancestor(id),
             plain_parent_id INTEGER REFERENCES ancestor(id),
             leaf_id INTEGER REFERENCES leaf(id)
         );
         INSERT INTO ancestor (id) VALUES (1);
         INSERT INTO leaf (id, label) VALUES (100, 'reachable'), (200, 'unreachable');
         INSERT INTO mid (id, sticky_parent_id, plain_parent_id, leaf_id) VALUES
             (1, 1, NULL, 100),
             (2, NULL, 1, 200);",
    )
    .await;

    let model = helpers::model_from_yaml(
        &schema,
        "- relations:\n    \
            - table: mid\n      column: sticky_parent_id\n      type: incoming\n      sticky: true\n    \
            - table: mid\n      column: plain_parent_id\n      type: incoming\n    \
            - table: mid\n      column: leaf_id\n      type: outgoing\n      sticky: true\n\
         - subject:\n    - tables:\n        - table: ancestor\n",
    );

    let driver = SqliteDriver::new(conn);
    let mut extractor = Extractor::new(&schema, &model, driver, false, Verbosity::Quiet);
    extractor.launch().await.expect("extraction failed");

    let leaf_id = schema.table_id("leaf").unwrap();
    let mid_id = schema.table_id("mid").unwrap();
    let leaf_col_id = schema.table(leaf_id).column_id("id").unwrap();
    let mid_leaf_col = schema.table(mid_id).column_id("leaf_id").unwrap();

    let leaf_results: Vec<i64> = extractor
        .results()
        .get(&leaf_id)
        .map(|bucket| bucket.values().map(|r| int(&r.row[leaf_col_id])).collect())
        .unwrap_or_default();
    assert_eq!(
        leaf_results,
        vec![100],
        "only the leaf reached through the sticky branch should be fetched"
    );

    let mid_row_2 = extractor
        .results()
        .get(&mid_id)
        .and_then(|bucket| bucket.values().find(|r| int(&r.row[0]) == 2))
        .expect("mid row 2 must still be stored");
    assert!(
        mid_row_2.row[mid_leaf_col].is_null(),
        "the non-sticky branch's leaf_id must be nulled since its target was never fetched"
    );
}

/// An unbreakable NOT NULL cycle across three tables fails
/// generation with the sorted table names.
#[tokio::test]
async fn cyclic_not_null_dependency_fails_table_order() {
    let (_conn, schema) = helpers::open_memory_db(
        "CREATE TABLE a (id INTEGER PRIMARY KEY, b_id INTEGER NOT NULL REFERENCES b(id));
         CREATE TABLE b (id INTEGER PRIMARY KEY, c_id INTEGER NOT NULL REFERENCES c(id));
         CREATE TABLE c (id INTEGER PRIMARY KEY, a_id INTEGER NOT NULL REFERENCES a(id));",
    )
    .await;

    let model = helpers::model_from_yaml(&schema, "[]");
    let generator = Generator::new(&schema, &model);
    let err = generator.table_order().expect_err("cycle must be rejected");

    match err.error_type {
        abridge::ErrorType::CyclicDependency { tables } => {
            assert_eq!(tables, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        }
        other => panic!("expected CyclicDependency, got {:?}", other),
    }
}
