//! Breadth-first, single-threaded extraction engine: walks the schema's
//! foreign-key edges from each subject's seed tables, fetching rows through
//! the driver and folding them into the results store.

pub mod results_row;
pub mod work_item;

use crate::driver::Driver;
use crate::error::Error;
use crate::extraction_model::{merge_relations, ExtractionModel, Relation};
use crate::schema::{ColumnId, RelationType, Schema, TableId};
use crate::value::Value;
use colored::Colorize;
use results_row::{ResultsRow, SubjectId};
use std::collections::{HashMap, HashSet, VecDeque};
use work_item::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// One row's worth of a relation, precomputed per subject so the main loop
/// never re-resolves FK direction while processing work items.
#[derive(Debug, Clone)]
struct TableRelation {
    src_cols: Vec<ColumnId>,
    dst_table: TableId,
    dst_cols: Vec<ColumnId>,
    propagate_sticky: bool,
    only_if_sticky: bool,
}

fn build_table_relations(schema: &Schema, relations: &[Relation]) -> HashMap<TableId, Vec<TableRelation>> {
    let mut map: HashMap<TableId, Vec<TableRelation>> = HashMap::new();
    for r in relations {
        let fk = &schema.table(r.table).foreign_keys[r.foreign_key];
        let (key, src_cols, dst_cols, dst_table) = match r.r_type {
            RelationType::Outgoing => (r.table, fk.src_cols.clone(), fk.dst_cols.clone(), fk.dst_table),
            RelationType::Incoming => (fk.dst_table, fk.dst_cols.clone(), fk.src_cols.clone(), r.table),
        };
        map.entry(key).or_default().push(TableRelation {
            src_cols,
            dst_table,
            dst_cols,
            propagate_sticky: r.propagate_sticky,
            only_if_sticky: r.only_if_sticky,
        });
    }
    map
}

/// `table -> EPK-tuple -> ResultsRow`, flattened to two levels (the
/// per-table effective-PK column selection is already baked into the
/// EPK tuple itself, so there's no need for a separate level for it).
pub type ResultsStore = HashMap<TableId, HashMap<Vec<Value>, ResultsRow>>;

pub struct Extractor<'s, D: Driver> {
    schema: &'s Schema,
    model: &'s ExtractionModel,
    driver: D,
    explain: bool,
    verbosity: Verbosity,
    work_queue: VecDeque<WorkItem>,
    seen: HashSet<String>,
    results: ResultsStore,
    subject_table_relations: Vec<HashMap<TableId, Vec<TableRelation>>>,
    fetched_row_count: u64,
    fetched_row_count_per_table: HashMap<TableId, u64>,
}

impl<'s, D: Driver> Extractor<'s, D> {
    pub fn new(schema: &'s Schema, model: &'s ExtractionModel, driver: D, explain: bool, verbosity: Verbosity) -> Self {
        let subject_table_relations = model
            .subjects
            .iter()
            .map(|subject| {
                let merged: Vec<Relation> = merge_relations(
                    model
                        .relations
                        .iter()
                        .cloned()
                        .chain(subject.relations.iter().cloned())
                        .collect(),
                );
                build_table_relations(schema, &merged)
            })
            .collect();

        Extractor {
            schema,
            model,
            driver,
            explain,
            verbosity,
            work_queue: VecDeque::new(),
            seen: HashSet::new(),
            results: HashMap::new(),
            subject_table_relations,
            fetched_row_count: 0,
            fetched_row_count_per_table: HashMap::new(),
        }
    }

    pub fn results(&self) -> &ResultsStore {
        &self.results
    }

    fn seed(&mut self) {
        for (subject_id, subject) in self.model.subjects.iter().enumerate() {
            for target in &subject.tables {
                let (cols, values) = match (target.column, &target.values) {
                    (Some(col), Some(vals)) => (
                        Some(vec![col]),
                        Some(vals.iter().map(|v| vec![v.clone()]).collect()),
                    ),
                    _ => (None, None),
                };
                self.work_queue
                    .push_back(WorkItem::seed(self.schema, subject_id, target.table, cols, values, true));
            }
        }
    }

    /// Runs the main loop to completion. In explain mode this only prints
    /// traversal breadcrumbs; the caller must not also invoke the generator.
    pub async fn launch(&mut self) -> Result<(), Error> {
        self.seed();

        if self.verbosity >= Verbosity::Normal {
            eprintln!(
                "{} {} seed work item(s)",
                "extracting".cyan(),
                self.work_queue.len()
            );
        }

        while let Some(item) = self.work_queue.pop_front() {
            self.dispatch(item).await?;
        }

        if self.verbosity >= Verbosity::Normal && !self.explain {
            eprintln!(
                "{} {} row(s) fetched across {} table(s)",
                "done:".cyan(),
                self.fetched_row_count,
                self.fetched_row_count_per_table.len()
            );
        }

        Ok(())
    }

    /// Per-value dedup filtering: a work item with concrete values is
    /// processed only for the values not already in the seen-set; a
    /// whole-table scan item is processed only if its item-level hash is
    /// unseen.
    async fn dispatch(&mut self, item: WorkItem) -> Result<(), Error> {
        match &item.cols {
            None => {
                let h = item.non_value_hash();
                if self.seen.contains(&h) {
                    return Ok(());
                }
                self.process_work_item(&item, None).await?;
                self.seen.insert(h);
            }
            Some(_) => {
                let values = item.values.clone().unwrap_or_default();
                let mut fresh_values = Vec::new();
                let mut fresh_hashes = Vec::new();
                for v in values {
                    let h = item.value_hash(&v);
                    if !self.seen.contains(&h) {
                        fresh_hashes.push(h);
                        fresh_values.push(v);
                    }
                }
                if fresh_values.is_empty() {
                    return Ok(());
                }
                self.process_work_item(&item, Some(fresh_values)).await?;
                self.seen.extend(fresh_hashes);
            }
        }
        Ok(())
    }

    async fn process_work_item(&mut self, item: &WorkItem, values: Option<Vec<Vec<Value>>>) -> Result<(), Error> {
        if self.explain {
            println!("{}", item.history_line(self.schema));
        } else if self.verbosity == Verbosity::Verbose {
            eprintln!("{} {}", "fetch".cyan(), item.history_line(self.schema));
        }

        let mut rows = self
            .driver
            .fetch_rows(self.schema, item.table, item.cols.as_deref(), values.as_deref())
            .await?;

        self.fetched_row_count += rows.len() as u64;
        *self.fetched_row_count_per_table.entry(item.table).or_insert(0) += rows.len() as u64;

        let table_relations = self
            .subject_table_relations[item.subject]
            .get(&item.table)
            .cloned()
            .unwrap_or_default();

        let mut processed_outgoing: HashSet<ColumnId> = HashSet::new();

        for rel in &table_relations {
            if rel.only_if_sticky && !item.sticky {
                continue;
            }
            processed_outgoing.extend(rel.src_cols.iter().copied());
            let new_sticky = item.sticky && rel.propagate_sticky;

            if self.explain {
                for row in &rows {
                    let tuple: Vec<Value> = rel.src_cols.iter().map(|&c| row[c].clone()).collect();
                    if tuple.iter().any(Value::is_null) {
                        continue;
                    }
                    let parent_row = ResultsRow::new(item.table, row.clone());
                    let child = WorkItem::child(
                        self.schema,
                        item,
                        rel.dst_table,
                        Some(rel.dst_cols.clone()),
                        Some(vec![tuple]),
                        new_sticky,
                        Some(&parent_row),
                    );
                    self.work_queue.push_back(child);
                }
            } else {
                let mut dst_values = Vec::new();
                let mut seen_tuples = HashSet::new();
                for row in &rows {
                    let tuple: Vec<Value> = rel.src_cols.iter().map(|&c| row[c].clone()).collect();
                    if tuple.iter().any(Value::is_null) {
                        continue;
                    }
                    if seen_tuples.insert(tuple.clone()) {
                        dst_values.push(tuple);
                    }
                }
                if dst_values.is_empty() {
                    continue;
                }
                let child = WorkItem::child(
                    self.schema,
                    item,
                    rel.dst_table,
                    Some(rel.dst_cols.clone()),
                    Some(dst_values),
                    new_sticky,
                    None,
                );
                self.work_queue.push_back(child);
            }
        }

        let to_null: Vec<ColumnId> = self
            .schema
            .table(item.table)
            .all_fk_src_cols()
            .into_iter()
            .filter(|c| !processed_outgoing.contains(c))
            .collect();

        for row in &mut rows {
            for &c in &to_null {
                row[c] = Value::Null;
            }
        }

        if self.schema.table(item.table).can_have_duplicated_rows {
            // count is the number of identical rows observed in *this*
            // fetch, not a running total across every fetch that has ever
            // touched this EPK bucket. A later fetch's count replaces,
            // rather than adds to, an earlier one.
            let epk = self.schema.table(item.table).effective_primary_key.clone();
            let mut local_counts: HashMap<Vec<Value>, (Vec<Value>, u64)> = HashMap::new();
            for row in rows {
                let key: Vec<Value> = epk.iter().map(|&c| row[c].clone()).collect();
                local_counts.entry(key).or_insert_with(|| (row, 0)).1 += 1;
            }
            for (_, (row, count)) in local_counts {
                self.store_duplicate_row(item.table, item.subject, row, count);
            }
        } else {
            for row in rows {
                self.store_row(item.table, item.subject, row);
            }
        }

        Ok(())
    }

    fn store_row(&mut self, table: TableId, subject: SubjectId, row: Vec<Value>) {
        let epk = &self.schema.table(table).effective_primary_key;
        let key: Vec<Value> = epk.iter().map(|&c| row[c].clone()).collect();
        let bucket = self.results.entry(table).or_default();

        match bucket.get_mut(&key) {
            Some(existing) => {
                let mut merged = ResultsRow::new(table, row);
                merged.merge_from(existing);
                merged.subjects = existing.subjects.clone();
                merged.count = existing.count;
                merged.subjects.insert(subject);
                *existing = merged;
            }
            None => {
                let mut new_row = ResultsRow::new(table, row);
                new_row.subjects.insert(subject);
                bucket.insert(key, new_row);
            }
        }
    }

    /// `can_have_duplicated_rows` tables have no real identity column, so
    /// there's nothing to merge field-by-field. `count` (authoritative
    /// for this fetch) and accumulated `subjects` are the whole story.
    fn store_duplicate_row(&mut self, table: TableId, subject: SubjectId, row: Vec<Value>, count: u64) {
        let epk = &self.schema.table(table).effective_primary_key;
        let key: Vec<Value> = epk.iter().map(|&c| row[c].clone()).collect();
        let bucket = self.results.entry(table).or_default();

        match bucket.get_mut(&key) {
            Some(existing) => {
                existing.count = count;
                existing.subjects.insert(subject);
            }
            None => {
                let mut new_row = ResultsRow::new(table, row);
                new_row.count = count;
                new_row.subjects.insert(subject);
                bucket.insert(key, new_row);
            }
        }
    }
}
