use super::results_row::{ResultsRow, SubjectId};
use crate::schema::{ColumnId, Schema, TableId};
use crate::value::Value;

/// One breadcrumb of the traversal that produced a work item, printed by
/// explain mode as `table.cols=values` chained with ` -> `, `*`-suffixed
/// on sticky segments.
#[derive(Debug, Clone)]
pub struct HistoryStep {
    pub table: TableId,
    pub cols_csv: Option<String>,
    pub values_csv: Option<String>,
    pub sticky: bool,
}

impl PartialEq for HistoryStep {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.cols_csv == other.cols_csv
            && self.values_csv == other.values_csv
            && self.sticky == other.sticky
    }
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub subject: SubjectId,
    pub table: TableId,
    pub cols: Option<Vec<ColumnId>>,
    pub values: Option<Vec<Vec<Value>>>,
    pub sticky: bool,
    pub depth: u32,
    pub history: Vec<HistoryStep>,
}

impl WorkItem {
    pub fn seed(
        schema: &Schema,
        subject: SubjectId,
        table: TableId,
        cols: Option<Vec<ColumnId>>,
        values: Option<Vec<Vec<Value>>>,
        sticky: bool,
    ) -> WorkItem {
        let step = work_item_step(schema, table, cols.as_deref(), values.as_deref(), sticky);
        WorkItem {
            subject,
            table,
            cols,
            values,
            sticky,
            depth: 0,
            history: vec![step],
        }
    }

    /// Builds a downstream work item from a parent. `parent_results_row`
    /// is only given in explain mode's per-row traversal; in bulk mode
    /// the history is simply inherited unextended, since it's never
    /// printed there.
    pub fn child(
        schema: &Schema,
        parent: &WorkItem,
        table: TableId,
        cols: Option<Vec<ColumnId>>,
        values: Option<Vec<Vec<Value>>>,
        sticky: bool,
        parent_results_row: Option<&ResultsRow>,
    ) -> WorkItem {
        let mut history = parent.history.clone();

        if let Some(results_row) = parent_results_row {
            let row_step = results_row_step(schema, results_row, sticky);
            if history.last().map(|s| s != &row_step).unwrap_or(true) {
                history.push(row_step.clone());
            }
            let item_step = work_item_step(schema, table, cols.as_deref(), values.as_deref(), sticky);
            if item_step != row_step {
                history.push(item_step);
            }
        }

        WorkItem {
            subject: parent.subject,
            table,
            cols,
            values,
            sticky,
            depth: parent.depth + 1,
            history,
        }
    }

    pub fn value_hash(&self, value: &[Value]) -> String {
        crate::hash::value_hash(
            self.subject,
            self.table,
            self.cols.as_deref().unwrap_or(&[]),
            value,
            self.sticky,
        )
    }

    pub fn non_value_hash(&self) -> String {
        crate::hash::non_value_hash(self.subject, self.table, self.sticky)
    }

    pub fn history_line(&self, schema: &Schema) -> String {
        self.history
            .iter()
            .map(|step| {
                let name = &schema.table(step.table).name;
                let mut part = match (&step.cols_csv, &step.values_csv) {
                    (Some(cols), Some(values)) => format!("{}.{}={}", name, cols, values),
                    _ => name.clone(),
                };
                if step.sticky {
                    part.push('*');
                }
                part
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn work_item_step(
    schema: &Schema,
    table: TableId,
    cols: Option<&[ColumnId]>,
    values: Option<&[Vec<Value>]>,
    sticky: bool,
) -> HistoryStep {
    match (cols, values) {
        (Some(cols), Some(values)) if !values.is_empty() => {
            let col_names: Vec<&str> = cols
                .iter()
                .map(|&c| schema.table(table).columns[c].name.as_str())
                .collect();
            let value_strs: Vec<String> = values[0].iter().map(Value::display).collect();
            let (cols_csv, values_csv) = if cols.len() > 1 {
                (
                    format!("({})", col_names.join(",")),
                    format!("({})", value_strs.join(",")),
                )
            } else {
                (col_names.join(","), value_strs.join(","))
            };
            HistoryStep {
                table,
                cols_csv: Some(cols_csv),
                values_csv: Some(values_csv),
                sticky,
            }
        }
        _ => HistoryStep {
            table,
            cols_csv: None,
            values_csv: None,
            sticky,
        },
    }
}

fn results_row_step(schema: &Schema, results_row: &ResultsRow, sticky: bool) -> HistoryStep {
    let table = results_row.table;
    let epk = &schema.table(table).effective_primary_key;
    let col_names: Vec<&str> = epk
        .iter()
        .map(|&c| schema.table(table).columns[c].name.as_str())
        .collect();
    let value_strs: Vec<String> = epk.iter().map(|&c| results_row.row[c].display()).collect();
    HistoryStep {
        table,
        cols_csv: Some(col_names.join(",")),
        values_csv: Some(value_strs.join(",")),
        sticky,
    }
}
