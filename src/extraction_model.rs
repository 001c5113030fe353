use crate::error::{Error, ErrorType};
use crate::schema::{ColumnId, RelationType, Schema, TableId};
use crate::value::Value;
use serde::Deserialize;

pub mod relation;
pub use relation::{dedupe_relations, merge_relations, Relation};

/// An extraction starting point: one or more seed tables plus subject-local
/// relation overrides, which are merged with the global relation list only
/// when the extractor builds its per-subject table-relations map.
#[derive(Debug, Clone)]
pub struct Subject {
    pub relations: Vec<Relation>,
    pub tables: Vec<TargetTable>,
}

#[derive(Debug, Clone)]
pub struct TargetTable {
    pub table: TableId,
    pub column: Option<ColumnId>,
    pub values: Option<Vec<Value>>,
}

/// Promotes a nullable FK source column to be treated as NOT NULL during
/// generator ordering.
#[derive(Debug, Clone)]
pub struct NotNullColumn {
    pub table: TableId,
    pub column: ColumnId,
    pub foreign_key: crate::schema::ForeignKeyId,
}

#[derive(Debug, Clone)]
pub struct ExtractionModel {
    pub relations: Vec<Relation>,
    pub subjects: Vec<Subject>,
    pub not_null_cols: Vec<NotNullColumn>,
}

// --- YAML config shapes -----------------------------------------------

#[derive(Debug, Deserialize)]
struct RelationConfig {
    defaults: Option<String>,
    table: Option<String>,
    column: Option<String>,
    name: Option<String>,
    #[serde(default)]
    disabled: bool,
    sticky: Option<bool>,
    #[serde(rename = "type")]
    r_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarConfig {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<ScalarConfig> for Value {
    fn from(s: ScalarConfig) -> Value {
        match s {
            ScalarConfig::Int(i) => Value::Integer(i),
            ScalarConfig::Float(f) => Value::Real(f),
            ScalarConfig::Text(t) => Value::Text(t),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValuesConfig {
    Many(Vec<ScalarConfig>),
    One(ScalarConfig),
}

impl ValuesConfig {
    fn into_values(self) -> Vec<Value> {
        match self {
            ValuesConfig::Many(items) => items.into_iter().map(Value::from).collect(),
            ValuesConfig::One(item) => vec![Value::from(item)],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TableConfig {
    table: String,
    column: Option<String>,
    values: Option<ValuesConfig>,
}

#[derive(Debug, Deserialize)]
struct NotNullColumnConfig {
    table: String,
    column: String,
}

const DEFAULT_OUTGOING_NOTNULL: &str = "all-outgoing-not-null";
const DEFAULT_OUTGOING_NULLABLE: &str = "all-outgoing-nullable";
const DEFAULT_INCOMING: &str = "all-incoming";
const DEFAULT_EVERYTHING: &str = "everything";

struct Loader<'s> {
    schema: &'s Schema,
    relations: Vec<Relation>,
    subjects: Vec<Subject>,
    not_null_cols: Vec<NotNullColumn>,
    got_relation_defaults: bool,
}

impl ExtractionModel {
    /// `data` is the already include-resolved YAML sequence produced by
    /// `config::load`, an ordered sequence of single-key mappings with
    /// keys in {`subject`, `relations`, `not-null-columns`}.
    pub fn load(schema: &Schema, data: Vec<serde_yaml::Value>) -> Result<ExtractionModel, Error> {
        let mut loader = Loader {
            schema,
            relations: Vec::new(),
            subjects: Vec::new(),
            not_null_cols: Vec::new(),
            got_relation_defaults: false,
        };

        for element in data {
            let (key, list_data) = single_key_list(&element)?;
            match key.as_str() {
                "relations" => {
                    let mut global = std::mem::take(&mut loader.relations);
                    loader.add_relations(&mut global, list_data)?;
                    loader.relations = global;
                }
                "subject" => loader.add_subject(list_data)?,
                "not-null-columns" => loader.add_not_null_cols(list_data)?,
                other => {
                    return Err(Error::new(ErrorType::InvalidConfig {
                        message: format!("unrecognized top-level key \"{}\"", other),
                    }))
                }
            }
        }

        loader.finalize_default_relations();

        Ok(ExtractionModel {
            relations: loader.relations,
            subjects: loader.subjects,
            not_null_cols: loader.not_null_cols,
        })
    }
}

impl<'s> Loader<'s> {
    fn check_table(&self, table_name: &str) -> Result<TableId, Error> {
        self.schema.table_id(table_name).ok_or_else(|| {
            Error::new(ErrorType::UnknownTable {
                table: table_name.to_string(),
            })
        })
    }

    fn check_table_and_column(
        &self,
        table_name: &str,
        column_name: Option<&str>,
    ) -> Result<(TableId, Option<ColumnId>), Error> {
        let table_id = self.check_table(table_name)?;
        let column_id = match column_name {
            None => None,
            Some(name) => Some(self.schema.table(table_id).column_id(name).ok_or_else(|| {
                Error::new(ErrorType::UnknownColumn {
                    table: table_name.to_string(),
                    column: name.to_string(),
                })
            })?),
        };
        Ok((table_id, column_id))
    }

    fn add_table_relation(
        &self,
        target: &mut Vec<Relation>,
        cfg: RelationConfig,
    ) -> Result<(), Error> {
        let table_name = cfg.table.expect("caller checked table is set");
        let column_name = cfg.column.ok_or_else(|| {
            Error::new(ErrorType::InvalidConfig {
                message: format!(
                    "relation on table \"{}\" must specify a column, or use `defaults`",
                    table_name
                ),
            })
        })?;

        let (table_id, column_id) = self.check_table_and_column(&table_name, Some(&column_name))?;
        let column_id = column_id.expect("column_name was Some");
        let table = self.schema.table(table_id);
        let column = &table.columns[column_id];

        let r_type = parse_relation_type(cfg.r_type.as_deref())?;
        let sticky_present = cfg.sticky.is_some();
        let sticky = cfg.sticky.unwrap_or(false);

        if cfg.disabled && r_type == RelationType::Outgoing && column.notnull {
            return Err(Error::new(ErrorType::RelationIntegrity {
                message: format!(
                    "cannot disable outgoing NOT NULL foreign key on column \"{}\".\"{}\" as this would lead to an integrity error",
                    table_name, column_name
                ),
            }));
        }
        if cfg.disabled && sticky_present {
            return Err(Error::new(ErrorType::InvalidConfig {
                message: "the sticky flag is meaningless on disabled relations".to_string(),
            }));
        }

        let foreign_key = table.fk_for_src_column(column_id).ok_or_else(|| {
            Error::new(ErrorType::RelationIntegrity {
                message: format!(
                    "column \"{}\".\"{}\" is not a source column of any foreign key",
                    table_name, column_name
                ),
            })
        })?;

        target.push(Relation::new(
            table_id,
            column_id,
            foreign_key,
            cfg.name,
            cfg.disabled,
            sticky,
            r_type,
            column.notnull,
        ));
        Ok(())
    }

    fn add_default_relations(&mut self, target: &mut Vec<Relation>, defaults: &str) -> Result<(), Error> {
        let want_outgoing_nullables =
            defaults == DEFAULT_OUTGOING_NULLABLE || defaults == DEFAULT_EVERYTHING;
        let want_incoming = defaults == DEFAULT_INCOMING || defaults == DEFAULT_EVERYTHING;

        // NOT NULL outgoing FKs are added unconditionally regardless of
        // which token was named below, since they're mandatory for
        // referential integrity, not a `defaults` choice.
        for table_id in 0..self.schema.tables.len() {
            let table = self.schema.table(table_id);
            for (fk_id, fk) in table.foreign_keys.iter().enumerate() {
                let first_fk_col = fk.src_cols[0];
                let notnull = table.fk_notnull(fk);
                let column = &table.columns[first_fk_col];

                if notnull || (!notnull && want_outgoing_nullables) {
                    target.push(Relation::new(
                        table_id,
                        first_fk_col,
                        fk_id,
                        None,
                        false,
                        false,
                        RelationType::Outgoing,
                        column.notnull,
                    ));
                }
                if want_incoming {
                    target.push(Relation::new(
                        table_id,
                        first_fk_col,
                        fk_id,
                        None,
                        false,
                        false,
                        RelationType::Incoming,
                        column.notnull,
                    ));
                }
            }
        }

        self.got_relation_defaults = true;
        Ok(())
    }

    fn add_relations(&mut self, target: &mut Vec<Relation>, data: Vec<serde_yaml::Value>) -> Result<(), Error> {
        for item in data {
            let cfg: RelationConfig = serde_yaml::from_value(item).map_err(|e| {
                Error::new(ErrorType::InvalidConfig {
                    message: format!("invalid relation entry: {}", e),
                })
            })?;

            match (&cfg.defaults, &cfg.table) {
                (None, None) | (Some(_), Some(_)) => {
                    return Err(Error::new(ErrorType::InvalidConfig {
                        message: "either `defaults` or `table` must be set on a relation entry"
                            .to_string(),
                    }))
                }
                (Some(defaults), None) => {
                    let defaults = defaults.clone();
                    if ![
                        DEFAULT_OUTGOING_NOTNULL,
                        DEFAULT_OUTGOING_NULLABLE,
                        DEFAULT_INCOMING,
                        DEFAULT_EVERYTHING,
                    ]
                    .contains(&defaults.as_str())
                    {
                        return Err(Error::new(ErrorType::InvalidConfig {
                            message: format!("unknown relation defaults token \"{}\"", defaults),
                        }));
                    }
                    self.add_default_relations(target, &defaults)?;
                }
                (None, Some(_)) => self.add_table_relation(target, cfg)?,
            }
        }
        Ok(())
    }

    fn add_tables(&self, target: &mut Vec<TargetTable>, data: Vec<serde_yaml::Value>) -> Result<(), Error> {
        for item in data {
            let cfg: TableConfig = serde_yaml::from_value(item).map_err(|e| {
                Error::new(ErrorType::InvalidConfig {
                    message: format!("invalid table entry: {}", e),
                })
            })?;

            if cfg.column.is_some() && cfg.values.is_none() {
                return Err(Error::new(ErrorType::InvalidConfig {
                    message: "a table with a column must have values".to_string(),
                }));
            }
            if cfg.column.is_none() && cfg.values.is_some() {
                return Err(Error::new(ErrorType::InvalidConfig {
                    message: "a table with values must have a column".to_string(),
                }));
            }

            let (table_id, column_id) =
                self.check_table_and_column(&cfg.table, cfg.column.as_deref())?;

            target.push(TargetTable {
                table: table_id,
                column: column_id,
                values: cfg.values.map(ValuesConfig::into_values),
            });
        }
        Ok(())
    }

    fn add_subject(&mut self, data: Vec<serde_yaml::Value>) -> Result<(), Error> {
        let mut subject = Subject {
            relations: Vec::new(),
            tables: Vec::new(),
        };

        for row in data {
            let (key, list_data) = single_key_list(&row)?;
            match key.as_str() {
                "relations" => {
                    let mut rel = std::mem::take(&mut subject.relations);
                    self.add_relations(&mut rel, list_data)?;
                    subject.relations = rel;
                }
                "tables" => self.add_tables(&mut subject.tables, list_data)?,
                other => {
                    return Err(Error::new(ErrorType::InvalidConfig {
                        message: format!("unrecognized subject key \"{}\"", other),
                    }))
                }
            }
        }

        if subject.tables.is_empty() {
            return Err(Error::new(ErrorType::InvalidConfig {
                message: "a subject must have at least one table".to_string(),
            }));
        }

        self.subjects.push(subject);
        Ok(())
    }

    fn add_not_null_cols(&mut self, data: Vec<serde_yaml::Value>) -> Result<(), Error> {
        for item in data {
            let cfg: NotNullColumnConfig = serde_yaml::from_value(item).map_err(|e| {
                Error::new(ErrorType::InvalidConfig {
                    message: format!("invalid not-null-columns entry: {}", e),
                })
            })?;

            let (table_id, column_id) =
                self.check_table_and_column(&cfg.table, Some(&cfg.column))?;
            let column_id = column_id.expect("column was given");
            let table = self.schema.table(table_id);

            let foreign_key = table.fk_for_src_column(column_id).ok_or_else(|| {
                Error::new(ErrorType::RelationIntegrity {
                    message: format!(
                        "not-null-columns can only be used on foreign keys. Column \"{}\" on table \"{}\" isn't a foreign key.",
                        cfg.column, cfg.table
                    ),
                })
            })?;

            self.not_null_cols.push(NotNullColumn {
                table: table_id,
                column: column_id,
                foreign_key,
            });
        }
        Ok(())
    }

    fn finalize_default_relations(&mut self) {
        if !self.got_relation_defaults {
            let mut relations = std::mem::take(&mut self.relations);
            self.add_default_relations(&mut relations, DEFAULT_OUTGOING_NULLABLE)
                .expect("defaults token is well-known");
            self.relations = relations;
        }

        let mut relations = std::mem::take(&mut self.relations);
        self.add_default_relations(&mut relations, DEFAULT_OUTGOING_NOTNULL)
            .expect("defaults token is well-known");
        self.relations = dedupe_relations(relations);
    }
}

fn parse_relation_type(s: Option<&str>) -> Result<RelationType, Error> {
    match s {
        None | Some("incoming") => Ok(RelationType::Incoming),
        Some("outgoing") => Ok(RelationType::Outgoing),
        Some(other) => Err(Error::new(ErrorType::InvalidConfig {
            message: format!("unknown relation type \"{}\"", other),
        })),
    }
}

fn single_key_list(value: &serde_yaml::Value) -> Result<(String, Vec<serde_yaml::Value>), Error> {
    let mapping = value.as_mapping().ok_or_else(|| {
        Error::new(ErrorType::InvalidConfig {
            message: "expected a single-key mapping".to_string(),
        })
    })?;
    if mapping.len() != 1 {
        return Err(Error::new(ErrorType::InvalidConfig {
            message: format!(
                "expected exactly one key in a config entry, found {}",
                mapping.len()
            ),
        }));
    }
    let (key, list_value) = mapping.iter().next().expect("len checked above");
    let key = key
        .as_str()
        .ok_or_else(|| {
            Error::new(ErrorType::InvalidConfig {
                message: "config keys must be strings".to_string(),
            })
        })?
        .to_string();
    let list = list_value
        .as_sequence()
        .ok_or_else(|| {
            Error::new(ErrorType::InvalidConfig {
                message: format!("value of \"{}\" must be a sequence", key),
            })
        })?
        .clone();
    Ok((key, list))
}
