//! `abridge-dump-relations`: prints every foreign-key relation
//! discoverable in a source schema as YAML, in the same shape the
//! extraction config's `relations:` key expects, so it can be pasted in
//! directly as a seed.

use abridge::driver;
use abridge::error::{Error, ErrorType};
use abridge::schema::RelationType;
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "abridge-dump-relations")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Source database URL (sqlite:///<path>).
    url: String,
}

#[derive(Serialize)]
struct RelationEntry {
    table: String,
    column: String,
    #[serde(rename = "type")]
    r_type: &'static str,
}

#[derive(Serialize)]
struct RelationsWrapper {
    relations: Vec<RelationEntry>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format(atty::is(atty::Stream::Stderr)));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    if !cli.url.starts_with("sqlite:") {
        return Err(Error::new(ErrorType::DatabaseUrl {
            message: "only sqlite:// sources can be introspected in this build".to_string(),
        }));
    }

    let conn = driver::open_sqlite(&cli.url).await?;
    let schema = abridge::schema::sqlite::introspect(&conn).await?;

    let mut entries = Vec::new();
    for relation in schema.relations() {
        let owner = schema.table(relation.fk_owner);
        let fk = &owner.foreign_keys[relation.fk];
        entries.push(RelationEntry {
            table: owner.name.clone(),
            column: owner.columns[fk.src_cols[0]].name.clone(),
            r_type: match relation.r_type {
                RelationType::Outgoing => "outgoing",
                RelationType::Incoming => "incoming",
            },
        });
    }

    let doc = vec![RelationsWrapper { relations: entries }];
    let yaml = serde_yaml::to_string(&doc).map_err(|e| {
        Error::new(ErrorType::Driver {
            message: format!("couldn't render relations as YAML: {}", e),
        })
    })?;
    print!("{}", yaml);
    Ok(())
}
