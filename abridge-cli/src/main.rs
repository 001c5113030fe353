//! `abridge`: extract a referentially-consistent subset of a database and
//! emit it as INSERT/UPDATE statements against a sibling database or a SQL
//! script. See `abridge-dump-relations` (bin/dump_relations.rs) for a
//! helper that seeds a config file from the source schema's FK graph.

use abridge::driver::{self, Dialect, DialectKind};
use abridge::error::{Error, ErrorType};
use abridge::extraction_model::ExtractionModel;
use abridge::extractor::{Extractor, Verbosity};
use abridge::generator::{Generator, Statement};
use abridge::schema::Schema;
use abridge::sink::{LiveDbSink, Sink, SqlScriptSink};
use abridge::{config, driver::SqliteDriver};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Extract a referentially-consistent subset of a database.
#[derive(Parser)]
#[command(name = "abridge")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Extraction config YAML, describing subjects and relations.
    config_path: PathBuf,

    /// Source database URL (sqlite:///<path> or postgresql://...).
    src_url: String,

    /// Write to a live destination database (must share the source's dialect).
    #[arg(short = 'u', long = "dest-url", conflicts_with_all = ["dest_file", "explain"])]
    dest_url: Option<String>,

    /// Write a SQL script; "-" means standard output.
    #[arg(short = 'f', long = "dest-file", conflicts_with_all = ["dest_url", "explain"])]
    dest_file: Option<String>,

    /// Print the extraction trail and exit without generating output.
    #[arg(short = 'e', long = "explain")]
    explain: bool,

    /// Suppress progress output.
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    quiet: bool,

    /// Print per-work-item progress.
    #[arg(short = 'v', long = "verbose", conflicts_with = "quiet")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // `try_parse` rather than `parse`: clap's own process::exit(2) on a
    // parse failure would bypass our own "1 = invalid usage" exit code.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };
    let enable_color = atty::is(atty::Stream::Stderr);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format(enable_color));
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// 1 for invalid usage / config / schema-resolution failures, 2 for a
/// driver or I/O failure surfaced from the database itself. 0 means
/// success.
fn exit_code_for(e: &Error) -> u8 {
    match &e.error_type {
        ErrorType::Driver { .. } => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    validate_flags(&cli)?;

    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    let config_data = config::load(&cli.config_path)?;
    let src_dialect = driver::dialect_for_url(&cli.src_url)?;

    // Progress goes to stderr throughout, not stdout: `-f -` writes the
    // generated SQL script to stdout, and that stream must stay clean.
    if verbosity >= Verbosity::Normal {
        eprintln!("{} {}", "connecting to".cyan(), cli.src_url);
    }

    let (schema, src_conn) = connect_source(&cli.src_url).await?;
    let model = ExtractionModel::load(&schema, config_data)?;

    if verbosity >= Verbosity::Normal {
        eprintln!(
            "{} {} subject(s), {} relation(s), {} not-null override(s)",
            "loaded".cyan(),
            model.subjects.len(),
            model.relations.len(),
            model.not_null_cols.len()
        );
    }

    let src_driver = SqliteDriver::new(src_conn);
    let mut extractor = Extractor::new(&schema, &model, src_driver, cli.explain, verbosity);
    extractor.launch().await?;

    if cli.explain {
        return Ok(());
    }

    let generator = Generator::new(&schema, &model);
    let statements = generator.generate(extractor.results())?;

    if verbosity >= Verbosity::Normal {
        eprintln!("{} {} statement(s)", "generated".cyan(), statements.len());
    }

    let mut sink = build_sink(&cli, src_dialect.as_ref()).await?;
    sink.begin().await?;

    let write_result = write_statements(sink.as_mut(), &schema, &statements).await;
    match write_result {
        Ok(()) => {
            sink.commit().await?;
        }
        Err(e) => {
            let _ = sink.rollback().await;
            return Err(e);
        }
    }

    sink.finish().await
}

fn validate_flags(cli: &Cli) -> Result<(), Error> {
    if !cli.explain && cli.dest_url.is_none() && cli.dest_file.is_none() {
        return Err(Error::new(ErrorType::InvalidConfig {
            message: "one of -u/--dest-url or -f/--dest-file is required unless -e/--explain is given".to_string(),
        }));
    }
    Ok(())
}

async fn connect_source(url: &str) -> Result<(Schema, libsql::Connection), Error> {
    if !url.starts_with("sqlite:") {
        return Err(Error::new(ErrorType::DatabaseUrl {
            message: "only sqlite:// sources can be introspected and fetched from in this build; \
                      postgresql:// is accepted as a destination for SQL-script generation only"
                .to_string(),
        }));
    }
    let conn = driver::open_sqlite(url).await?;
    let schema = abridge::schema::sqlite::introspect(&conn).await?;
    Ok((schema, conn))
}

async fn build_sink(cli: &Cli, src_dialect: &dyn Dialect) -> Result<Box<dyn Sink>, Error> {
    if let Some(url) = &cli.dest_url {
        let dst_dialect = driver::dialect_for_url(url)?;
        if dst_dialect.kind() != src_dialect.kind() {
            return Err(Error::new(ErrorType::DatabaseUrl {
                message: "the destination database must be the same dialect as the source".to_string(),
            }));
        }
        return match dst_dialect.kind() {
            DialectKind::Sqlite => {
                let conn = driver::open_sqlite(url).await?;
                Ok(Box::new(LiveDbSink::new(SqliteDriver::new(conn))))
            }
            DialectKind::Postgresql => Err(Error::new(ErrorType::DatabaseUrl {
                message: "live PostgreSQL destinations aren't supported; pass -f to emit a SQL script instead"
                    .to_string(),
            })),
        };
    }

    let file = cli.dest_file.as_ref().expect("validate_flags checked one is set");
    if !src_dialect.can_generate_sql() {
        return Err(Error::new(ErrorType::DatabaseUrl {
            message: "the source dialect cannot generate a SQL script".to_string(),
        }));
    }
    let writer: Box<dyn Write + Send> = if file == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(file).map_err(|e| {
            Error::new(ErrorType::Driver {
                message: format!("couldn't create \"{}\": {}", file, e),
            })
        })?)
    };
    // A fresh dialect instance, not a clone of `src_dialect`: dialects are
    // stateless, and the sink needs to own one.
    let dialect = driver::dialect_for_url(&cli.src_url)?;
    Ok(Box::new(SqlScriptSink::new(writer, dialect)))
}

async fn write_statements(sink: &mut dyn Sink, schema: &Schema, statements: &[Statement]) -> Result<(), Error> {
    for statement in statements {
        match statement {
            Statement::Insert(stmt) => sink.insert_row(schema, stmt).await?,
            Statement::Update(stmt) => sink.update_row(schema, stmt).await?,
        }
    }
    Ok(())
}
