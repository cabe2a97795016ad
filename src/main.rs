//! `tabload`: load a CSV or XLSX file into a SQLite table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tabload::discovery::{discover_input, resolve_output_path};
use tabload::ingestion::SchemaPolicy;
use tabload::session::{DEFAULT_TABLE, ImportOptions, import_file};
use tabload::types::DEFAULT_BATCH_SIZE;
use tracing::{Level, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(about = "Load a CSV or XLSX file into a SQLite table with full-text search")]
#[command(version)]
struct Cli {
    /// Input file (.csv or .xlsx). Defaults to the first one found in the working directory
    input: Option<PathBuf>,

    /// Output database file or directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target table name
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Field delimiter (single character, or "tab"). Sniffed when omitted
    #[arg(short, long, value_parser = parse_delimiter)]
    delimiter: Option<u8>,

    /// Rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Fail when a batch's columns differ from the table's
    #[arg(long)]
    strict_schema: bool,

    /// Skip index building
    #[arg(long)]
    no_indexes: bool,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the import report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "tab" | "\\t" => Ok(b'\t'),
        _ => match s.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(format!("delimiter must be a single ASCII character, got {s:?}")),
        },
    }
}

fn init_tracing(verbose: u8, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tabload.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_dir.as_ref());

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "cannot read working directory");
            return ExitCode::FAILURE;
        }
    };

    let input = match cli.input {
        Some(path) => path,
        None => match discover_input(&cwd) {
            Ok(path) => path,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
    };
    let output = resolve_output_path(cli.output.as_deref(), &cwd);

    let options = ImportOptions {
        table_name: cli.table,
        delimiter: cli.delimiter,
        batch_size: cli.batch_size,
        schema_policy: if cli.strict_schema {
            SchemaPolicy::Strict
        } else {
            SchemaPolicy::Warn
        },
        build_indexes: !cli.no_indexes,
        ..Default::default()
    };

    match import_file(&input, &output, &options) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        error!(error = %e, "cannot serialize report");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
