//! bq-stats - run a BigQuery query and print the records as JSON.

mod cli;

use bq_stats::config::Config;
use bq_stats::runner::Record;
use bq_stats::{logging, runner, Result, StatsError};
use cli::{Cli, OutputFormat};
use std::io::Write;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    // Precedence: CLI flags, then the config file, then the environment
    cli.apply_overrides(&mut config);
    config.bigquery.apply_env_defaults();

    let query = cli.read_query()?;
    let runner = runner::init(&config).await?;
    let records = runner.run_query(&query, cli.parameters()).await?;

    print_records(&records, cli.output)
}

fn print_records(records: &[Record], format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, records).map_err(encode_error)?;
            writeln!(out).map_err(write_error)?;
        }
        OutputFormat::Jsonl => {
            for record in records {
                serde_json::to_writer(&mut out, record).map_err(encode_error)?;
                writeln!(out).map_err(write_error)?;
            }
        }
    }

    out.flush().map_err(write_error)
}

fn encode_error(e: serde_json::Error) -> StatsError {
    StatsError::internal(format!("Failed to encode records: {e}"))
}

fn write_error(e: std::io::Error) -> StatsError {
    StatsError::internal(format!("Failed to write output: {e}"))
}
