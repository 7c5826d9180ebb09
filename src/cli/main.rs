use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use postcode_locator::config::Config;
use postcode_locator::pipeline::{self, Locator};

#[derive(Parser, Debug)]
#[command(
    name = "postcode-locator",
    version,
    about = "Print the postal code each JPEG photo was taken in, based on its EXIF GPS tags"
)]
struct Cli {
    /// Image files, directories or glob patterns to process
    #[arg(value_name = "PATH")]
    paths: Vec<String>,

    /// Path to config file (default: config.json in the working directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Keep the location cache in memory only (neither read nor written)
    #[arg(long)]
    no_cache: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Handle --init
    if cli.init {
        return match init_config(cli.config.as_deref()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("ERROR: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    // Without a config there are no sentinel tags and no cache path.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: Settings file cannot be loaded: {e:#}");
            eprintln!("Run `postcode-locator --init` to create a default config.json.");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config, cli.verbose) {
        eprintln!("ERROR: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    if cli.paths.is_empty() {
        anyhow::bail!("No input files specified. Use --help for usage.");
    }

    log::info!("Started application");
    let mut locator = Locator::from_config(config, !cli.no_cache)?;
    log::info!("Location cache holds {} coordinate(s)", locator.cache().len());

    let print_lines = !cli.json;
    let reports = locator
        .run(&cli.paths, |report| {
            if print_lines {
                println!("{}", report.line(&config.tags));
            }
        })
        .await;

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| json_report(r, config))
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let total = reports.len();
    let resolved = reports.iter().filter(|r| r.outcome.is_resolved()).count();
    log::info!(
        "Done: {resolved} resolved, {} unresolved out of {total} files",
        total - resolved
    );

    Ok(())
}

fn json_report(report: &pipeline::FileReport, config: &Config) -> serde_json::Value {
    serde_json::json!({
        "path": report.path.display().to_string(),
        "result": report.outcome.label(&config.tags),
        "outcome": report.outcome.kind(),
    })
}

fn init_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = Config::default();
    config.save(path)?;
    let save_path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("Default config written to {}", save_path.display());
    Ok(())
}

/// Set up logging: config level (or debug with `--verbose`), `RUST_LOG` on
/// top, written to the configured log file or stderr.
fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.log_level()
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    match &config.logging.filename {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.format_timestamp(None);
        }
    }

    builder.init();
    Ok(())
}
