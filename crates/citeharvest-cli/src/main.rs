use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use citeharvest_ai::{ChatClassifier, classify_table};
use citeharvest_core::{
    AppConfig, CoreError, DataLayout, Dataset, DatasetPaths, DatasetStatus, ExitCode, PaperTable,
};
use citeharvest_science::{FallbackFetcher, PrimaryFetcher, RunReport};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "citeharvest",
    about = "Enrich conference paper tables with citation counts",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/citeharvest/config.toml,
    /// or CITEHARVEST_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting CITEHARVEST_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Primary pass: look up every unresolved row on Semantic Scholar.
    Fetch {
        /// Only this dataset (`iclr` or `iclr.csv`).
        #[arg(long)]
        file: Option<String>,
    },

    /// Fallback pass: retry queued titles against OpenAlex.
    Fallback {
        #[arg(long)]
        file: Option<String>,
    },

    /// Assign a topic category to every unclassified row.
    Classify {
        #[arg(long)]
        file: Option<String>,
    },

    /// Show resolution state and queue consistency per dataset.
    Status,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file path.
    Path,
    /// Write the default configuration to the config file path.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(exit_code_for(&err) as i32);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let json_output = cli.json || std::env::var("CITEHARVEST_JSON").as_deref() == Ok("1");

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);

    match cli.command {
        Commands::Config { action } => config_command(&action, &config_path)?,

        Commands::Fetch { file } => {
            let (config, layout) = load_config(&config_path)?;
            let venues = Arc::new(config.load_venues()?);
            let fetcher = PrimaryFetcher::from_config(&config, venues)?;
            let datasets = open_datasets(
                &config,
                select(&layout, file.as_deref(), || layout.datasets())?,
            )?;

            let mut reports = Vec::new();
            for dataset in &datasets {
                reports.push(fetcher.run(dataset).await?);
            }
            print_reports(&reports, json_output, start)?;
        }

        Commands::Fallback { file } => {
            let (config, layout) = load_config(&config_path)?;
            let venues = Arc::new(config.load_venues()?);
            let fetcher = FallbackFetcher::from_config(&config, venues)?;
            let datasets = open_datasets(
                &config,
                select(&layout, file.as_deref(), || layout.queued_datasets())?,
            )?;

            let mut reports = Vec::new();
            for dataset in &datasets {
                reports.push(fetcher.run(dataset).await?);
            }
            print_reports(&reports, json_output, start)?;
        }

        Commands::Classify { file } => {
            let (config, layout) = load_config(&config_path)?;
            let classifier = ChatClassifier::new(&config.classify)?;
            let suffix = config.classify.file_suffix.clone();
            let selected = select(&layout, file.as_deref(), || {
                layout.datasets_with_suffix(&suffix)
            })?;

            let mut tables = Vec::new();
            for paths in &selected {
                tables.push(PaperTable::load(&paths.table, config.years)?);
            }
            if tables.is_empty() {
                warn!(suffix = %suffix, dir = %layout.data_dir().display(), "no files to classify");
            }

            let mut reports = Vec::new();
            for table in &mut tables {
                reports.push(classify_table(table, &classifier, &config.classify).await?);
            }
            print_reports(&reports, json_output, start)?;
        }

        Commands::Status => {
            let (config, layout) = load_config(&config_path)?;
            let datasets = open_datasets(&config, layout.datasets()?)?;
            let statuses = datasets.iter().map(Dataset::status).collect::<Vec<_>>();
            print_statuses(&statuses, json_output, start)?;
        }
    }

    Ok(())
}

/// Load and validate; configuration errors stop the run before any request.
fn load_config(path: &Path) -> Result<(AppConfig, DataLayout)> {
    let config =
        AppConfig::load_from(path).with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;
    let layout = DataLayout::from_config(&config.paths);
    Ok((config, layout))
}

/// One named dataset, or everything `all` lists.
fn select(
    layout: &DataLayout,
    file: Option<&str>,
    all: impl FnOnce() -> citeharvest_core::Result<Vec<DatasetPaths>>,
) -> Result<Vec<DatasetPaths>> {
    match file {
        Some(name) => {
            let paths = layout.dataset(name);
            if !paths.table.exists() {
                return Err(CoreError::FileNotFound(paths.table.display().to_string()).into());
            }
            Ok(vec![paths])
        }
        None => Ok(all()?),
    }
}

/// Every dataset is opened (and its columns checked) before any request goes out.
fn open_datasets(config: &AppConfig, selected: Vec<DatasetPaths>) -> Result<Vec<Dataset>> {
    let datasets = selected
        .iter()
        .map(|paths| Dataset::open(paths, config.years))
        .collect::<citeharvest_core::Result<Vec<_>>>()?;
    info!(count = datasets.len(), "datasets opened");
    Ok(datasets)
}

fn config_command(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = AppConfig::load_from(path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save_to(path)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

// ─── Output ──────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn duration_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn print_reports(reports: &[RunReport], json_output: bool, start: Instant) -> Result<()> {
    if json_output {
        return print_json(&serde_json::json!({
            "status": "ok",
            "data": reports,
            "meta": {"duration_ms": duration_ms(start)},
        }));
    }

    if reports.is_empty() {
        println!("Nothing to do.");
    }
    for report in reports {
        println!("{report}");
        for err in &report.errors {
            println!("    {err}");
        }
    }
    Ok(())
}

fn print_statuses(statuses: &[DatasetStatus], json_output: bool, start: Instant) -> Result<()> {
    if json_output {
        let data = statuses
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "rows": s.rows,
                    "resolved": s.resolved,
                    "unresolved": s.unresolved,
                    "queued": s.queued,
                    "invariant_holds": s.invariant_holds(),
                    "unqueued": s.unqueued,
                    "stale": s.stale,
                    "inconsistent": s.inconsistent,
                })
            })
            .collect::<Vec<_>>();
        return print_json(&serde_json::json!({
            "status": "ok",
            "data": data,
            "meta": {"duration_ms": duration_ms(start)},
        }));
    }

    println!(
        "{:<24} {:>7} {:>9} {:>11} {:>7}  queue",
        "dataset", "rows", "resolved", "unresolved", "queued"
    );
    for s in statuses {
        let state = if s.invariant_holds() {
            "ok".to_string()
        } else {
            format!(
                "{} unqueued, {} stale, {} inconsistent",
                s.unqueued.len(),
                s.stale.len(),
                s.inconsistent.len()
            )
        };
        println!(
            "{:<24} {:>7} {:>9} {:>11} {:>7}  {state}",
            s.name, s.rows, s.resolved, s.unresolved, s.queued
        );
    }
    Ok(())
}

// ─── Exit codes ──────────────────────────────────────────────────────────────

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return if core.is_configuration() {
                ExitCode::ConfigError
            } else {
                ExitCode::PersistenceError
            };
        }
        if let Some(citeharvest_ai::ClassifyError::MissingApiKey(_)) =
            cause.downcast_ref::<citeharvest_ai::ClassifyError>()
        {
            return ExitCode::ConfigError;
        }
    }
    ExitCode::GeneralError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands_and_global_flags() {
        let cli = Cli::try_parse_from(["citeharvest", "-vv", "fetch", "--file", "iclr"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Fetch { file: Some(ref f) } if f == "iclr"));

        let cli = Cli::try_parse_from(["citeharvest", "status", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn store_errors_map_to_exit_codes() {
        let config: anyhow::Error = CoreError::Config("bad".to_string()).into();
        assert!(matches!(exit_code_for(&config), ExitCode::ConfigError));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let wrapped: anyhow::Error =
            citeharvest_science::HarvestError::Store(CoreError::Io(io)).into();
        assert!(matches!(exit_code_for(&wrapped), ExitCode::PersistenceError));

        let other = anyhow::anyhow!("something else");
        assert!(matches!(exit_code_for(&other), ExitCode::GeneralError));
    }
}
