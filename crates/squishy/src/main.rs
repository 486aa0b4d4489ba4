use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum, ValueHint};
use squishy_flatten::{flatten, FlattenConfig, FlattenError, FlattenReport};
use squishy_ir::{Module, PrettyPrint};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The flattened module as JSON, loadable again
    Json,
    /// Human-readable IR listing
    Ir,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Squishy - flatten a module into its root function",
    long_about = None
)]
struct Args {
    /// Module to flatten (JSON format)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Where to write the flattened module; stdout when absent
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Json)]
    emit: Emit,

    /// Root function, overriding the config file and the module's entry
    #[arg(long)]
    root: Option<String>,

    /// Engine configuration file (JSON format)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<FlattenConfig> {
    let config = match &args.config {
        Some(path) => FlattenConfig::from_file(path)?,
        None => FlattenConfig::default(),
    };
    Ok(match &args.root {
        Some(root) => config.with_root(root.clone()),
        None => config,
    })
}

fn load_module(path: &Path) -> Result<Module> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Error reading file '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse module '{}'", path.display()))
}

fn render(module: &Module, emit: Emit) -> Result<String> {
    match emit {
        Emit::Json => serde_json::to_string_pretty(module).context("Failed to serialize module"),
        Emit::Ir => Ok(module.pretty_print(0)),
    }
}

fn run(args: &Args) -> Result<FlattenReport> {
    let config = load_config(args)?;
    let mut module = load_module(&args.input)?;

    let report = flatten(&mut module, &config).context("Flattening failed")?;
    let rendered = render(&module, args.emit)?;

    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Error writing file '{}'", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(report)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(report) => {
            info!(
                "flattened '{}' into '{}'",
                args.input.display(),
                report.root
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            if let Some(FlattenError::MalformedModule { dump, .. }) = err.downcast_ref::<FlattenError>() {
                eprintln!("\n=== Malformed module ===\n{dump}");
            }
            ExitCode::FAILURE
        }
    }
}
