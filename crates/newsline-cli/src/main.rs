#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use newsline_core::config::{NewslineConfig, load_config};
use newsline_core::error::ErrorCode;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "newsline: stable, deduplicated news feed ordering",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output (shorthand for `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Project root holding `.newsline/` (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Order(cmd::order::OrderArgs),

    Keys(cmd::keys::KeysArgs),

    #[command(
        about = "Inspect or reset sequence state",
        after_help = "EXAMPLES:\n    newsline state show\n    newsline state reset"
    )]
    State {
        #[command(subcommand)]
        command: cmd::state::StateCommand,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("NEWSLINE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "newsline=debug,newsline_core=debug,info"
        } else {
            "warn"
        })
    });

    let format = env::var("NEWSLINE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

/// Load project config, reporting parse failures with their error code.
fn load_project_config(project_root: &Path, output: OutputMode) -> anyhow::Result<NewslineConfig> {
    match load_config(project_root) {
        Ok(config) => Ok(config),
        Err(err) => {
            render_error(output, &CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}")))?;
            Err(err)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };

    // Config errors are reported before the configured format is known.
    let early_output = resolve_output_mode(cli.format, cli.json, None);
    let config = load_project_config(&project_root, early_output)?;
    let output = resolve_output_mode(cli.format, cli.json, config.output.format.as_deref());
    debug!(root = %project_root.display(), ?output, "newsline starting");

    match &cli.command {
        Commands::Order(args) => cmd::order::run_order(args, &config, output, &project_root),
        Commands::Keys(args) => cmd::keys::run_keys(args, &config, output, &project_root),
        Commands::State { command } => {
            cmd::state::run_state(command, &config, output, &project_root)
        }
    }
}
