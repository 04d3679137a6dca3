//! `bedtime`: interactive bedtime story generator.
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! bedtime --config bedtime.toml
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use bedtime_cli::{client_from_config, run_session, CliError, Console, Storyteller};
use bedtime_core::{BedtimeConfig, BedtimeError, SessionState};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Genre-aware bedtime stories for children ages 5-10.
#[derive(Debug, Parser)]
#[command(name = "bedtime", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "BEDTIME_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => BedtimeConfig::default(),
    };
    init_tracing(&config.general.log_level, config.general.log_json);

    let client = client_from_config(&config.llm)?;
    let mut storyteller = Storyteller::new(client, &config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let mut session = SessionState::new();
    let mut console = Console::new(io::stdin().lock(), io::stdout().lock());
    runtime.block_on(run_session(&mut storyteller, &mut session, &mut console))?;
    Ok(())
}

fn load_config(path: &Path) -> Result<BedtimeConfig, CliError> {
    BedtimeConfig::from_file(path).map_err(|err| match err {
        BedtimeError::Io(io) => {
            CliError::Core(BedtimeError::Config(format!("cannot read {}: {io}", path.display())))
        }
        other => CliError::Core(other),
    })
}

/// Logs go to stderr; stdout carries the stories.
fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
