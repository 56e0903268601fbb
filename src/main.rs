mod app;
mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::app::{run_history, run_live, run_prefs};
use crate::cli::{Cli, Commands, OutputFormat};
use ratewatch::error::Error;
use ratewatch::prefs::{DisplayPreference, FileStore};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = run(cli);

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        println!();
        return Ok(());
    };

    let mut store = FileStore::open(&cli.prefs)
        .with_context(|| format!("Opening preference store {}", cli.prefs.display()))?;
    match command {
        Commands::Live(live) => run_live(live, DisplayPreference::load(&store)),
        Commands::History(history) => run_history(history, DisplayPreference::load(&store)),
        Commands::Prefs { action } => run_prefs(&mut store, action, OutputFormat::Text),
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: session invalid, 3: bad range, 4: API unreachable or failing, 1: other
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::Unauthorized => 2,
                Error::InvalidRange { .. } => 3,
                Error::Transport(_) | Error::Status(_) => 4,
                _ => 1,
            };
        }
    }
    1
}
