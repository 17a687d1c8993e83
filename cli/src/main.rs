//! Quill binary: load config, initialize logging, run the orchestrator until
//! SIGINT/SIGTERM. Subcommands cover operator tooling (DLQ inspection and
//! manual retry).

mod dlq;
mod logging;
mod orchestrator;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version)]
#[command(about = "Quill: AI assistant for an Outline wiki workspace")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "PATH", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or drain the dead-letter queue
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
}

#[derive(Subcommand, Debug)]
enum DlqAction {
    /// List entries
    List,
    /// Re-enqueue one entry (resumes from its checkpoint)
    Retry { id: i64 },
    /// Drop one entry for good
    Delete { id: i64 },
}

fn main() {
    // .env is a dev convenience; real deployments set the environment directly.
    let _ = dotenv::dotenv();

    let args = Args::parse();
    let config = match config::Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error ({}): {e}", args.config.display());
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("runtime error: {e}");
            std::process::exit(1);
        }
    };

    let result = match args.cmd {
        Some(Command::Dlq { action }) => runtime.block_on(async {
            match action {
                DlqAction::List => dlq::list(&config).await,
                DlqAction::Retry { id } => dlq::retry(&config, id).await,
                DlqAction::Delete { id } => dlq::delete(&config, id).await,
            }
        }),
        None => {
            let _guard = logging::init(&config.logging);
            runtime.block_on(orchestrator::run(config))
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
