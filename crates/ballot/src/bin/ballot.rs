//! # ballot
//!
//! ```bash
//! # Menu-driven session
//! ballot
//!
//! # One batch, no prompts
//! ballot run --backend process --voters 200 --observers 5 --candidates Ada,Grace --seed 7
//!
//! # Aggregate performance_data.txt into a report
//! ballot --data-dir runs report
//! ```
//!
//! Ctrl-C cancels the session, tears down the IPC objects and exits 0.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ballot::telemetry;
use ballot::{Backend, BallotConfig, Console, Coordinator, RunError, RunRequest};
use ballot_core::constants::{DEFAULT_OBSERVERS, DEFAULT_VOTERS};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ballot")]
#[command(about = "Readers-writers vote tally over threads or processes")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for logs, performance data and reports
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Menu-driven session (default)
    Interactive,

    /// Run one simulated batch
    Run {
        /// Actor backend
        #[arg(long, value_enum, default_value_t = Backend::Thread)]
        backend: Backend,

        /// Number of voters (writers)
        #[arg(long, default_value_t = DEFAULT_VOTERS as i64, allow_negative_numbers = true)]
        voters: i64,

        /// Number of observers (readers)
        #[arg(long, default_value_t = DEFAULT_OBSERVERS as i64, allow_negative_numbers = true)]
        observers: i64,

        /// Comma-separated candidate names
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,

        /// Plan seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write the performance report
    Report,
}

fn load_config(args: &Args) -> Option<BallotConfig> {
    let mut config = match &args.config {
        Some(path) => match BallotConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "invalid configuration");
                eprintln!("✗ {err}");
                return None;
            }
        },
        None => BallotConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }
    Some(config)
}

fn install_interrupt(coordinator: &Arc<Coordinator>) {
    let coordinator = Arc::clone(coordinator);
    let installed = ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        coordinator.cancel_token().cancel();
        if let Err(err) = coordinator.shutdown() {
            warn!(%err, "teardown after interrupt failed");
        }
        std::process::exit(0);
    });
    if let Err(err) = installed {
        warn!(%err, "interrupt handler not installed");
    }
}

fn execute(coordinator: &Coordinator, command: Command) -> Result<(), RunError> {
    match command {
        Command::Interactive => {
            let stdin = io::stdin();
            let mut console = Console::new(coordinator, stdin.lock(), io::stdout());
            console.run()
        }
        Command::Run {
            backend,
            voters,
            observers,
            candidates,
            seed,
        } => {
            let mut request = RunRequest::new(backend);
            if !candidates.is_empty() {
                request.candidates = candidates;
            }
            request.writers = voters;
            request.readers = observers;
            request.seed = seed;

            let run = request.sanitize();
            for adjustment in &run.adjustments {
                println!("{adjustment}");
            }
            let report = coordinator.run(run)?;
            println!("{report}");
            Ok(())
        }
        Command::Report => {
            let (summary, path) = coordinator.report()?;
            println!("{summary}");
            println!("Performance report saved to: {}", path.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init(args.verbose);

    let Some(config) = load_config(&args) else {
        return ExitCode::FAILURE;
    };

    let coordinator = match Coordinator::new(config) {
        Ok(coordinator) => Arc::new(coordinator),
        Err(err) => {
            error!(%err, "failed to initialize session resources");
            eprintln!("✗ {err}");
            return ExitCode::FAILURE;
        }
    };
    install_interrupt(&coordinator);

    let result = execute(&coordinator, args.command.unwrap_or(Command::Interactive));
    let teardown = coordinator.shutdown();

    match (result, teardown) {
        (Ok(()), Ok(())) => ExitCode::SUCCESS,
        (Err(RunError::Shutdown), _) => ExitCode::SUCCESS,
        (Err(err), _) => {
            error!(%err, fatal = err.is_fatal(), "ballot failed");
            eprintln!("✗ {err}");
            ExitCode::FAILURE
        }
        (Ok(()), Err(err)) => {
            warn!(%err, "teardown failed");
            ExitCode::SUCCESS
        }
    }
}
