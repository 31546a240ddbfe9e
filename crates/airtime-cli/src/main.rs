use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "airtime-cli", version, about = "Airtime CLI")]
struct Cli {
    /// SQLite database file (defaults to the configured data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operator management
    Operator {
        #[command(subcommand)]
        action: commands::operator::OperatorAction,
    },
    /// Monitoring sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Archived session records
    History {
        /// Only records of this operator
        #[arg(long)]
        operator: Option<i64>,
    },
    /// Calibration curves and personalization
    Model {
        #[command(subcommand)]
        action: commands::model::ModelAction,
    },
    /// Fill the database with synthetic operators and history
    Seed(commands::seed::SeedArgs),
    /// Run the periodic refresh loop until Ctrl-C
    Serve {
        /// Seconds between refresh cycles (defaults to refresh.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("AIRTIME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let db = cli.db.as_deref();
    let result = match cli.command {
        Commands::Operator { action } => commands::operator::run(db, action),
        Commands::Session { action } => commands::session::run(db, action),
        Commands::History { operator } => commands::history::run(db, operator),
        Commands::Model { action } => commands::model::run(db, action),
        Commands::Seed(args) => commands::seed::run(db, args),
        Commands::Serve { interval } => commands::serve::run(db, interval),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "airtime-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
