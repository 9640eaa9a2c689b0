mod commands;
mod error;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::*;
use error::CliError;
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "vtrack")]
#[command(about = "Vehicle tracker database tooling", version)]
struct Cli {
    /// Directory holding migration files (overrides MIGRATIONS_DIR)
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Database connectivity
    Db {
        #[command(subcommand)]
        db_command: DbCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create a new migration
    Create {
        /// Migration name
        name: String,
    },

    /// Run pending migrations
    Run,

    /// Show migration status
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Verify the database server is reachable
    Check,
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let dir = cli.migrations_dir;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Create { name } => migrate::create(&name, dir).await,
            MigrateCommands::Run => migrate::run(dir).await,
            MigrateCommands::Status { json } => migrate::status(dir, json).await,
        },
        Commands::Db { db_command } => match db_command {
            DbCommands::Check => db::check().await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: cli.log_level.clone(),
        json_format: cli.json_logs,
    };
    if let Err(e) = logging::init_logging(&logging) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    if let Err(e) = dispatch(cli).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("❌ {}", e);
        if let Some(hint) = e.hint() {
            eprintln!("   {}", hint);
        }
        std::process::exit(1);
    }
}
