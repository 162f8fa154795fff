//! revtrail CLI
//!
//! Record and inspect a SQLite-backed history log from the shell.

use clap::{Parser, Subcommand};
use revtrail_core::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "revtrail")]
#[command(about = "revtrail - append-only diff history", long_about = None)]
struct Cli {
    /// History database file
    #[arg(long, global = true, default_value = ".revtrail/history.db")]
    db: String,

    /// Emit operation logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record an update (or a delete, when --after is omitted)
    Record(commands::record::RecordArgs),
    /// Print raw history records as JSON
    Log(commands::query::LogArgs),
    /// Print an entity as it was before a given version
    Show(commands::query::ShowArgs),
    /// Print one change summary per record
    Summary(commands::query::SummaryArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        init(Profile::Development);
    }

    let result = match cli.command {
        Commands::Record(args) => commands::record::execute(&cli.db, args).await,
        Commands::Log(args) => commands::query::execute_log(&cli.db, args).await,
        Commands::Show(args) => commands::query::execute_show(&cli.db, args).await,
        Commands::Summary(args) => commands::query::execute_summary(&cli.db, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
