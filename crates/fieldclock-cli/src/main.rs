use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fieldclock", version, about = "Field work day tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the configured location backend and print notifications as JSON lines
    Track(commands::track::TrackArgs),
    /// One-shot position with IP fallback (does not change the state)
    Locate,
    /// Feed one location fix
    Fix(commands::input::FixArgs),
    /// Send a manual command (e.g. select-work, confirm-at-customer)
    Cmd {
        /// Command name
        command: String,
    },
    /// Add an event to today's log without changing the state
    Note {
        /// Event type (default: MANUAL)
        #[arg(default_value = "MANUAL")]
        event_type: String,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
    },
    /// Print the tracker status as JSON
    Status,
    /// Print per-phase minutes including the running segment
    Timers,
    /// Day records
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Track(args) => commands::track::run(args),
        Commands::Locate => commands::track::locate(),
        Commands::Fix(args) => commands::input::fix(args),
        Commands::Cmd { command } => commands::input::command(&command),
        Commands::Note { event_type, note } => commands::input::note(&event_type, note),
        Commands::Status => commands::query::status(),
        Commands::Timers => commands::query::timers(),
        Commands::Session { action } => commands::session::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_logging() {
    let debug_enabled = std::env::var("FIELDCLOCK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
