pub mod alert;
pub mod audio;
pub mod badges;
pub mod blocker;
mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod presence;
pub mod session;
pub mod settings;
mod utils;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use db::Database;
use settings::SettingsStore;

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) settings: SettingsStore,
    pub(crate) debug_mode: bool,
}

#[derive(Parser)]
#[command(name = "focusbuddy")]
#[command(about = "Camera-backed focus sessions", long_about = None)]
struct Cli {
    /// Directory holding settings.json and the session database
    #[arg(long, env = "FOCUSBUDDY_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a focus session in the foreground (Ctrl-C requests a stop)
    Start {
        /// Session length; defaults to session_duration_minutes
        #[arg(short, long)]
        minutes: Option<u64>,
        /// Refuse to stop before the lock window has been served
        #[arg(long)]
        hardcore: bool,
    },
    /// Show streak, totals and the last seven days
    Stats,
    /// List finished sessions
    History {
        /// Only sessions started within the last N days
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// List earned and locked badges
    Badges,
    /// Attach a journal entry to a finished session (empty text clears it)
    Journal { session_id: String, text: String },
    /// Write all sessions to a JSON file
    Export { path: PathBuf },
    /// Delete all sessions and badges
    ResetStats,
    /// Save the current camera frame as the empty-desk baseline
    Calibrate,
    /// Show settings, or set one with a dotted key (e.g. camera.sensitivity high)
    Config {
        key: Option<String>,
        /// JSON value; bare words are taken as strings
        value: Option<String>,
    },
    /// Remove a site block left behind by a crashed session
    Unblock,
}

fn data_dir(cli_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = cli_override {
        return Ok(dir);
    }
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Failed to get local data dir"))?;
    path.push("focusbuddy");
    Ok(path)
}

pub fn run() {
    let cli = Cli::parse();

    let debug_mode = std::env::var("FOCUSBUDDY_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // RUST_LOG still overrides the default level.
    env_logger::Builder::new()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(execute(cli, debug_mode)) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli, debug_mode: bool) -> Result<()> {
    let data_dir = data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let database = Database::new(data_dir.join("focusbuddy.sqlite3"))?;

    let state = AppState {
        db: database,
        settings,
        debug_mode,
    };
    info!("using data directory {}", data_dir.display());

    match cli.command {
        Commands::Start { minutes, hardcore } => {
            commands::start_session(&state, minutes, hardcore).await
        }
        Commands::Stats => commands::show_stats(&state).await,
        Commands::History { days } => commands::show_history(&state, days).await,
        Commands::Badges => commands::show_badges(&state).await,
        Commands::Journal { session_id, text } => {
            commands::write_journal(&state, &session_id, &text).await
        }
        Commands::Export { path } => commands::export_sessions(&state, &path).await,
        Commands::ResetStats => commands::reset_stats(&state).await,
        Commands::Calibrate => commands::calibrate(&state).await,
        Commands::Config { key, value } => {
            commands::configure(&state, key.as_deref(), value.as_deref())
        }
        Commands::Unblock => commands::unblock(&state),
    }
}
