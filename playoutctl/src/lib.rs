use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use playout_core::{
    load_playout_config, AnalyticsSnapshot, CatalogError, CatalogStore, ConfigError, OverrideFile,
    PlayoutConfig, SchedulerError, SchedulerLoop,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Missing(String),
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Control interface for the playout channel", long_about = None)]
pub struct Cli {
    /// Path to the playout configuration file
    #[arg(long, global = true, default_value = "configs/playout.toml")]
    pub config: PathBuf,

    /// Output format for read commands
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduling and supervision loop in the foreground
    Run,
    /// Catalog database maintenance
    #[command(subcommand)]
    Catalog(CatalogCommands),
    /// Emergency override controls
    #[command(subcommand)]
    Override(OverrideCommands),
    /// Show the most recent analytics snapshot
    Status,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommands {
    /// Create the catalog schema if it does not exist yet
    Init,
}

#[derive(Debug, Subcommand)]
pub enum OverrideCommands {
    /// Arm the emergency override for a playlist
    Arm(ArmArgs),
    /// Clear the emergency override and resume the schedule
    Clear,
    /// Show the current override flag
    Status,
}

#[derive(Debug, Args)]
pub struct ArmArgs {
    /// Playlist to force on air
    #[arg(long)]
    pub playlist: i64,
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_playout_config(&cli.config)?;
    match cli.command {
        Commands::Run => run_daemon(config),
        Commands::Catalog(CatalogCommands::Init) => catalog_init(&config),
        Commands::Override(command) => override_command(&config, command, cli.format),
        Commands::Status => status(&config, cli.format),
    }
}

fn run_daemon(config: PlayoutConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            wait_for_termination().await;
            let _ = shutdown_tx.send(true);
        });
        let scheduler = SchedulerLoop::new(config, shutdown_rx)?;
        scheduler.run().await?;
        Ok(())
    })
}

async fn wait_for_termination() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn catalog_init(config: &PlayoutConfig) -> Result<()> {
    let store = CatalogStore::new(&config.paths.database)?;
    store.initialize()?;
    println!("catalog ready at {}", config.paths.database.display());
    Ok(())
}

fn override_command(
    config: &PlayoutConfig,
    command: OverrideCommands,
    format: OutputFormat,
) -> Result<()> {
    let path = &config.paths.override_file;
    match command {
        OverrideCommands::Arm(args) => {
            write_override(
                path,
                &OverrideFile {
                    armed: true,
                    playlist_id: Some(args.playlist),
                },
            )?;
            println!("override armed for playlist {}", args.playlist);
        }
        OverrideCommands::Clear => {
            write_override(
                path,
                &OverrideFile {
                    armed: false,
                    playlist_id: None,
                },
            )?;
            println!("override cleared");
        }
        OverrideCommands::Status => {
            if !path.exists() {
                println!("disarmed (no override file)");
                return Ok(());
            }
            let flag: OverrideFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&flag)?),
                OutputFormat::Text => match (flag.armed, flag.playlist_id) {
                    (true, Some(id)) => println!("armed, playlist {id}"),
                    (true, None) => println!("armed, default playlist"),
                    (false, _) => println!("disarmed"),
                },
            }
        }
    }
    Ok(())
}

fn write_override(path: &Path, flag: &OverrideFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(flag)?)?;
    Ok(())
}

fn status(config: &PlayoutConfig, format: OutputFormat) -> Result<()> {
    let path = &config.paths.analytics_file;
    if !path.exists() {
        return Err(AppError::Missing(format!(
            "no analytics snapshot at {}; is the scheduler running?",
            path.display()
        )));
    }
    let snapshot: AnalyticsSnapshot = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => {
            println!("session start:       {}", snapshot.session_start);
            println!("last update:         {}", snapshot.session_end);
            println!("uptime seconds:      {}", snapshot.uptime_seconds);
            println!("streams started:     {}", snapshot.streams_started);
            println!("schedule switches:   {}", snapshot.schedule_switches);
            println!("emergency overrides: {}", snapshot.emergency_overrides);
            println!("errors:              {}", snapshot.errors);
            match snapshot.current_playlist {
                Some(id) => println!("current playlist:    {id}"),
                None => println!("current playlist:    none"),
            }
        }
    }
    Ok(())
}
