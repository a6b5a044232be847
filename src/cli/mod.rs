use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    config::TrackerConfig,
    daemon::{
        start_daemon,
        storage::sqlite::{SqliteSessionStore, DATABASE_FILE_NAME},
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
    window_api::{PlatformWindowManager, WindowObserver},
};

#[derive(Parser, Debug)]
#[command(name = "focuswatch", version, long_about = None)]
#[command(about = "Tracks which application holds focus and for how long", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default a focuswatch directory under $XDG_STATE_HOME, \
                %APPDATA% or ~/Library/Application Support"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Print logs to stdout as well")]
    log_console: bool,
    #[arg(long, global = true, help = "Log level, e.g. debug. Overrides RUST_LOG")]
    log_filter: Option<LevelFilter>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track activity in the current console until interrupted")]
    Serve {
        #[arg(long, help = "Seconds between polls. Overrides the configuration file")]
        interval: Option<u64>,
    },
    #[command(about = "Print the window that currently holds focus")]
    Current {},
    #[command(about = "Remove stored sessions and samples older than the given age")]
    Cleanup {
        #[arg(
            long,
            help = "Days of data to keep. Defaults to retention_days from the configuration"
        )]
        days: Option<u32>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create application directory {dir:?}"))?;
            dir
        }
        None => create_application_default_path()?,
    };

    let prefix = match args.commands {
        Commands::Serve { .. } => DAEMON_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &dir, args.log_filter, args.log_console)?;

    let config_path = TrackerConfig::path_in(&dir);
    let mut config = TrackerConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    match args.commands {
        Commands::Serve { interval } => {
            if let Some(interval) = interval {
                config.tracking_interval = interval;
                config.validate()?;
            }
            info!("Starting tracker in {dir:?}");
            start_daemon(&dir, config).await
        }
        Commands::Current {} => print_current_window(),
        Commands::Cleanup { days } => cleanup(&dir, days.unwrap_or(config.retention_days)),
    }
}

fn print_current_window() -> Result<()> {
    let mut platform = PlatformWindowManager::detect();
    match platform.get_active_window()? {
        Some(window) => println!("{}: {}", window.app_name, window.window_title),
        None => println!("No focused window"),
    }
    Ok(())
}

fn cleanup(dir: &Path, days: u32) -> Result<()> {
    let mut store = SqliteSessionStore::open(&dir.join(DATABASE_FILE_NAME))?;
    let removed = store.cleanup_old_data(days, chrono::Utc::now())?;
    println!("Removed {removed} rows older than {days} days");
    Ok(())
}
