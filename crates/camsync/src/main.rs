//! camsync — meteor camera slideshow kiosk
//!
//! Shows the last good night of captures and refreshes it once a day from
//! the station fleet.

use camsync::{CamsyncConfig, LogRenderer, Slideshow, build_scheduler, resolve_image_dir};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "camsync")]
#[command(about = "Meteor camera slideshow kiosk")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "camsync.json")]
    config: PathBuf,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the slideshow (default)
    Run(RunArgs),

    /// Fetch the latest directories now, bypassing the daily check
    Fetch,

    /// Print the last good night without fetching
    FindGoodNight,

    /// Generate a config file with the defaults
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "camsync.json")]
        output: PathBuf,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Show the slideshow full screen
    #[arg(long)]
    full_screen: bool,

    /// Show slides from this directory instead of the stored working set
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Display (monitor) index
    #[arg(long)]
    display: Option<usize>,

    /// Time per slide in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in [
        "camsync",
        "cams_schedule",
        "cams_fetch",
        "cams_health",
        "cams_remote",
        "cams_convert",
        "cams_persist",
    ] {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_slideshow(cli.config, args).await?,
        Commands::Fetch => fetch_now(cli.config).await?,
        Commands::FindGoodNight => find_good_night(cli.config).await?,
        Commands::InitConfig { output } => init_config(output)?,
    }

    Ok(())
}

// ─── Run ─────────────────────────────────────────────────────────────────────

async fn run_slideshow(config_path: PathBuf, args: RunArgs) -> anyhow::Result<()> {
    let image_dir = args
        .image_dir
        .as_deref()
        .map(resolve_image_dir)
        .transpose()?;

    info!(config = %config_path.display(), "starting camsync");
    let mut config = CamsyncConfig::load(&config_path)?;
    config.slideshow.full_screen |= args.full_screen;
    if let Some(display) = args.display {
        config.slideshow.display = display;
    }
    if let Some(interval) = args.interval_ms {
        config.slideshow.interval_ms = interval;
    }
    info!(
        host = %config.remote.host,
        check_hour = config.schedule.check_hour,
        data_root = %config.schedule.data_root.display(),
        "loaded config"
    );

    let mut scheduler = build_scheduler(&config);
    if let Some(dir) = image_dir {
        scheduler.set_image_dir(dir);
    }

    let renderer = LogRenderer::new(
        (config.slideshow.width, config.slideshow.height),
        config.slideshow.full_screen,
        config.slideshow.display,
    );
    let mut slideshow = Slideshow::new(scheduler, Box::new(renderer));
    slideshow.prepare().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    slideshow
        .run(Duration::from_millis(config.slideshow.interval_ms.max(1)), shutdown)
        .await?;
    Ok(())
}

// ─── Fetch ───────────────────────────────────────────────────────────────────

async fn fetch_now(config_path: PathBuf) -> anyhow::Result<()> {
    let config = CamsyncConfig::load(&config_path)?;
    let mut scheduler = build_scheduler(&config);
    let report = scheduler.force_fetch(Local::now().naive_local()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ─── Find good night ─────────────────────────────────────────────────────────

async fn find_good_night(config_path: PathBuf) -> anyhow::Result<()> {
    let config = CamsyncConfig::load(&config_path)?;
    let scheduler = build_scheduler(&config);
    let snapshot = scheduler
        .report_good_night(Local::now().naive_local())
        .await?;
    if snapshot.is_empty() {
        info!("no good night within the lookback window");
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

// ─── Init config ─────────────────────────────────────────────────────────────

fn init_config(output: PathBuf) -> anyhow::Result<()> {
    let config = CamsyncConfig::default();
    config.save(&output)?;
    println!("Config written to {}", output.display());
    Ok(())
}
