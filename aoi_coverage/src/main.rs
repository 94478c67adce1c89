use anyhow::{Context, Result};
use aoi_coverage::{
    cache::FileTextCache,
    catalog::StacClient,
    config::default_cache_dir,
    estimate_passes, list_archive_scenes, run_coverage_index,
    tle::{HttpTextFetcher, TleStore},
    time_window::TimeMode,
    AreaOfInterest, BoundingBox, EngineConfig, TimeWindow,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::{fs, path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aoi_coverage")]
#[command(about = "Reference-only archive coverage and pass estimates for an area of interest", long_about = None)]
struct Cli {
    /// Engine configuration (JSON). Defaults to the user config directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory of the TLE text cache.
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rule-based coverage index, plus open catalog probes when a month range is given
    Coverage {
        #[command(flatten)]
        aoi: AoiArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Upcoming pass windows of the tracked satellites
    Passes {
        #[command(flatten)]
        aoi: AoiArgs,
        /// Horizon in days (default from configuration)
        #[arg(long)]
        days: Option<i64>,
        /// Start of the horizon, RFC 3339 (default now)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },
    /// Archive scenes in the open catalog, grouped by satellite and day
    Scenes {
        #[command(flatten)]
        aoi: AoiArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// How scene times are printed: date or datetime
        #[arg(long, default_value = "datetime")]
        time_mode: TimeMode,
    },
}

#[derive(Args, Debug)]
struct AoiArgs {
    /// AOI as west,south,east,north
    #[arg(long, allow_hyphen_values = true, required_unless_present = "geojson", conflicts_with = "geojson")]
    bbox: Option<BoundingBox>,
    /// AOI from a GeoJSON geometry, feature or feature collection file
    #[arg(long, value_name = "FILE")]
    geojson: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// First month, YYYY-MM
    #[arg(long, requires = "to")]
    from: Option<String>,
    /// Last month (inclusive), YYYY-MM
    #[arg(long, requires = "from")]
    to: Option<String>,
}

impl AoiArgs {
    fn area_of_interest(&self) -> Result<AreaOfInterest> {
        if let Some(path) = &self.geojson {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let geometry = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            return Ok(AreaOfInterest::from_geometry(geometry)?);
        }
        match self.bbox {
            Some(bbox) => Ok(AreaOfInterest::from_bbox(bbox)),
            None => anyhow::bail!("either --bbox or --geojson is required"),
        }
    }
}

impl WindowArgs {
    fn time_window(&self) -> Result<Option<TimeWindow>> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => Ok(Some(TimeWindow::from_month_strs(from, to)?)),
            _ => Ok(None),
        }
    }
}

fn print_json<T: Serialize>(rows: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Coverage { aoi, window } => {
            let aoi = aoi.area_of_interest()?;
            let window = window.time_window()?;
            let catalog = StacClient::new(&cfg.catalog)?;
            let rows = run_coverage_index(&cfg, &aoi, window.as_ref(), &catalog, &cancel).await;
            print_json(&rows)?;
        }
        Command::Passes { aoi, days, start } => {
            let aoi = aoi.area_of_interest()?;
            let cache_dir = cli.cache_dir.unwrap_or_else(default_cache_dir);
            info!("TLE cache at {}", cache_dir.display());

            let store = TleStore::new(
                Arc::new(FileTextCache::new(cache_dir)),
                Arc::new(HttpTextFetcher::new(Duration::from_secs(cfg.catalog.timeout_secs))?),
            );
            let rows = estimate_passes(
                &cfg,
                &store,
                &aoi,
                start.unwrap_or_else(Utc::now),
                days.unwrap_or(cfg.passes.horizon_days),
                &cancel,
            )
            .await?;
            print_json(&rows)?;
        }
        Command::Scenes {
            aoi,
            window,
            time_mode,
        } => {
            let aoi = aoi.area_of_interest()?;
            let window = window.time_window()?;
            let catalog = StacClient::new(&cfg.catalog)?;
            let groups: Vec<_> = list_archive_scenes(&cfg, &aoi, window.as_ref(), &catalog, &cancel)
                .await?
                .into_iter()
                .map(|g| g.with_time_mode(time_mode))
                .collect();
            print_json(&groups)?;
        }
    }

    Ok(())
}
