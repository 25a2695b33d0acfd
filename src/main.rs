//! CLI entry point for the GTFS stop index.
//!
//! Provides subcommands for running the schedule cache manager under the
//! periodic runner, answering one-shot stop lookups, and decoding the
//! realtime trip-update and vehicle-position feeds.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use gtfs_stop_index::cache::{DEFAULT_STALENESS_HOURS, ScheduleManager};
use gtfs_stop_index::fetch::BasicClient;
use gtfs_stop_index::realtime;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_stop_index")]
#[command(about = "Cache a GTFS schedule bundle and answer per-stop schedule lookups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the on-disk cache fresh and the in-memory model rebuilt
    Watch {
        /// URL of the GTFS schedule bundle (zip)
        #[arg(long)]
        schedule_url: String,

        /// Directory holding extracted schedule snapshots
        #[arg(long, default_value = "cache/schedule")]
        cache_dir: String,

        /// Hours before a cached snapshot is considered stale
        #[arg(long, default_value_t = DEFAULT_STALENESS_HOURS)]
        staleness_hours: i64,

        /// Seconds between freshness checks
        #[arg(long, default_value_t = 3600)]
        poll_secs: u64,
    },
    /// Run one cache update, then look up the schedule for a stop
    Lookup {
        /// URL of the GTFS schedule bundle (zip)
        #[arg(long)]
        schedule_url: String,

        /// Directory holding extracted schedule snapshots
        #[arg(long, default_value = "cache/schedule")]
        cache_dir: String,

        /// Hours before a cached snapshot is considered stale
        #[arg(long, default_value_t = DEFAULT_STALENESS_HOURS)]
        staleness_hours: i64,

        /// Stop id to look up
        #[arg(long, conflicts_with = "code")]
        id: Option<String>,

        /// Rider-facing stop code to look up
        #[arg(long)]
        code: Option<String>,
    },
    /// Fetch and decode a GTFS-RT trip updates feed
    TripUpdates {
        /// Trip updates endpoint URL
        #[arg(value_name = "URL")]
        url: String,

        /// Only report updates for this route id
        #[arg(long)]
        route: Option<String>,

        /// Only report arrivals at this stop id
        #[arg(long)]
        stop: Option<String>,
    },
    /// Fetch and decode a GTFS-RT vehicle positions feed
    VehiclePositions {
        /// Vehicle positions endpoint URL
        #[arg(value_name = "URL")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_stop_index.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_stop_index.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            schedule_url,
            cache_dir,
            staleness_hours,
            poll_secs,
        } => {
            let manager = Arc::new(ScheduleManager::new(
                schedule_url,
                cache_dir,
                chrono::Duration::hours(staleness_hours),
            ));

            let mut scheduler = manager.start(Duration::from_secs(poll_secs)).await;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            scheduler.stop();
        }
        Commands::Lookup {
            schedule_url,
            cache_dir,
            staleness_hours,
            id,
            code,
        } => {
            let manager = ScheduleManager::new(
                schedule_url,
                cache_dir,
                chrono::Duration::hours(staleness_hours),
            );
            manager.update().await;

            let model = manager
                .model()
                .context("no transit model available; see the log for the failed update")?;
            info!(now = %model.agency_local_now(), agency = %model.agency.name, "Model ready");

            let (label, schedule) = match (&id, &code) {
                (Some(id), _) => (id.as_str(), model.lookup_by_id(id)),
                (None, Some(code)) => (code.as_str(), model.lookup_by_code(code)),
                (None, None) => bail!("provide --id or --code"),
            };

            match schedule {
                Some(schedule) => println!("{}", serde_json::to_string_pretty(schedule)?),
                None => warn!(stop = label, "Stop not found"),
            }
        }
        Commands::TripUpdates { url, route, stop } => {
            let feed = realtime::fetch_feed(BasicClient::new(), &url).await?;
            let trip_updates = feed.entity.iter().filter(|e| e.trip_update.is_some()).count();
            info!(
                entities = feed.entity.len(),
                trip_updates,
                version = %feed.header.gtfs_realtime_version,
                "Trip updates feed decoded"
            );

            for entity in &feed.entity {
                let Some(update) = &entity.trip_update else {
                    continue;
                };
                if let Some(route) = &route {
                    if update.trip.route_id() != route {
                        continue;
                    }
                }
                for stop_time in &update.stop_time_update {
                    if let Some(stop) = &stop {
                        if stop_time.stop_id() != stop {
                            continue;
                        }
                    }
                    let arrival = stop_time
                        .arrival
                        .as_ref()
                        .and_then(|event| DateTime::from_timestamp(event.time(), 0));
                    match arrival {
                        Some(arrival) => println!(
                            "trip {} route {} stop {} arrival {}",
                            update.trip.trip_id(),
                            update.trip.route_id(),
                            stop_time.stop_id(),
                            arrival
                        ),
                        None => println!(
                            "trip {} route {} stop {} arrival unknown",
                            update.trip.trip_id(),
                            update.trip.route_id(),
                            stop_time.stop_id()
                        ),
                    }
                }
            }
        }
        Commands::VehiclePositions { url } => {
            let feed = realtime::fetch_feed(BasicClient::new(), &url).await?;

            let vehicles = feed.entity.iter().filter(|e| e.vehicle.is_some()).count();
            let with_position = feed
                .entity
                .iter()
                .filter_map(|e| e.vehicle.as_ref())
                .filter(|v| v.position.is_some())
                .count();
            info!(
                entities = feed.entity.len(),
                vehicles,
                with_position,
                version = %feed.header.gtfs_realtime_version,
                "Vehicle positions feed decoded"
            );

            for entity in &feed.entity {
                let Some(vehicle) = &entity.vehicle else {
                    continue;
                };
                let Some(position) = &vehicle.position else {
                    continue;
                };
                println!(
                    "vehicle {} trip {} at {:.5},{:.5} bearing {}",
                    entity.id,
                    vehicle.trip.as_ref().map_or("-", |t| t.trip_id()),
                    position.latitude,
                    position.longitude,
                    position
                        .bearing
                        .map_or_else(|| "-".to_string(), |b| format!("{b:.0}")),
                );
            }
        }
    }

    Ok(())
}
