//! CLI entry point for next-train lookups.
//!
//! Loads the line's static schedule (downloading it when the cache is stale),
//! fetches one realtime snapshot, reconciles them once and reports.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use next_train::config::{AppConfig, StaticSource};
use next_train::fetch::{BasicClient, auth::ApiKey, fetch_bytes};
use next_train::notify::{LogNotifier, Notifier, WebhookNotifier, send_all};
use next_train::output::{
    alert_message, append_records, print_json, report_itineraries, report_next_departure,
};
use next_train::realtime::{DelayTable, parse_delays};
use next_train::reconcile::{AlertPolicy, Reconciler, TripSelection};
use next_train::schedule::{IndexMode, ScheduleIndex, ScheduleTables, ServiceDay, build_index};
use next_train::static_cache::StaticCache;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "next_train")]
#[command(about = "Next scheduled train on a line, with realtime delays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Sources {
    /// Realtime feed file or URL (defaults to GTFS_RT_URL)
    #[arg(long, value_name = "FILE_OR_URL")]
    feed: Option<String>,

    /// Extracted GTFS directory to use instead of the download cache
    #[arg(long, value_name = "DIR")]
    gtfs_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract the static schedule if it changed
    Sync,
    /// Show the next departure on the line
    Next {
        #[command(flatten)]
        sources: Sources,

        /// Also consider trips the realtime feed does not report on
        #[arg(long, default_value_t = false)]
        include_scheduled: bool,

        /// CSV file to append the result to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show every active trip through the monitored stops
    Itinerary {
        #[command(flatten)]
        sources: Sources,

        /// CSV file to append the itineraries to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Notify about trips running late at any monitored stop
    Alert {
        #[command(flatten)]
        sources: Sources,

        /// Arrival delay in seconds that triggers an alert (defaults to ALERT_THRESHOLD_SECS)
        #[arg(short, long, value_parser = clap::value_parser!(i32).range(0..))]
        threshold: Option<i32>,

        /// Log alerts instead of posting them to WEBHOOK_URL
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/next_train.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("next_train.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => {
            let dir = sync_static(&StaticSource::from_env()).await?;
            info!(dir = %dir.display(), "Static schedule ready");
        }
        Commands::Next {
            sources,
            include_scheduled,
            output,
        } => {
            let config = AppConfig::from_env()?;
            let index = load_index(&config, &sources, IndexMode::AllStops).await?;
            let delays = load_delays(&config, &sources).await?;

            let now = Utc::now();
            let reconciler =
                Reconciler::new(&index, &delays, ServiceDay::containing(now, config.timezone));
            let selection = if include_scheduled {
                TripSelection::Scheduled
            } else {
                TripSelection::RealtimeConfirmed
            };
            let next = reconciler.next_departure(now, selection);

            if sources.json {
                print_json(&next)?;
            } else {
                report_next_departure(next.as_ref(), config.timezone);
            }
            if let (Some(path), Some(view)) = (output, next) {
                append_records(&path, &[view])?;
            }
        }
        Commands::Itinerary { sources, output } => {
            let config = AppConfig::from_env()?;
            let index = load_index(&config, &sources, IndexMode::FullItinerary).await?;
            let delays = load_delays(&config, &sources).await?;

            let now = Utc::now();
            let itineraries =
                Reconciler::new(&index, &delays, ServiceDay::containing(now, config.timezone))
                    .full_itinerary();

            if sources.json {
                print_json(&itineraries)?;
            } else {
                report_itineraries(&itineraries, now, config.timezone);
            }
            if let Some(path) = output {
                let rows: Vec<_> = itineraries.into_iter().flat_map(|i| i.stops).collect();
                append_records(&path, &rows)?;
            }
        }
        Commands::Alert {
            sources,
            threshold,
            dry_run,
        } => {
            let config = AppConfig::from_env()?;
            let policy = threshold
                .map(|threshold_secs| AlertPolicy { threshold_secs })
                .unwrap_or(config.alert_policy);

            let index = load_index(&config, &sources, IndexMode::FullItinerary).await?;
            let delays = load_delays(&config, &sources).await?;

            let now = Utc::now();
            let alerts =
                Reconciler::new(&index, &delays, ServiceDay::containing(now, config.timezone))
                    .delay_alerts(&policy);
            info!(
                qualifying = alerts.len(),
                threshold_secs = policy.threshold_secs,
                "Delay check complete"
            );

            if sources.json {
                print_json(&alerts)?;
            }
            let messages: Vec<String> = alerts
                .iter()
                .map(|alert| alert_message(alert, config.timezone))
                .collect();

            let notifier: Box<dyn Notifier> = match (&config.webhook_url, dry_run) {
                (Some(url), false) => Box::new(WebhookNotifier::new(BasicClient::new(), url)),
                _ => Box::new(LogNotifier),
            };
            let sent = send_all(notifier.as_ref(), &messages).await;
            info!(sent, total = messages.len(), "Alerts delivered");
        }
    }

    Ok(())
}

/// Makes sure the current static archive is extracted in the cache.
async fn sync_static(source: &StaticSource) -> Result<PathBuf> {
    let url = source
        .url
        .as_deref()
        .context("GTFS_STATIC_URL must be set")?;
    StaticCache::new(&source.cache_dir)
        .ensure(&BasicClient::new(), url)
        .await
}

/// Builds the trip index for the configured line.
#[tracing::instrument(skip(config, sources), fields(line = %config.line.line_name))]
async fn load_index(
    config: &AppConfig,
    sources: &Sources,
    mode: IndexMode,
) -> Result<ScheduleIndex> {
    let query = config.index_query(mode)?;
    let dir = match &sources.gtfs_dir {
        Some(dir) => dir.clone(),
        None => sync_static(&config.static_source).await?,
    };

    let tables = ScheduleTables::load_dir_for_line(&dir, &config.line)
        .with_context(|| format!("failed to load schedule from {}", dir.display()))?;
    debug!(
        trips = tables.trips.len(),
        stop_times = tables.stop_times.len(),
        "Line tables loaded"
    );

    let index = build_index(&tables, &query)?;
    info!(trips = index.len(), "Schedule index built");
    Ok(index)
}

/// Fetches one realtime snapshot and indexes its delays.
async fn load_delays(config: &AppConfig, sources: &Sources) -> Result<DelayTable> {
    let source = sources
        .feed
        .as_deref()
        .or(config.realtime_url.as_deref())
        .context("GTFS_RT_URL must be set or --feed given")?;

    let bytes = fetcher(source, config.token.as_deref()).await?;
    let delays = parse_delays(&bytes, &config.trip_id_matcher)?;
    info!(records = delays.len(), "Realtime delays parsed");
    Ok(DelayTable::new(delays))
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(skip(token))]
async fn fetcher(source: &str, token: Option<&str>) -> Result<Vec<u8>> {
    if !source.starts_with("http") {
        return std::fs::read(source).with_context(|| format!("failed to read {source}"));
    }
    let bytes = match token {
        Some(token) => fetch_bytes(&ApiKey::bearer(BasicClient::new(), token)?, source).await?,
        None => fetch_bytes(&BasicClient::new(), source).await?,
    };
    debug!(bytes = bytes.len(), "Feed bytes received");
    Ok(bytes)
}
