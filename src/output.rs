//! Reporting sink: renders reconciliation results for people and files.
//!
//! Console output goes through `tracing` so it shares the levels and the
//! JSON log file of the rest of the run. Times are shown in the agency zone.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::reconcile::{DepartureView, Itinerary, TripAlert};

fn local_hm(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}

fn signed_minutes(delay_secs: i32) -> String {
    let minutes = delay_secs.div_euclid(60);
    if minutes >= 0 {
        format!("+{minutes} min")
    } else {
        format!("{minutes} min")
    }
}

/// One line per departure, e.g. `08:05 Lausanne +5 min (expected 08:10)`.
pub fn format_departure(view: &DepartureView, tz: Tz) -> String {
    if view.delay_secs == 0 {
        format!("{} {} on time", local_hm(view.scheduled_time, tz), view.stop_name)
    } else {
        format!(
            "{} {} {} (expected {})",
            local_hm(view.scheduled_time, tz),
            view.stop_name,
            signed_minutes(view.delay_secs),
            local_hm(view.effective_time, tz)
        )
    }
}

/// Chat message for one late trip: route endpoints, then one line per stop.
pub fn alert_message(alert: &TripAlert, tz: Tz) -> String {
    let mut msg = format!(
        "Delay on trip {}: {} -> {}\n",
        alert.trip_id, alert.start_stop, alert.end_stop
    );
    for stop in &alert.stops {
        let _ = writeln!(
            msg,
            "- {}: arrives {} ({} min late)",
            stop.stop_name,
            local_hm(stop.effective_arrival, tz),
            stop.whole_minutes()
        );
    }
    msg
}

pub fn report_next_departure(next: Option<&DepartureView>, tz: Tz) {
    match next {
        Some(view) => info!(
            trip_id = %view.trip_id,
            stop = %view.stop_name,
            scheduled = %view.scheduled_time,
            effective = %view.effective_time,
            delay_secs = view.delay_secs,
            "Next train: {}",
            format_departure(view, tz)
        ),
        None => info!("No upcoming train found"),
    }
}

pub fn report_itineraries(itineraries: &[Itinerary], now: DateTime<Utc>, tz: Tz) {
    if itineraries.is_empty() {
        info!("No active trips in the realtime feed");
        return;
    }
    for itinerary in itineraries {
        let next = itinerary.next(now).map(|v| v.stop_name.as_str());
        info!(
            trip_id = %itinerary.trip_id,
            route_id = %itinerary.route_id,
            stops = itinerary.stops.len(),
            next_stop = next.unwrap_or("-"),
            "Active trip"
        );
        for view in &itinerary.stops {
            info!(trip_id = %itinerary.trip_id, "  {}", format_departure(view, tz));
        }
    }
}

/// Logs any serializable result as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends rows to a CSV file, writing the header only when the file is new.
pub fn append_records<T: Serialize>(path: &str, rows: &[T]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
