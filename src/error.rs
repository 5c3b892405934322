//! Typed failures of the reconciliation core.

use thiserror::Error;

/// The static schedule could not be turned into a trip index.
///
/// Fatal for a run: nothing is reconciled and no partial index is returned.
#[derive(Debug, Error)]
pub enum ScheduleResolutionError {
    #[error("no route named {line_name:?} for agency {agency_id:?}")]
    NoMatchingRoute {
        line_name: String,
        agency_id: String,
    },

    #[error("{table} is missing required column {column:?}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("no stop named {0:?} in stops.txt")]
    UnknownStop(String),

    #[error("invalid schedule time {value:?} for trip {trip_id}")]
    InvalidTime { trip_id: String, value: String },

    #[error("failed to read {table}: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The realtime payload is not a valid GTFS-RT `FeedMessage`.
#[derive(Debug, Error)]
#[error("malformed realtime feed: {0}")]
pub struct FeedDecodeError(#[from] pub prost::DecodeError);
