//! Typed rows of the four GTFS tables the index is built from.
//!
//! Headers are checked against each table's required columns before any
//! row is decoded, so a feed missing a column fails at load time instead
//! of on first access. Columns not listed here are ignored.

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::index::{LineSelector, resolve_route_ids};
use crate::error::ScheduleResolutionError;

type Result<T> = std::result::Result<T, ScheduleResolutionError>;

/// A GTFS table with a fixed file name and a set of mandatory columns.
pub trait GtfsTable: DeserializeOwned {
    const FILE_NAME: &'static str;
    const REQUIRED_COLUMNS: &'static [&'static str];
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RouteRecord {
    pub route_id: String,
    pub route_short_name: String,
    pub agency_id: String,
}

impl GtfsTable for RouteRecord {
    const FILE_NAME: &'static str = "routes.txt";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["route_id", "route_short_name", "agency_id"];
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TripRecord {
    pub trip_id: String,
    pub route_id: String,
}

impl GtfsTable for TripRecord {
    const FILE_NAME: &'static str = "trips.txt";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["trip_id", "route_id"];
}

/// Times stay raw here; blank cells (untimed stops) decode to `None`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
}

impl GtfsTable for StopTimeRecord {
    const FILE_NAME: &'static str = "stop_times.txt";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["trip_id", "stop_id", "arrival_time", "departure_time"];
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: String,
}

impl GtfsTable for StopRecord {
    const FILE_NAME: &'static str = "stops.txt";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["stop_id", "stop_name"];
}

/// Reads every row of `T` from `reader`.
pub fn read_table<T: GtfsTable>(reader: impl Read) -> Result<Vec<T>> {
    read_table_filtered(reader, |_: &T| true)
}

/// Reads the rows of `T` for which `keep` holds, in file order.
pub fn read_table_filtered<T: GtfsTable>(
    reader: impl Read,
    mut keep: impl FnMut(&T) -> bool,
) -> Result<Vec<T>> {
    let table_err = |source| ScheduleResolutionError::Table {
        table: T::FILE_NAME,
        source,
    };

    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers = rdr.headers().map_err(table_err)?;
    for column in T::REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *column) {
            return Err(ScheduleResolutionError::MissingColumn {
                table: T::FILE_NAME,
                column: *column,
            });
        }
    }

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(table_err)?;
        if keep(&row) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// The four tables the schedule index is built from.
#[derive(Clone, Debug, Default)]
pub struct ScheduleTables {
    pub routes: Vec<RouteRecord>,
    pub trips: Vec<TripRecord>,
    pub stop_times: Vec<StopTimeRecord>,
    pub stops: Vec<StopRecord>,
}

impl ScheduleTables {
    pub fn from_readers(
        routes: impl Read,
        trips: impl Read,
        stop_times: impl Read,
        stops: impl Read,
    ) -> Result<Self> {
        Ok(Self {
            routes: read_table(routes)?,
            trips: read_table(trips)?,
            stop_times: read_table(stop_times)?,
            stops: read_table(stops)?,
        })
    }

    /// Loads all four tables from an extracted GTFS directory.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        Self::from_readers(
            open_table::<RouteRecord>(dir)?,
            open_table::<TripRecord>(dir)?,
            open_table::<StopTimeRecord>(dir)?,
            open_table::<StopRecord>(dir)?,
        )
    }

    /// Loads only the trips and stop times belonging to `line`.
    ///
    /// `stop_times.txt` is streamed and filtered row by row, so memory stays
    /// proportional to the line rather than to the whole network.
    pub fn load_dir_for_line(dir: &Path, line: &LineSelector) -> Result<Self> {
        let routes: Vec<RouteRecord> = read_table(open_table::<RouteRecord>(dir)?)?;
        let route_ids = resolve_route_ids(&routes, line)?;

        let trips: Vec<TripRecord> =
            read_table_filtered(open_table::<TripRecord>(dir)?, |t: &TripRecord| {
                route_ids.iter().any(|id| id.as_str() == t.route_id)
            })?;
        let trip_ids: HashSet<&str> = trips.iter().map(|t| t.trip_id.as_str()).collect();

        let stop_times = read_table_filtered(
            open_table::<StopTimeRecord>(dir)?,
            |st: &StopTimeRecord| trip_ids.contains(st.trip_id.as_str()),
        )?;
        let stops = read_table(open_table::<StopRecord>(dir)?)?;

        Ok(Self {
            routes,
            trips,
            stop_times,
            stops,
        })
    }
}

fn open_table<T: GtfsTable>(dir: &Path) -> Result<File> {
    let path = dir.join(T::FILE_NAME);
    File::open(&path).map_err(|source| ScheduleResolutionError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_routes_ignores_extra_columns() {
        let csv = "route_id,agency_id,route_short_name,route_type\nR1,11,S3,109\n";
        let routes: Vec<RouteRecord> = read_table(csv.as_bytes()).unwrap();
        assert_eq!(
            routes,
            vec![RouteRecord {
                route_id: "R1".to_string(),
                route_short_name: "S3".to_string(),
                agency_id: "11".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_column_is_reported_before_rows() {
        let csv = "trip_id,stop_id,departure_time\nT1,A,08:00:00\n";
        let err = read_table::<StopTimeRecord>(csv.as_bytes()).unwrap_err();
        match err {
            ScheduleResolutionError::MissingColumn { table, column } => {
                assert_eq!(table, "stop_times.txt");
                assert_eq!(column, "arrival_time");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_times_decode_to_none() {
        let csv = "trip_id,arrival_time,departure_time,stop_id\nT1,,,A:0:1\nT1, 08:05:00 ,08:06:00,B\n";
        let rows: Vec<StopTimeRecord> = read_table(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].arrival_time, None);
        assert_eq!(rows[0].departure_time, None);
        assert_eq!(rows[1].arrival_time.as_deref(), Some("08:05:00"));
    }

    #[test]
    fn test_filtered_read_keeps_file_order() {
        let csv = "trip_id,route_id\nT3,R1\nT1,R2\nT2,R1\n";
        let trips: Vec<TripRecord> =
            read_table_filtered(csv.as_bytes(), |t: &TripRecord| t.route_id == "R1").unwrap();
        let ids: Vec<_> = trips.iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(ids, ["T3", "T2"]);
    }

    #[test]
    fn test_load_dir_for_line_drops_other_routes() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
        write(
            "routes.txt",
            "route_id,route_short_name,agency_id\nR1,S3,11\nR2,S4,11\n",
        );
        write("trips.txt", "trip_id,route_id\nT1,R1\nT2,R2\n");
        write(
            "stop_times.txt",
            "trip_id,stop_id,arrival_time,departure_time\nT1,A,08:00:00,08:00:00\nT2,A,09:00:00,09:00:00\n",
        );
        write("stops.txt", "stop_id,stop_name\nA,Alpha\n");

        let line = LineSelector::new("S3", "11");
        let tables = ScheduleTables::load_dir_for_line(dir.path(), &line).unwrap();
        assert_eq!(tables.trips.len(), 1);
        assert_eq!(tables.stop_times.len(), 1);
        assert_eq!(tables.stop_times[0].trip_id, "T1");
    }

    #[test]
    fn test_load_dir_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScheduleTables::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ScheduleResolutionError::Io { .. }));
    }
}
