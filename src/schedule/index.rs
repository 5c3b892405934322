//! Trip index for one line, built from the static schedule tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::tables::{RouteRecord, ScheduleTables};
use super::time::ServiceTime;
use crate::error::ScheduleResolutionError;
use crate::ids::{RouteId, StopId, TripId, normalize_stop_id};

type Result<T> = std::result::Result<T, ScheduleResolutionError>;

/// A line as riders name it: `route_short_name` plus the operating agency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineSelector {
    pub line_name: String,
    pub agency_id: String,
}

impl LineSelector {
    pub fn new(line_name: impl Into<String>, agency_id: impl Into<String>) -> Self {
        Self {
            line_name: line_name.into(),
            agency_id: agency_id.into(),
        }
    }
}

/// Returns every route id published for `line`.
///
/// A line usually maps to several route ids (one per direction or variant).
/// Zero matches is an error, never an empty set.
pub fn resolve_route_ids(
    routes: &[RouteRecord],
    line: &LineSelector,
) -> Result<BTreeSet<RouteId>> {
    let ids: BTreeSet<RouteId> = routes
        .iter()
        .filter(|r| r.route_short_name == line.line_name && r.agency_id == line.agency_id)
        .map(|r| RouteId::new(&r.route_id))
        .collect();

    if ids.is_empty() {
        return Err(ScheduleResolutionError::NoMatchingRoute {
            line_name: line.line_name.clone(),
            agency_id: line.agency_id.clone(),
        });
    }
    Ok(ids)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexMode {
    /// Every stop of every trip on the line; used for next-departure lookups.
    #[default]
    AllStops,
    /// Only the monitored stops, and only trips that pass all of them.
    FullItinerary,
}

#[derive(Clone, Debug)]
pub struct IndexQuery {
    pub line: LineSelector,
    pub target_stop_names: BTreeSet<String>,
    pub mode: IndexMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledStop {
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub stop_name: String,
    /// Row position in `stop_times.txt`; breaks ties between equal times.
    pub sequence: usize,
    pub scheduled_arrival: Option<ServiceTime>,
    pub scheduled_departure: Option<ServiceTime>,
}

impl ScheduledStop {
    /// The time this stop is ordered by within its trip.
    pub fn schedule_time(&self) -> Option<ServiceTime> {
        self.scheduled_arrival.or(self.scheduled_departure)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: TripId,
    pub route_id: RouteId,
    /// Ascending by schedule time; untimed stops sort last.
    pub stops: Vec<ScheduledStop>,
}

impl Trip {
    pub fn first_stop(&self) -> Option<&ScheduledStop> {
        self.stops.first()
    }

    pub fn last_stop(&self) -> Option<&ScheduledStop> {
        self.stops.last()
    }

    pub fn visited_stops(&self) -> BTreeSet<StopId> {
        self.stops.iter().map(|s| s.stop_id.clone()).collect()
    }

    pub fn covers(&self, targets: &BTreeSet<StopId>) -> bool {
        let visited = self.visited_stops();
        targets.iter().all(|id| visited.contains(id))
    }

    /// Starts and ends at the same stop; malformed or circular, not an itinerary.
    pub fn is_degenerate(&self) -> bool {
        match (self.first_stop(), self.last_stop()) {
            (Some(first), Some(last)) => first.stop_id == last.stop_id,
            _ => true,
        }
    }
}

/// Read-only map of the line's trips, keyed by trip id.
#[derive(Clone, Debug, Default)]
pub struct ScheduleIndex {
    trips: BTreeMap<TripId, Trip>,
}

impl ScheduleIndex {
    pub fn get(&self, trip_id: &TripId) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

/// Builds the trip index for `query.line`.
///
/// In [`IndexMode::FullItinerary`] only stops named in
/// `query.target_stop_names` are kept and trips that miss any of them
/// (short turns, partial runs) are dropped. In both modes trips whose first
/// and last stop coincide are dropped.
pub fn build_index(tables: &ScheduleTables, query: &IndexQuery) -> Result<ScheduleIndex> {
    let route_ids = resolve_route_ids(&tables.routes, &query.line)?;

    let trip_routes: HashMap<&str, RouteId> = tables
        .trips
        .iter()
        .filter_map(|t| {
            route_ids
                .get(&RouteId::new(&t.route_id))
                .map(|id| (t.trip_id.as_str(), id.clone()))
        })
        .collect();

    let mut stop_names: HashMap<StopId, &str> = HashMap::new();
    for stop in &tables.stops {
        stop_names
            .entry(normalize_stop_id(&stop.stop_id))
            .or_insert(stop.stop_name.as_str());
    }

    let targets = match query.mode {
        IndexMode::AllStops => None,
        IndexMode::FullItinerary => Some(target_stop_ids(&stop_names, &query.target_stop_names)?),
    };

    let mut stops_by_trip: BTreeMap<TripId, Vec<ScheduledStop>> = BTreeMap::new();
    for (sequence, row) in tables.stop_times.iter().enumerate() {
        if !trip_routes.contains_key(row.trip_id.as_str()) {
            continue;
        }
        let stop_id = normalize_stop_id(&row.stop_id);
        if let Some(targets) = &targets {
            if !targets.contains(&stop_id) {
                continue;
            }
        }

        let trip_id = TripId::new(&row.trip_id);
        let stop_name = stop_names
            .get(&stop_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| stop_id.to_string());

        stops_by_trip
            .entry(trip_id.clone())
            .or_default()
            .push(ScheduledStop {
                scheduled_arrival: parse_time(&trip_id, row.arrival_time.as_deref())?,
                scheduled_departure: parse_time(&trip_id, row.departure_time.as_deref())?,
                trip_id,
                stop_id,
                stop_name,
                sequence,
            });
    }

    let mut trips = BTreeMap::new();
    for (trip_id, mut stops) in stops_by_trip {
        // Stable: equal times keep file order.
        stops.sort_by_key(|s| {
            let time = s.schedule_time();
            (time.is_none(), time)
        });

        let trip = Trip {
            route_id: trip_routes[trip_id.as_str()].clone(),
            trip_id: trip_id.clone(),
            stops,
        };

        if let Some(targets) = &targets {
            if !trip.covers(targets) {
                continue;
            }
        }
        if trip.is_degenerate() {
            continue;
        }
        trips.insert(trip_id, trip);
    }

    Ok(ScheduleIndex { trips })
}

/// Canonical ids of every stop whose name is monitored.
fn target_stop_ids(
    stop_names: &HashMap<StopId, &str>,
    target_names: &BTreeSet<String>,
) -> Result<BTreeSet<StopId>> {
    let mut ids = BTreeSet::new();
    for name in target_names {
        let before = ids.len();
        ids.extend(
            stop_names
                .iter()
                .filter(|(_, stop_name)| **stop_name == name.as_str())
                .map(|(id, _)| id.clone()),
        );
        if ids.len() == before {
            return Err(ScheduleResolutionError::UnknownStop(name.clone()));
        }
    }
    Ok(ids)
}

fn parse_time(trip_id: &TripId, value: Option<&str>) -> Result<Option<ServiceTime>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => ServiceTime::parse(raw).map(Some).ok_or_else(|| {
            ScheduleResolutionError::InvalidTime {
                trip_id: trip_id.to_string(),
                value: raw.to_string(),
            }
        }),
    }
}
