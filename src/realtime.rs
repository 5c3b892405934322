//! Per-stop delay records extracted from a GTFS-RT trip-update feed.

use std::collections::{HashMap, HashSet};

use crate::error::FeedDecodeError;
use crate::gtfs_rt::FeedMessage;
use crate::ids::{StopId, TripId, TripIdMatcher, normalize_stop_id};
use crate::parser::parse_feed;

/// Delay of one trip at one stop, in seconds.
///
/// A missing arrival or departure delay in the feed means "on time for that
/// event" and is stored as 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealtimeDelay {
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub arrival_delay_secs: i32,
    pub departure_delay_secs: i32,
}

/// Flattens every stop-time update of every trip update into delay records.
///
/// Trip ids go through `matcher` so they line up with `trips.txt`; stop ids
/// are normalized. Deleted entities, trip updates without a trip id and stop
/// updates without a stop id have nothing to join on and are skipped.
pub fn delays_from_feed(feed: &FeedMessage, matcher: &TripIdMatcher) -> Vec<RealtimeDelay> {
    let mut delays = Vec::new();

    for entity in &feed.entity {
        if entity.is_deleted() {
            continue;
        }
        let Some(update) = &entity.trip_update else {
            continue;
        };
        let Some(raw_trip_id) = update.trip.trip_id.as_deref() else {
            continue;
        };
        let trip_id = matcher.canonical(raw_trip_id);

        for stu in &update.stop_time_update {
            let Some(raw_stop_id) = stu.stop_id.as_deref() else {
                continue;
            };
            delays.push(RealtimeDelay {
                trip_id: trip_id.clone(),
                stop_id: normalize_stop_id(raw_stop_id),
                arrival_delay_secs: stu.arrival.as_ref().and_then(|e| e.delay).unwrap_or(0),
                departure_delay_secs: stu.departure.as_ref().and_then(|e| e.delay).unwrap_or(0),
            });
        }
    }

    delays
}

/// Decodes `bytes` and extracts its delay records in one step.
pub fn parse_delays(
    bytes: &[u8],
    matcher: &TripIdMatcher,
) -> Result<Vec<RealtimeDelay>, FeedDecodeError> {
    let feed = parse_feed(bytes)?;
    Ok(delays_from_feed(&feed, matcher))
}

/// Delay records indexed by (trip, stop).
#[derive(Clone, Debug, Default)]
pub struct DelayTable {
    by_visit: HashMap<(TripId, StopId), RealtimeDelay>,
    trips: HashSet<TripId>,
}

impl DelayTable {
    /// Indexes `delays`; when a feed repeats a (trip, stop) pair the first
    /// record is kept.
    pub fn new(delays: impl IntoIterator<Item = RealtimeDelay>) -> Self {
        let mut table = Self::default();
        for delay in delays {
            table.trips.insert(delay.trip_id.clone());
            table
                .by_visit
                .entry((delay.trip_id.clone(), delay.stop_id.clone()))
                .or_insert(delay);
        }
        table
    }

    pub fn get(&self, trip_id: &TripId, stop_id: &StopId) -> Option<&RealtimeDelay> {
        self.by_visit.get(&(trip_id.clone(), stop_id.clone()))
    }

    /// True when the feed carried at least one stop update for `trip_id`.
    pub fn has_trip(&self, trip_id: &TripId) -> bool {
        self.trips.contains(trip_id)
    }

    pub fn len(&self) -> usize {
        self.by_visit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_visit.is_empty()
    }
}
