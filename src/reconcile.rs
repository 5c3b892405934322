//! Joins the schedule index with realtime delays.
//!
//! Every scheduled stop is turned into a [`StopVisit`] whose times are
//! anchored to the [`ServiceDay`] and shifted by the realtime delay for that
//! (trip, stop), or left on schedule when the feed says nothing about it.
//! The query modes below are all views over that joined set.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::ids::{RouteId, StopId, TripId};
use crate::realtime::DelayTable;
use crate::schedule::{ScheduleIndex, ServiceDay, ServiceTime, Trip};

/// Default alert threshold: two minutes late at any monitored stop.
pub const DEFAULT_ALERT_THRESHOLD_SECS: i32 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    pub scheduled: DateTime<Utc>,
    pub effective: DateTime<Utc>,
    pub delay_secs: i32,
}

impl TimedEvent {
    fn new(scheduled: DateTime<Utc>, delay_secs: i32) -> Self {
        Self {
            scheduled,
            effective: scheduled + Duration::seconds(i64::from(delay_secs)),
            delay_secs,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopVisit {
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub stop_name: String,
    pub arrival_delay_secs: i32,
    pub departure_delay_secs: i32,
    pub arrival: Option<TimedEvent>,
    pub departure: Option<TimedEvent>,
}

impl StopVisit {
    /// Departure, or arrival at stops that only publish an arrival time.
    pub fn departure_event(&self) -> Option<&TimedEvent> {
        self.departure.as_ref().or(self.arrival.as_ref())
    }

    /// Arrival, or departure at stops that only publish a departure time.
    pub fn arrival_event(&self) -> Option<&TimedEvent> {
        self.arrival.as_ref().or(self.departure.as_ref())
    }

    pub fn departure_view(&self) -> Option<DepartureView> {
        self.departure_event().map(|event| DepartureView {
            trip_id: self.trip_id.clone(),
            stop_id: self.stop_id.clone(),
            stop_name: self.stop_name.clone(),
            scheduled_time: event.scheduled,
            effective_time: event.effective,
            delay_secs: event.delay_secs,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciledTrip {
    pub trip_id: TripId,
    pub route_id: RouteId,
    /// The realtime feed carried at least one stop update for this trip.
    pub has_realtime: bool,
    pub visits: Vec<StopVisit>,
}

/// One reported stop: when it was planned, when it will happen, and the gap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DepartureView {
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub stop_name: String,
    pub scheduled_time: DateTime<Utc>,
    pub effective_time: DateTime<Utc>,
    pub delay_secs: i32,
}

/// All stops of one active trip, ordered by effective time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Itinerary {
    pub trip_id: TripId,
    pub route_id: RouteId,
    pub stops: Vec<DepartureView>,
}

impl Itinerary {
    /// Stops still ahead of `now`.
    pub fn upcoming(&self, now: DateTime<Utc>) -> impl Iterator<Item = &DepartureView> {
        self.stops.iter().filter(move |s| s.effective_time > now)
    }

    /// The first stop still ahead of `now`.
    pub fn next(&self, now: DateTime<Utc>) -> Option<&DepartureView> {
        self.upcoming(now).next()
    }
}

/// Which trips a next-departure lookup may answer with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TripSelection {
    /// Only trips the realtime feed reports on.
    #[default]
    RealtimeConfirmed,
    /// Any scheduled trip; trips missing from the feed count as on time.
    Scheduled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertPolicy {
    /// A trip is reported once any stop's arrival delay reaches this value.
    pub threshold_secs: i32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold_secs: DEFAULT_ALERT_THRESHOLD_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertStop {
    pub stop_id: StopId,
    pub stop_name: String,
    pub scheduled_arrival: DateTime<Utc>,
    pub effective_arrival: DateTime<Utc>,
    pub delay_secs: i32,
    pub delay_minutes: f64,
}

impl AlertStop {
    /// Delay rounded down to whole minutes, as shown to riders.
    pub fn whole_minutes(&self) -> i64 {
        self.delay_minutes.floor() as i64
    }
}

/// One late trip: where it runs from and to, and every stop's delay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripAlert {
    pub trip_id: TripId,
    pub start_stop: String,
    pub end_stop: String,
    pub stops: Vec<AlertStop>,
}

pub struct Reconciler<'a> {
    index: &'a ScheduleIndex,
    delays: &'a DelayTable,
    service_day: ServiceDay,
}

impl<'a> Reconciler<'a> {
    pub fn new(index: &'a ScheduleIndex, delays: &'a DelayTable, service_day: ServiceDay) -> Self {
        Self {
            index,
            delays,
            service_day,
        }
    }

    /// Joins every indexed trip with its delays, in trip id order.
    pub fn join(&self) -> Vec<ReconciledTrip> {
        self.index.trips().map(|trip| self.join_trip(trip)).collect()
    }

    fn join_trip(&self, trip: &Trip) -> ReconciledTrip {
        let visits = trip
            .stops
            .iter()
            .map(|stop| {
                let (arrival_delay_secs, departure_delay_secs) = self
                    .delays
                    .get(&trip.trip_id, &stop.stop_id)
                    .map(|d| (d.arrival_delay_secs, d.departure_delay_secs))
                    .unwrap_or((0, 0));

                StopVisit {
                    trip_id: trip.trip_id.clone(),
                    stop_id: stop.stop_id.clone(),
                    stop_name: stop.stop_name.clone(),
                    arrival_delay_secs,
                    departure_delay_secs,
                    arrival: self.event(stop.scheduled_arrival, arrival_delay_secs),
                    departure: self.event(stop.scheduled_departure, departure_delay_secs),
                }
            })
            .collect();

        ReconciledTrip {
            trip_id: trip.trip_id.clone(),
            route_id: trip.route_id.clone(),
            has_realtime: self.delays.has_trip(&trip.trip_id),
            visits,
        }
    }

    fn event(&self, scheduled: Option<ServiceTime>, delay_secs: i32) -> Option<TimedEvent> {
        scheduled.map(|time| TimedEvent::new(self.service_day.instant(time), delay_secs))
    }

    /// The earliest departure strictly after `now` across all selected trips.
    ///
    /// Ties on effective time go to the smaller trip id, then stop id.
    pub fn next_departure(
        &self,
        now: DateTime<Utc>,
        selection: TripSelection,
    ) -> Option<DepartureView> {
        self.join()
            .into_iter()
            .filter(|trip| selection == TripSelection::Scheduled || trip.has_realtime)
            .flat_map(|trip| trip.visits)
            .filter_map(|visit| visit.departure_view())
            .filter(|view| view.effective_time > now)
            .min_by(compare_departures)
    }

    /// Every stop of every trip the realtime feed reports on.
    ///
    /// Trips missing from the feed are left out: this view is about trips
    /// currently running, not the timetable.
    pub fn full_itinerary(&self) -> Vec<Itinerary> {
        self.join()
            .into_iter()
            .filter(|trip| trip.has_realtime)
            .map(|trip| {
                let mut stops: Vec<DepartureView> = trip
                    .visits
                    .iter()
                    .filter_map(StopVisit::departure_view)
                    .collect();
                stops.sort_by_key(|s| s.effective_time);
                Itinerary {
                    trip_id: trip.trip_id,
                    route_id: trip.route_id,
                    stops,
                }
            })
            .collect()
    }

    /// Active trips with at least one stop arriving `policy.threshold_secs`
    /// or more late, one alert per trip.
    ///
    /// Stops are listed by effective arrival and reported once each, at
    /// their first occurrence.
    pub fn delay_alerts(&self, policy: &AlertPolicy) -> Vec<TripAlert> {
        self.join()
            .into_iter()
            .filter(|trip| trip.has_realtime)
            .filter(|trip| {
                trip.visits
                    .iter()
                    .any(|v| v.arrival_delay_secs >= policy.threshold_secs)
            })
            .filter_map(|trip| trip_alert(&trip))
            .collect()
    }
}

fn compare_departures(a: &DepartureView, b: &DepartureView) -> Ordering {
    a.effective_time
        .cmp(&b.effective_time)
        .then_with(|| a.trip_id.cmp(&b.trip_id))
        .then_with(|| a.stop_id.cmp(&b.stop_id))
}

fn trip_alert(trip: &ReconciledTrip) -> Option<TripAlert> {
    let mut timed: Vec<(&StopVisit, &TimedEvent)> = trip
        .visits
        .iter()
        .filter_map(|v| v.arrival_event().map(|e| (v, e)))
        .collect();
    timed.sort_by_key(|(_, event)| event.effective);

    let mut seen = HashSet::new();
    let stops: Vec<AlertStop> = timed
        .into_iter()
        .filter(|(visit, _)| seen.insert(visit.stop_id.clone()))
        .map(|(visit, event)| AlertStop {
            stop_id: visit.stop_id.clone(),
            stop_name: visit.stop_name.clone(),
            scheduled_arrival: event.scheduled,
            effective_arrival: event.effective,
            delay_secs: event.delay_secs,
            delay_minutes: f64::from(event.delay_secs) / 60.0,
        })
        .collect();

    Some(TripAlert {
        trip_id: trip.trip_id.clone(),
        start_stop: stops.first()?.stop_name.clone(),
        end_stop: stops.last()?.stop_name.clone(),
        stops,
    })
}
