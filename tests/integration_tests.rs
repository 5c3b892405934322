use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use next_train::error::ScheduleResolutionError;
use next_train::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
use next_train::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};
use next_train::ids::TripIdMatcher;
use next_train::realtime::{DelayTable, parse_delays};
use next_train::reconcile::{AlertPolicy, Reconciler, TripSelection};
use next_train::schedule::{
    IndexMode, IndexQuery, LineSelector, ScheduleIndex, ScheduleTables, ServiceDay, build_index,
};
use prost::Message;
use std::path::Path;

const ROUTES: &str = "route_id,agency_id,route_short_name,route_type\n\
    91-3-A-j24-1,11,S3,109\n\
    91-3-B-j24-1,11,S3,109\n\
    91-4-A-j24-1,11,S4,109\n";

const TRIPS: &str = "route_id,service_id,trip_id,trip_headsign\n\
    91-3-A-j24-1,TA,T1,Vallorbe\n\
    91-3-B-j24-1,TA,T2,Vallorbe\n\
    91-3-A-j24-1,TA,T3,Renens VD\n\
    91-4-A-j24-1,TA,T4,Palezieux\n";

const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
    T1,08:00:00,08:00:00,8501120:0:3,1\n\
    T1,08:05:00,08:05:00,8501117:0:1,2\n\
    T1,08:10:00,08:10:00,8501037:0:2,3\n\
    T2,09:00:00,09:00:00,8501120:0:4,1\n\
    T2,09:05:00,09:05:00,8501117:0:1,2\n\
    T2,09:10:00,09:10:00,8501037:0:1,3\n\
    T3,08:20:00,08:20:00,8501120:0:5,1\n\
    T3,08:25:00,08:25:00,8501117:0:2,2\n\
    T4,08:02:00,08:02:00,8501120:0:9,1\n\
    T4,08:30:00,08:30:00,8504100,2\n";

const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon\n\
    8501120,Lausanne,46.5,6.6\n\
    8501120:0:3,Lausanne,46.5,6.6\n\
    8501117,Renens VD,46.5,6.5\n\
    8501037,Morges,46.5,6.4\n\
    8504100,Palezieux,46.5,6.8\n";

fn write_gtfs(dir: &Path) {
    for (name, body) in [
        ("routes.txt", ROUTES),
        ("trips.txt", TRIPS),
        ("stop_times.txt", STOP_TIMES),
        ("stops.txt", STOPS),
    ] {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

fn query(mode: IndexMode) -> IndexQuery {
    IndexQuery {
        line: LineSelector::new("S3", "11"),
        target_stop_names: ["Lausanne", "Renens VD", "Morges"]
            .into_iter()
            .map(String::from)
            .collect(),
        mode,
    }
}

fn load_index(mode: IndexMode) -> ScheduleIndex {
    let dir = tempfile::tempdir().unwrap();
    write_gtfs(dir.path());
    let tables = ScheduleTables::load_dir_for_line(dir.path(), &query(mode).line).unwrap();
    build_index(&tables, &query(mode)).unwrap()
}

fn update(stop_id: &str, arrival: Option<i32>, departure: Option<i32>) -> StopTimeUpdate {
    let event = |delay: i32| StopTimeEvent {
        delay: Some(delay),
        ..Default::default()
    };
    StopTimeUpdate {
        stop_id: Some(stop_id.to_string()),
        arrival: arrival.map(event),
        departure: departure.map(event),
        ..Default::default()
    }
}

fn encode_feed(trips: Vec<(&str, Vec<StopTimeUpdate>)>) -> Vec<u8> {
    FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1_709_539_200),
            ..Default::default()
        },
        entity: trips
            .into_iter()
            .enumerate()
            .map(|(i, (trip_id, updates))| FeedEntity {
                id: i.to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some(trip_id.to_string()),
                        ..Default::default()
                    },
                    stop_time_update: updates,
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect(),
    }
    .encode_to_vec()
}

fn delays(bytes: &[u8]) -> DelayTable {
    DelayTable::new(parse_delays(bytes, &TripIdMatcher::identity()).unwrap())
}

fn day() -> ServiceDay {
    ServiceDay::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), chrono_tz::UTC)
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
}

#[test]
fn test_delay_at_middle_stop_shifts_only_that_stop() {
    let index = load_index(IndexMode::AllStops);
    let delays = delays(&encode_feed(vec![(
        "T1",
        vec![update("8501117:0:1", Some(300), Some(300))],
    )]));
    let joined = Reconciler::new(&index, &delays, day()).join();

    let t1 = joined.iter().find(|t| t.trip_id.as_str() == "T1").unwrap();
    let names: Vec<_> = t1.visits.iter().map(|v| v.stop_name.as_str()).collect();
    assert_eq!(names, ["Lausanne", "Renens VD", "Morges"]);
    assert_eq!(t1.visits[0].departure.unwrap().effective, at(8, 0));
    assert_eq!(t1.visits[1].arrival.unwrap().effective, at(8, 10));
    assert_eq!(t1.visits[2].arrival.unwrap().effective, at(8, 10));
}

#[test]
fn test_next_departure_over_loaded_directory() {
    let index = load_index(IndexMode::AllStops);
    let delays = delays(&encode_feed(vec![
        ("T1", vec![update("8501117:0:1", Some(300), Some(300))]),
        ("T3", vec![update("8501120:0:5", Some(0), Some(60))]),
    ]));
    let reconciler = Reconciler::new(&index, &delays, day());

    let next = reconciler
        .next_departure(at(8, 12), TripSelection::RealtimeConfirmed)
        .unwrap();
    assert_eq!(next.trip_id.as_str(), "T3");
    assert_eq!(next.stop_name, "Lausanne");
    assert_eq!(next.effective_time, at(8, 21));
    assert_eq!(next.delay_secs, 60);
}

#[test]
fn test_full_itinerary_excludes_short_turns() {
    let index = load_index(IndexMode::FullItinerary);
    let ids: Vec<_> = index.trips().map(|t| t.trip_id.as_str()).collect();
    assert_eq!(ids, ["T1", "T2"]);
}

#[test]
fn test_alert_scenario_any_stop_over_threshold() {
    let index = load_index(IndexMode::FullItinerary);
    let delays = delays(&encode_feed(vec![
        (
            "T1",
            vec![
                update("8501120:0:3", Some(90), Some(90)),
                update("8501117:0:1", Some(150), Some(150)),
            ],
        ),
        ("T2", vec![update("8501117:0:1", Some(60), None)]),
    ]));
    let alerts = Reconciler::new(&index, &delays, day()).delay_alerts(&AlertPolicy::default());

    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.trip_id.as_str(), "T1");
    assert_eq!(alert.start_stop, "Lausanne");
    assert_eq!(alert.end_stop, "Morges");
    let minutes: Vec<_> = alert.stops.iter().map(|s| s.whole_minutes()).collect();
    assert_eq!(minutes, [1, 2, 0]);
}

#[test]
fn test_empty_feed_yields_nothing_to_report() {
    let index = load_index(IndexMode::FullItinerary);
    let delays = delays(&encode_feed(vec![]));
    let reconciler = Reconciler::new(&index, &delays, day());

    assert!(
        reconciler
            .next_departure(at(7, 0), TripSelection::RealtimeConfirmed)
            .is_none()
    );
    assert!(reconciler.full_itinerary().is_empty());
    assert!(reconciler.delay_alerts(&AlertPolicy::default()).is_empty());
}

#[test]
fn test_unknown_line_is_a_resolution_error() {
    let dir = tempfile::tempdir().unwrap();
    write_gtfs(dir.path());
    let err = ScheduleTables::load_dir_for_line(dir.path(), &LineSelector::new("IR15", "11"))
        .unwrap_err();
    assert!(matches!(err, ScheduleResolutionError::NoMatchingRoute { .. }));
}

#[test]
fn test_corrupt_feed_is_rejected_whole() {
    let mut bytes = encode_feed(vec![("T1", vec![update("8501117", Some(60), None)])]);
    bytes.truncate(bytes.len() - 2);
    assert!(parse_delays(&bytes, &TripIdMatcher::identity()).is_err());
}
