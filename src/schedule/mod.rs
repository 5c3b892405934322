//! Static GTFS schedule: typed tables, service times and the trip index.

pub mod index;
pub mod tables;
pub mod time;

pub use index::{
    IndexMode, IndexQuery, LineSelector, ScheduleIndex, ScheduledStop, Trip, build_index,
    resolve_route_ids,
};
pub use tables::ScheduleTables;
pub use time::{ServiceDay, ServiceTime};
