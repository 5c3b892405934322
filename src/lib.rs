//! Next-train lookup: joins a static GTFS schedule with a GTFS-RT delay
//! feed for one line and reports upcoming departures and delay alerts.
//!
//! The core ([`ids`], [`schedule`], [`realtime`], [`reconcile`]) is pure:
//! it takes already-loaded data and returns values. Fetching, caching,
//! rendering and notification live in [`fetch`], [`static_cache`],
//! [`output`] and [`notify`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod ids;
pub mod notify;
pub mod output;
pub mod parser;
pub mod realtime;
pub mod reconcile;
pub mod schedule;
pub mod static_cache;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
