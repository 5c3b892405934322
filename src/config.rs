//! Run configuration, read once from the environment (and `.env`).
//!
//! Everything the core needs is turned into explicit values here
//! ([`IndexQuery`], [`TripIdMatcher`], [`AlertPolicy`], a time zone) so the
//! index builder and the reconciler never read ambient state.

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::ids::TripIdMatcher;
use crate::reconcile::AlertPolicy;
use crate::schedule::{IndexMode, IndexQuery, LineSelector};

pub const DEFAULT_CACHE_DIR: &str = "gtfs_static_data";

/// Separator between names in `STOP_NAMES`; stop names may contain commas.
pub const STOP_NAME_SEPARATOR: char = ';';

/// Where the static archive comes from and where it is unpacked.
///
/// Read on its own so `sync` works without any line settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticSource {
    pub url: Option<String>,
    pub cache_dir: PathBuf,
}

impl StaticSource {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: non_blank(&lookup, "GTFS_STATIC_URL"),
            cache_dir: non_blank(&lookup, "GTFS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
        }
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub static_source: StaticSource,
    pub realtime_url: Option<String>,
    pub token: Option<String>,
    pub line: LineSelector,
    pub stop_names: BTreeSet<String>,
    pub alert_policy: AlertPolicy,
    pub timezone: Tz,
    pub trip_id_matcher: TripIdMatcher,
    pub webhook_url: Option<String>,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| non_blank(&lookup, key);

        let line_name = get("LINE_NAME").context("LINE_NAME must be set")?;
        let agency_id = get("AGENCY_ID")
            .or_else(|| get("CFF_ID"))
            .context("AGENCY_ID (or CFF_ID) must be set")?;

        let stop_names = get("STOP_NAMES")
            .map(|raw| {
                raw.split(STOP_NAME_SEPARATOR)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let alert_policy = match get("ALERT_THRESHOLD_SECS") {
            Some(raw) => AlertPolicy {
                threshold_secs: raw
                    .parse()
                    .with_context(|| format!("ALERT_THRESHOLD_SECS is not an integer: {raw:?}"))?,
            },
            None => AlertPolicy::default(),
        };
        if alert_policy.threshold_secs < 0 {
            bail!("ALERT_THRESHOLD_SECS must not be negative");
        }

        let timezone = match get("TIMEZONE") {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("TIMEZONE {raw:?} is not an IANA zone: {e}"))?,
            None => chrono_tz::UTC,
        };

        Ok(Self {
            static_source: StaticSource::from_lookup(&lookup),
            realtime_url: get("GTFS_RT_URL"),
            token: get("TOKEN"),
            line: LineSelector::new(line_name, agency_id),
            stop_names,
            alert_policy,
            timezone,
            trip_id_matcher: TripIdMatcher {
                strip_prefix: get("RT_TRIP_ID_PREFIX"),
                strip_suffix: get("RT_TRIP_ID_SUFFIX"),
            },
            webhook_url: get("WEBHOOK_URL"),
        })
    }

    /// The index query for `mode`.
    ///
    /// Full itineraries need a start and an end, so at least two monitored
    /// stop names are required in that mode.
    pub fn index_query(&self, mode: IndexMode) -> Result<IndexQuery> {
        if mode == IndexMode::FullItinerary && self.stop_names.len() < 2 {
            bail!(
                "STOP_NAMES must list at least two stops separated by '{STOP_NAME_SEPARATOR}'"
            );
        }
        Ok(IndexQuery {
            line: self.line.clone(),
            target_stop_names: self.stop_names.clone(),
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = config(&[("LINE_NAME", "S3"), ("CFF_ID", "11")]).unwrap();
        assert_eq!(cfg.line, LineSelector::new("S3", "11"));
        assert_eq!(cfg.alert_policy.threshold_secs, 120);
        assert_eq!(cfg.timezone, chrono_tz::UTC);
        assert_eq!(cfg.trip_id_matcher, TripIdMatcher::identity());
        assert_eq!(cfg.static_source.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
        assert!(cfg.token.is_none());
        assert!(cfg.stop_names.is_empty());
    }

    #[test]
    fn test_missing_line_name_is_rejected() {
        let err = config(&[("AGENCY_ID", "11")]).unwrap_err();
        assert!(err.to_string().contains("LINE_NAME"));
    }

    #[test]
    fn test_static_source_needs_no_line_settings() {
        let vars: HashMap<&str, &str> = [
            ("GTFS_STATIC_URL", "https://data.example.org/gtfs/latest.zip"),
            ("GTFS_CACHE_DIR", "/var/cache/gtfs"),
        ]
        .into();
        let source = StaticSource::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(
            source.url.as_deref(),
            Some("https://data.example.org/gtfs/latest.zip")
        );
        assert_eq!(source.cache_dir, PathBuf::from("/var/cache/gtfs"));

        let empty = StaticSource::from_lookup(|_| None);
        assert_eq!(empty.url, None);
        assert_eq!(empty.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let cfg = config(&[("LINE_NAME", "S3"), ("AGENCY_ID", "11"), ("TOKEN", "  ")]).unwrap();
        assert!(cfg.token.is_none());
    }

    #[test]
    fn test_stop_names_are_split_and_trimmed() {
        let cfg = config(&[
            ("LINE_NAME", "S3"),
            ("AGENCY_ID", "11"),
            ("STOP_NAMES", "Lausanne; Renens VD ;;Morges"),
        ])
        .unwrap();
        let names: Vec<_> = cfg.stop_names.iter().map(String::as_str).collect();
        assert_eq!(names, ["Lausanne", "Morges", "Renens VD"]);
        assert!(cfg.index_query(IndexMode::FullItinerary).is_ok());
    }

    #[test]
    fn test_full_itinerary_needs_two_stops() {
        let cfg = config(&[("LINE_NAME", "S3"), ("AGENCY_ID", "11"), ("STOP_NAMES", "Morges")])
            .unwrap();
        assert!(cfg.index_query(IndexMode::FullItinerary).is_err());
        assert!(cfg.index_query(IndexMode::AllStops).is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = [("LINE_NAME", "S3"), ("AGENCY_ID", "11")];
        let with = |extra: (&'static str, &'static str)| {
            let mut vars = base.to_vec();
            vars.push(extra);
            config(&vars)
        };
        assert!(with(("ALERT_THRESHOLD_SECS", "two minutes")).is_err());
        assert!(with(("ALERT_THRESHOLD_SECS", "-5")).is_err());
        assert!(with(("TIMEZONE", "Mars/Olympus")).is_err());
        assert_eq!(
            with(("TIMEZONE", "Europe/Zurich")).unwrap().timezone,
            chrono_tz::Europe::Zurich
        );
    }

    #[test]
    fn test_trip_id_affixes_feed_the_matcher() {
        let cfg = config(&[
            ("LINE_NAME", "S3"),
            ("AGENCY_ID", "11"),
            ("RT_TRIP_ID_PREFIX", "ch:1:sjyid:"),
        ])
        .unwrap();
        assert_eq!(cfg.trip_id_matcher.canonical("ch:1:sjyid:42").as_str(), "42");
    }
}
