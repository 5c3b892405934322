//! Identifiers shared by the static and realtime sides of the join.
//!
//! All identifiers use `Arc<str>` so trips and stop visits can be cloned
//! into output rows without copying strings.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Separates a stop's base code from its platform or track suffix,
/// as in `8501120:0:3`.
pub const PLATFORM_DELIMITER: char = ':';

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }
    };
}

impl_identifier!(StopId);
impl_identifier!(TripId);
impl_identifier!(RouteId);

/// Maps a raw stop id to its platform-independent base code.
///
/// `"8501120:0:3"` and `"8501120"` both become `"8501120"`. Ids without a
/// delimiter are returned unchanged, so the function is total and
/// idempotent.
pub fn normalize_stop_id(raw: &str) -> StopId {
    match raw.split_once(PLATFORM_DELIMITER) {
        Some((base, _platform)) => StopId::new(base),
        None => StopId::new(raw),
    }
}

/// Rewrites realtime trip ids into the form used by the static schedule.
///
/// Some producers decorate realtime trip ids (for example a feed-specific
/// prefix) that `trips.txt` does not carry. The default matcher is the
/// identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TripIdMatcher {
    pub strip_prefix: Option<String>,
    pub strip_suffix: Option<String>,
}

impl TripIdMatcher {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Returns the static-schedule trip id for a realtime trip id.
    ///
    /// Affixes that are configured but absent leave the id untouched.
    pub fn canonical(&self, raw: &str) -> TripId {
        let mut id = raw;
        if let Some(prefix) = self.strip_prefix.as_deref() {
            id = id.strip_prefix(prefix).unwrap_or(id);
        }
        if let Some(suffix) = self.strip_suffix.as_deref() {
            id = id.strip_suffix(suffix).unwrap_or(id);
        }
        TripId::new(id)
    }
}
