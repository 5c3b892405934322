//! Credential injection for feeds that need it.

mod api_key;

pub use api_key::ApiKey;
