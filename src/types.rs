//! Re-exported types from external crates for convenience.
//!
//! These types appear in the public API of this crate and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for timestamps in streamed entities.
pub use chrono::{DateTime, Utc};
/// Secret string type used for access tokens; redacts its value in debug output.
pub use secrecy::{ExposeSecret, SecretString};
/// Parsed URL type used for endpoint construction.
pub use url::Url;
