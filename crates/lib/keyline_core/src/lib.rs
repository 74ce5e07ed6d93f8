//! # keyline_core
//!
//! Core domain logic for Keyline: identities, sessions, access-token
//! issuance, and external (OAuth) account linking.

pub mod auth;
pub mod db;
pub mod external;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

#[cfg(feature = "test-utils")]
pub mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
