//! Secret handling.
//!
//! Re-exports the secrecy types used for store URLs, so callers building a
//! [`Config`](super::Config) by hand do not need a direct dependency.

pub use secrecy::{ExposeSecret, SecretString};

/// Wrap a store URL, e.g. one read from a vault rather than the environment.
pub fn store_url(url: impl Into<String>) -> SecretString {
    SecretString::from(url.into())
}
