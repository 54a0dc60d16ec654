//! Error taxonomy for schema discovery and resolution.
//!
//! Failures local to one file, one registry, or one network call degrade to
//! "that source contributes nothing" and are logged where they occur. Only
//! three operations report errors to callers: identifier parsing, fetching
//! a single descriptor's body, and aggregate resolution.

use thiserror::Error;

/// Errors surfaced by the resolver's public operations.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The string is not a well-formed `iglu:vendor/name/format/version`
    /// reference.
    #[error("invalid iglu uri: {uri}")]
    InvalidUri { uri: String },

    /// A JSON document lacks a `self` section with string
    /// `vendor`/`name`/`format`/`version` members.
    #[error("document is not a self-describing schema")]
    InvalidShape,

    /// Fetching one schema body from its backing registry failed.
    #[error("failed to fetch {uri} from registry {registry}: {message}")]
    Fetch {
        uri: String,
        registry: String,
        message: String,
    },

    /// No descriptor matched the request, or every matching candidate
    /// failed to fetch.
    #[error("no matching schema could be resolved")]
    NoMatchingSchema,

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl ResolverError {
    pub(crate) fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri { uri: uri.into() }
    }
}
