//! Iglu URI parsing, formatting, and content addressing.
//!
//! An Iglu URI is the self-describing schema reference
//! `iglu:{vendor}/{name}/{format}/{version}`, where `version` follows the
//! `model-revision-addition` convention (e.g. `1-0-0`). The derived
//! [`hash`](IgluUri::hash) is the registry-scoped join key used to relate a
//! local file, a remote deployment, and a static manifest entry describing
//! the same schema family.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ResolverError;

/// A parsed `iglu:vendor/name/format/version` schema reference.
///
/// Serializes as a map of its four components so nested selectors can match
/// it structurally; the canonical string form comes from `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IgluUri {
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: String,
}

impl IgluUri {
    /// Parse a full Iglu URI string.
    ///
    /// The scheme must be exactly `iglu` with no further colon-delimited
    /// segments, and the path must split into exactly four slash-delimited
    /// segments.
    pub fn parse(uri: &str) -> Result<Self, ResolverError> {
        let mut pieces = uri.split(':');
        let scheme = pieces.next().unwrap_or_default();
        let path = pieces.next();

        if scheme != "iglu" || pieces.next().is_some() {
            return Err(ResolverError::invalid_uri(uri));
        }

        let path = path.ok_or_else(|| ResolverError::invalid_uri(uri))?;
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != 4 {
            return Err(ResolverError::invalid_uri(uri));
        }

        Ok(Self {
            vendor: parts[0].to_string(),
            name: parts[1].to_string(),
            format: parts[2].to_string(),
            version: parts[3].to_string(),
        })
    }

    /// Build a reference from parts, defaulting `format` and `version` to
    /// Iglu's conventional `jsonschema` / `1-0-0`.
    pub fn from_parts(
        vendor: impl Into<String>,
        name: impl Into<String>,
        format: Option<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            name: name.into(),
            format: format.unwrap_or_else(|| "jsonschema".to_string()),
            version: version.unwrap_or_else(|| "1-0-0".to_string()),
        }
    }

    /// Registry-scoped content address: hex SHA-256 of
    /// `{registry_id}-{vendor}-{name}-{format}`.
    ///
    /// Version and environment are excluded so that every version and
    /// environment of one schema family shares the same hash.
    pub fn hash(&self, registry_id: &str) -> String {
        let mut sha256 = Sha256::new();
        sha256.update([registry_id, &self.vendor, &self.name, &self.format].join("-"));
        hex::encode(sha256.finalize())
    }
}

impl fmt::Display for IgluUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iglu:{}/{}/{}/{}",
            self.vendor, self.name, self.format, self.version
        )
    }
}

impl FromStr for IgluUri {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
