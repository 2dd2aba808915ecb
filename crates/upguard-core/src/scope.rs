//! Scope identity: the application identifier every lock and probe is keyed by.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Maximum identity length in bytes
const MAX_IDENTITY_LEN: usize = 255;

/// Number of digest bytes kept in a resource key (32 hex chars)
const RESOURCE_KEY_BYTES: usize = 16;

/// Stable application identity, e.g. a reverse-domain bundle identifier.
///
/// The same identity in any process maps to the same lock file, beacon
/// socket and installation record; distinct identities never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeIdentity(String);

impl ScopeIdentity {
    /// Validate and wrap an identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidScope`] if the identity is empty, longer than
    /// 255 bytes, padded with whitespace, or contains control characters.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(Error::invalid_scope(raw, "must not be empty"));
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(Error::invalid_scope(
                raw,
                format!("must not exceed {MAX_IDENTITY_LEN} bytes"),
            ));
        }
        if raw.trim() != raw {
            return Err(Error::invalid_scope(
                raw,
                "must not have leading or trailing whitespace",
            ));
        }
        if raw.chars().any(char::is_control) {
            return Err(Error::invalid_scope(
                raw,
                "must not contain control characters",
            ));
        }

        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe key derived from the identity.
    ///
    /// Lowercase hex of the first 16 bytes of SHA-256, so it stays short
    /// enough for Unix socket paths whatever the identity looks like.
    #[must_use]
    pub fn resource_key(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..RESOURCE_KEY_BYTES])
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScopeIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ScopeIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ScopeIdentity> for String {
    fn from(value: ScopeIdentity) -> Self {
        value.0
    }
}

impl AsRef<str> for ScopeIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
