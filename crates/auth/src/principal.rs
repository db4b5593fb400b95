//! Authenticated caller identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication failure at the request boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No caller identity was supplied with the request.
    #[error("missing caller identity")]
    MissingIdentity,
}

/// Pre-validated identity of the operator making an admin request.
///
/// The upstream auth check resolves credentials to a user id and forwards it
/// in the `x-user-id` header; this type guarantees the id is present and
/// non-empty, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Parse a caller id from the raw header value.
    ///
    /// An absent or empty value is an authorization failure, not a
    /// validation failure.
    pub fn parse(raw: Option<&str>) -> Result<Self, AuthError> {
        match raw {
            Some(s) if !s.trim().is_empty() => Ok(Self(s.trim().to_string())),
            _ => Err(AuthError::MissingIdentity),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CallerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
