// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a fingerprint fails construction-time validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("Fingerprint cannot be empty")]
    Empty,
    #[error("Fingerprint contains whitespace: {0:?}")]
    Whitespace(String),
    #[error("Fingerprint exceeds {max} characters (got {got})")]
    TooLong { max: usize, got: usize },
}

const MAX_FINGERPRINT_LEN: usize = 256;

/// Opaque identifier of a built configuration artifact.
///
/// The core never interprets the format — a fingerprint is whatever the
/// build tool hands back (a store-path hash, a digest, a tag). Two
/// fingerprints are the same artifact iff the strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Result<Self, FingerprintError> {
        let value = value.into();
        if value.is_empty() {
            return Err(FingerprintError::Empty);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(FingerprintError::Whitespace(value));
        }
        if value.len() > MAX_FINGERPRINT_LEN {
            return Err(FingerprintError::TooLong {
                max: MAX_FINGERPRINT_LEN,
                got: value.len(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_opaque_strings() {
        let fp = Fingerprint::new("fp-AAA").unwrap();
        assert_eq!(fp.as_str(), "fp-AAA");
        assert_eq!(fp.to_string(), "fp-AAA");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(Fingerprint::new(""), Err(FingerprintError::Empty));
    }

    #[test]
    fn test_rejects_whitespace() {
        assert!(matches!(
            Fingerprint::new("abc def"),
            Err(FingerprintError::Whitespace(_))
        ));
    }

    #[test]
    fn test_rejects_oversized() {
        let long = "x".repeat(300);
        assert!(matches!(
            Fingerprint::new(long),
            Err(FingerprintError::TooLong { got: 300, .. })
        ));
    }

    #[test]
    fn test_equality_is_string_equality() {
        let a = Fingerprint::new("abc123").unwrap();
        let b = Fingerprint::new("abc123").unwrap();
        let c = Fingerprint::new("abc124").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
