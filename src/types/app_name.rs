// ABOUTME: DNS-compatible application name validation.
// ABOUTME: Names cloud resources, systemd units, and containers after the deployed app.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppNameError {
    #[error("app name cannot be empty")]
    Empty,

    #[error("app name exceeds maximum length of 40 characters")]
    TooLong,

    #[error("app name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("app name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("app name must be lowercase")]
    NotLowercase,

    #[error("invalid character in app name: '{0}'")]
    InvalidChar(char),
}

/// Kept well under the 63-character DNS label limit so that provider-side
/// suffixes (`-sg`, `-fn`, random postfixes) still fit.
const MAX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppName(String);

impl AppName {
    pub fn new(value: &str) -> Result<Self, AppNameError> {
        if value.is_empty() {
            return Err(AppNameError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(AppNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(AppNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(AppNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(AppNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(AppNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    /// Derive a valid name from arbitrary text such as a repository directory.
    ///
    /// Lowercases, maps runs of other characters to a single hyphen, trims
    /// hyphens and truncates. Falls back to `app` when nothing usable remains.
    pub fn derive(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                out.push(c);
            } else if !out.ends_with('-') {
                out.push('-');
            }
        }
        out.truncate(MAX_LEN);
        let trimmed = out.trim_matches('-');

        match Self::new(trimmed) {
            Ok(name) => name,
            Err(_) => Self("app".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AppName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AppName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AppName::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_labels() {
        assert!(AppName::new("hello-world").is_ok());
        assert!(AppName::new("app2").is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(matches!(AppName::new(""), Err(AppNameError::Empty)));
        assert!(matches!(AppName::new("-x"), Err(AppNameError::StartsWithHyphen)));
        assert!(matches!(AppName::new("x-"), Err(AppNameError::EndsWithHyphen)));
        assert!(matches!(AppName::new("Hello"), Err(AppNameError::NotLowercase)));
        assert!(matches!(AppName::new("a_b"), Err(AppNameError::InvalidChar('_'))));
        assert!(matches!(
            AppName::new(&"a".repeat(41)),
            Err(AppNameError::TooLong)
        ));
    }

    #[test]
    fn derive_sanitizes_repository_names() {
        assert_eq!(AppName::derive("Hello_World.git").as_str(), "hello-world-git");
        assert_eq!(AppName::derive("__").as_str(), "app");
        assert_eq!(AppName::derive(&"x".repeat(80)).as_str().len(), 40);
    }
}
