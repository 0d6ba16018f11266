// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-server collection settings

use crate::error::ConfigError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A credential that must not end up in logs
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Access the actual value, for handing to an authentication call
    #[must_use]
    pub fn as_declassified(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Timestamp precision used when generating renamed output files
///
/// `Seconds` reproduces the historical names, and two files renamed within
/// the same second collide. `Nanoseconds` appends the sub-second fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameResolution {
    #[default]
    Seconds,
    Nanoseconds,
}

/// Where and how to reach one remote file server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: Secret,
}

impl Endpoint {
    /// `host:port`, as used in connection messages
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for one configured remote server
///
/// Owned by exactly one collection run and never modified once it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerProfile {
    pub name: String,
    pub endpoint: Endpoint,
    pub source_directory: String,
    pub primary_destination_dir: String,
    pub secondary_destination_dirs: Vec<String>,
    pub filename_filter: Option<String>,
    pub rename_enabled: bool,
    pub rename_prefix: Option<String>,
    pub rename_resolution: RenameResolution,
    pub delete_on_success: bool,
}

impl ServerProfile {
    /// A profile with no filter, no rename, no secondaries and no deletion
    pub fn new(
        name: impl Into<String>,
        endpoint: Endpoint,
        source_directory: impl Into<String>,
        primary_destination_dir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            source_directory: source_directory.into(),
            primary_destination_dir: primary_destination_dir.into(),
            secondary_destination_dirs: Vec::new(),
            filename_filter: None,
            rename_enabled: false,
            rename_prefix: None,
            rename_resolution: RenameResolution::default(),
            delete_on_success: false,
        }
    }

    /// Check the conditions that gate whether a run is safe to attempt
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_directory.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "source_directory",
            });
        }
        if self.primary_destination_dir.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "primary_destination_dir",
            });
        }
        if self.rename_enabled && self.rename_prefix().is_none() {
            return Err(ConfigError::MissingRenamePrefix);
        }
        if let Some(pattern) = self.filter_pattern() {
            _ = regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidFilter {
                pattern: pattern.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// The filter pattern, treating an empty string as "no filter"
    #[must_use]
    pub fn filter_pattern(&self) -> Option<&str> {
        self.filename_filter
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
    }

    /// The rename prefix, treating blank as absent
    #[must_use]
    pub fn rename_prefix(&self) -> Option<&str> {
        self.rename_prefix
            .as_deref()
            .filter(|prefix| !prefix.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ServerProfile {
        let endpoint = Endpoint {
            host: "sftp.example".to_string(),
            port: 22,
            user: "collector".to_string(),
            secret: Secret::new("hunter2"),
        };
        ServerProfile::new("airgate", endpoint, "/outgoing", "import/airgate")
    }

    #[test]
    fn test_valid_profile() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn test_empty_source_directory() {
        let mut p = profile();
        p.source_directory = "  ".to_string();
        assert!(matches!(
            p.validate(),
            Err(ConfigError::MissingField {
                field: "source_directory"
            })
        ));
    }

    #[test]
    fn test_empty_primary_destination() {
        let mut p = profile();
        p.primary_destination_dir = String::new();
        assert!(matches!(
            p.validate(),
            Err(ConfigError::MissingField {
                field: "primary_destination_dir"
            })
        ));
    }

    #[test]
    fn test_rename_requires_prefix() {
        let mut p = profile();
        p.rename_enabled = true;
        assert!(matches!(p.validate(), Err(ConfigError::MissingRenamePrefix)));

        p.rename_prefix = Some(" ".to_string());
        assert!(matches!(p.validate(), Err(ConfigError::MissingRenamePrefix)));

        p.rename_prefix = Some("airgate".to_string());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_prefix_without_rename_is_fine() {
        let mut p = profile();
        p.rename_prefix = Some("unused".to_string());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_bad_filter_rejected() {
        let mut p = profile();
        p.filename_filter = Some("^F(2021".to_string());
        assert!(matches!(p.validate(), Err(ConfigError::InvalidFilter { .. })));
    }

    #[test]
    fn test_empty_filter_means_none() {
        let mut p = profile();
        p.filename_filter = Some(String::new());
        assert_eq!(p.filter_pattern(), None);
    }

    #[test]
    fn test_secret_is_redacted() {
        let p = profile();
        let rendered = format!("{p:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(p.endpoint.secret.as_declassified(), "hunter2");
    }
}
