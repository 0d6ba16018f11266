// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! YAML configuration for the collector binary
//!
//! The file is read once at startup and resolved into plain values that
//! are passed to the orchestrator. Nothing reads configuration after that.

use anyhow::{Context, Result, anyhow};
use collector::{
    DEFAULT_TIME_ZONE, Endpoint, RenameResolution, RunOptions, Secret, ServerProfile, StoreConfig,
    Tz, parse_time_zone,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "collector.yaml";

const TEST_ENVIRONMENT: &str = "test";

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Servers to collect from; empty means every configured server
    #[serde(default)]
    pub active_servers: Vec<String>,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub upload_sample_files: bool,

    /// Pause between files, e.g. `1s` or `500ms`
    #[serde(default = "default_pacing")]
    pub pacing: String,

    /// Bound on streaming one file into the store
    #[serde(default = "default_write_timeout")]
    pub write_timeout: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,

    #[serde(default)]
    pub sample_upload: Option<SampleUpload>,
}

/// One remote server as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: Secret,

    #[serde(default)]
    pub source_dir: String,

    #[serde(default)]
    pub primary_dir: String,

    #[serde(default)]
    pub secondary_dirs: Vec<String>,

    #[serde(default)]
    pub filename_regex: Option<String>,

    #[serde(default)]
    pub rename_files: bool,

    /// Defaults to the server name
    #[serde(default)]
    pub rename_prefix: Option<String>,

    #[serde(default)]
    pub rename_resolution: RenameResolution,

    #[serde(default)]
    pub delete_after_download: bool,
}

/// Test server and files used to seed a test environment
#[derive(Debug, Clone, Deserialize)]
pub struct SampleUpload {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    pub password: Secret,

    #[serde(default)]
    pub files: Vec<SampleFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SampleFile {
    pub local: PathBuf,
    pub remote: String,
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_environment() -> String {
    TEST_ENVIRONMENT.to_string()
}

fn default_pacing() -> String {
    "1s".to_string()
}

fn default_write_timeout() -> String {
    "20s".to_string()
}

fn default_port() -> u16 {
    22
}

impl SampleUpload {
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            secret: self.password.clone(),
        }
    }
}

impl ServerConfig {
    /// Resolve into the profile a collection run consumes
    #[must_use]
    pub fn to_profile(&self, name: &str) -> ServerProfile {
        let endpoint = Endpoint {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            secret: self.password.clone(),
        };
        let mut profile =
            ServerProfile::new(name, endpoint, self.source_dir.as_str(), self.primary_dir.as_str());
        profile.secondary_destination_dirs = self.secondary_dirs.clone();
        profile.filename_filter = self.filename_regex.clone();
        profile.rename_enabled = self.rename_files;
        profile.rename_prefix = Some(
            self.rename_prefix
                .clone()
                .unwrap_or_else(|| name.to_string()),
        );
        profile.rename_resolution = self.rename_resolution;
        profile.delete_on_success = self.delete_after_download;
        profile
    }
}

impl CollectorConfig {
    /// Servers to collect from: `active_servers` as listed, else all by name
    #[must_use]
    pub fn active_server_names(&self) -> Vec<String> {
        if self.active_servers.is_empty() {
            self.servers.keys().cloned().collect()
        } else {
            self.active_servers.clone()
        }
    }

    pub fn resolved_time_zone(&self) -> Result<Tz> {
        Ok(parse_time_zone(&self.time_zone)?)
    }

    pub fn run_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            pacing: parse_setting("pacing", &self.pacing)?,
            write_timeout: parse_setting("write_timeout", &self.write_timeout)?,
        })
    }

    /// Whether sample files are uploaded before collecting
    #[must_use]
    pub fn seeding_enabled(&self) -> bool {
        self.environment == TEST_ENVIRONMENT && self.upload_sample_files
    }

    /// Profiles for the active servers, narrowed to `only` when non-empty
    pub fn profiles(&self, only: &[String]) -> Result<Vec<ServerProfile>> {
        let active = self.active_server_names();
        if let Some(unknown) = only.iter().find(|name| !active.contains(*name)) {
            anyhow::bail!("Server {unknown} is not an active server");
        }

        active
            .iter()
            .filter(|name| only.is_empty() || only.contains(*name))
            .map(|name| {
                self.servers
                    .get(name)
                    .map(|server| server.to_profile(name))
                    .ok_or_else(|| anyhow!("Active server {name} is not configured"))
            })
            .collect()
    }
}

fn parse_setting(field: &str, value: &str) -> Result<Duration> {
    parse_duration::parse(value).map_err(|e| anyhow!("Invalid {field} {value:?}: {e}"))
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CollectorConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<CollectorConfig> {
    let config: CollectorConfig =
        serde_yaml_ng::from_str(content).with_context(|| "Failed to parse YAML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that make the whole process pointless to start
///
/// Problems confined to one server are left to the orchestrator, which
/// skips just that server.
pub(crate) fn validate_config(config: &CollectorConfig) -> Result<()> {
    let active = config.active_server_names();
    if active.is_empty() {
        anyhow::bail!("At least one server must be configured");
    }
    let mut seen = BTreeSet::new();
    for name in &active {
        if !config.servers.contains_key(name) {
            anyhow::bail!("Active server {name} is not configured");
        }
        if !seen.insert(name.as_str()) {
            anyhow::bail!("Active server {name} is listed more than once");
        }
    }

    if config.store.url.trim().is_empty() {
        anyhow::bail!("store.url cannot be empty");
    }

    _ = config
        .resolved_time_zone()
        .with_context(|| "Invalid time_zone")?;
    _ = config.run_options()?;

    if config.seeding_enabled() && config.sample_upload.is_none() {
        anyhow::bail!("upload_sample_files is set but sample_upload is missing");
    }

    Ok(())
}
