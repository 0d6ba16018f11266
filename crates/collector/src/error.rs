// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for collection runs
//!
//! Each enum belongs to one boundary: the remote session, the archive store,
//! profile validation, a single file transfer, and a whole server profile.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::RemoteSession`] or its connector
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid connection parameters: {0}")]
    InvalidEndpoint(String),

    #[error("Connection to {addr} failed: {message}")]
    Connect { addr: String, message: String },

    #[error("Authentication failed for {user}@{addr}: {message}")]
    Auth {
        user: String,
        addr: String,
        message: String,
    },

    #[error("Remote file error at {path}: {message}")]
    Protocol { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl SessionError {
    pub fn protocol(path: impl Into<String>, message: impl fmt::Display) -> Self {
        SessionError::Protocol {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Failures reported by an [`crate::ArchiveStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Write to {key} did not finish within {timeout:?}")]
    Timeout { key: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Problems with a server profile that make its run unsafe to attempt
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    MissingField { field: &'static str },

    #[error("rename_prefix is required when rename_enabled is set")]
    MissingRenamePrefix,

    #[error("Invalid filename filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown time zone {0:?}")]
    InvalidTimeZone(String),
}

/// The step of a file transfer that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Open,
    PrimaryWrite,
    SecondaryWrite,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Open => "open",
            TransferStage::PrimaryWrite => "primary_write",
            TransferStage::SecondaryWrite => "secondary_write",
        };
        f.write_str(name)
    }
}

/// Failure replicating one source file
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("Failed to write primary copy {key}: {source}")]
    PrimaryWrite {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to copy {from} to secondary {key}: {source}")]
    SecondaryWrite {
        from: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl TransferError {
    #[must_use]
    pub fn stage(&self) -> TransferStage {
        match self {
            TransferError::Open { .. } => TransferStage::Open,
            TransferError::PrimaryWrite { .. } => TransferStage::PrimaryWrite,
            TransferError::SecondaryWrite { .. } => TransferStage::SecondaryWrite,
        }
    }

    /// The source path or destination key the failing stage was working on
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            TransferError::Open { path, .. } => path,
            TransferError::PrimaryWrite { key, .. } | TransferError::SecondaryWrite { key, .. } => {
                key
            }
        }
    }
}

/// Failures at the server-profile boundary
///
/// `Config` and `Connection` skip the profile, `List` aborts its run.
/// `Transfer` and `Delete` are absorbed per file and only appear here so
/// callers can classify a logged failure.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Invalid configuration for {server}: {source}")]
    Config {
        server: String,
        #[source]
        source: ConfigError,
    },

    #[error("Cannot connect to {server}: {source}")]
    Connection {
        server: String,
        #[source]
        source: SessionError,
    },

    #[error("Cannot list {dir} on {server}: {source}")]
    List {
        server: String,
        dir: String,
        #[source]
        source: SessionError,
    },

    #[error("Transfer failed on {server}: {source}")]
    Transfer {
        server: String,
        #[source]
        source: TransferError,
    },

    #[error("Cannot delete {path} on {server}: {source}")]
    Delete {
        server: String,
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("Collection task for {server} failed: {message}")]
    Task { server: String, message: String },
}
