// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Remote file server capability
//!
//! The pipeline only needs to list a directory, stream a file, and remove a
//! file. Seeding test servers additionally needs `write`.

use crate::error::SessionError;
use crate::profile::Endpoint;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Streaming reader over a remote file
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub name: String,
    pub is_directory: bool,
}

impl RemoteFileEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
        }
    }
}

/// An authenticated session with one remote file server
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Entries of `dir` in the order the server reports them
    async fn list(&self, dir: &str) -> Result<Vec<RemoteFileEntry>, SessionError>;

    /// Open `path` for a single streaming read
    async fn open(&self, path: &str) -> Result<RemoteReader, SessionError>;

    async fn remove(&self, path: &str) -> Result<(), SessionError>;

    /// Upload a local file, creating missing parent directories
    async fn write(&self, local: &Path, remote: &str) -> Result<(), SessionError>;
}

/// Establishes sessions from connection settings
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteSession>, SessionError>;
}

/// Join a remote directory and an entry name with a single `/`
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
