// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Replicating one remote file into the archive
//!
//! The file is read from the remote server exactly once, into the primary
//! key. Every secondary key is then produced by a store-internal copy of the
//! primary object, in order. Nothing is rolled back on failure: a primary
//! copy may exist without all of its archival siblings, and the caller must
//! not delete the source unless [`Replicator::replicate`] returned `Ok`.

use crate::error::TransferError;
use crate::session::RemoteSession;
use crate::store::{ArchiveStore, join_key};
use diagnostics::*;
use std::time::Duration;

/// Default bound on streaming one file into the primary key
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Destination keys for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationTarget {
    pub primary_key: String,
    pub secondary_keys: Vec<String>,
}

impl ReplicationTarget {
    /// Primary key under `primary_dir` with the output name; secondary keys
    /// under each secondary dir keep the original name
    #[must_use]
    pub fn new(
        primary_dir: &str,
        output_name: &str,
        secondary_dirs: &[String],
        original_name: &str,
    ) -> Self {
        Self {
            primary_key: join_key(primary_dir, output_name),
            secondary_keys: secondary_dirs
                .iter()
                .map(|dir| join_key(dir, original_name))
                .collect(),
        }
    }
}

/// Performs the primary write and the secondary copies for a file
#[derive(Debug, Clone, Copy)]
pub struct Replicator {
    write_timeout: Duration,
}

impl Default for Replicator {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_TIMEOUT)
    }
}

impl Replicator {
    #[must_use]
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Replicate `source_path` to every key in `target`
    ///
    /// Returns the number of bytes written to the primary key.
    pub async fn replicate(
        &self,
        session: &dyn RemoteSession,
        store: &dyn ArchiveStore,
        source_path: &str,
        target: &ReplicationTarget,
    ) -> Result<u64, TransferError> {
        let reader = session
            .open(source_path)
            .await
            .map_err(|source| TransferError::Open {
                path: source_path.to_string(),
                source,
            })?;

        let primary_key = target.primary_key.as_str();
        let written = store
            .write(primary_key, reader, self.write_timeout)
            .await
            .map_err(|source| TransferError::PrimaryWrite {
                key: primary_key.to_string(),
                source,
            })?;
        debug!("Wrote {written} bytes from {source_path} to {primary_key}",
            written: written, source_path: source_path, primary_key: primary_key);

        for key in &target.secondary_keys {
            store
                .copy(primary_key, key)
                .await
                .map_err(|source| TransferError::SecondaryWrite {
                    from: primary_key.to_string(),
                    key: key.clone(),
                    source,
                })?;
            debug!("Copied {primary_key} to {key}", primary_key: primary_key, key: key.as_str());
        }

        Ok(written)
    }
}
