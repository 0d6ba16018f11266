// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Collector: moves files from remote SFTP servers into an archive store
//!
//! A [`CollectionRun`] lists one server's source directory, decides per file
//! whether and under which name to keep it ([`FileNamePolicy`]), streams it
//! into a primary key and copies it to any secondary keys ([`Replicator`]),
//! then optionally removes the source. The [`Orchestrator`] runs one
//! collection per configured server concurrently.
//!
//! Remote servers and the store are reached through the [`RemoteSession`]
//! and [`ArchiveStore`] traits; [`testing`] has in-memory versions of both.

pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod profile;
pub mod replicate;
pub mod run;
pub mod session;
pub mod store;
pub mod testing;

pub use error::{
    CollectorError, ConfigError, SessionError, StoreError, TransferError, TransferStage,
};
pub use orchestrator::{Orchestrator, OrchestratorReport, ServerReport, ServerStatus};
pub use policy::{
    Clock, DEFAULT_TIME_ZONE, FileNamePolicy, FixedClock, NameDecision, RenameRule, SystemClock,
    parse_time_zone,
};
pub use profile::{Endpoint, RenameResolution, Secret, ServerProfile};
pub use replicate::{DEFAULT_WRITE_TIMEOUT, ReplicationTarget, Replicator};
pub use run::{CollectionRun, DEFAULT_PACING, FileOutcome, RunOptions, RunOutcome, RunReport};
pub use session::{RemoteFileEntry, RemoteReader, RemoteSession, SessionConnector, join_path};
pub use store::{
    ArchiveStore, DEFAULT_STORE_URL, ObjectArchive, StoreConfig, build_object_store, join_key,
};

/// Time zone type used for rename timestamps
pub use chrono_tz::Tz;
