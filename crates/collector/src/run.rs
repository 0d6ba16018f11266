// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One collection pass over one server's source directory
//!
//! The run lists the directory once and walks the entries in listing order.
//! Files are processed one at a time with a fixed pause between them.
//! A failing file is logged and skipped, never ending the run; only a
//! failed listing does that.
//!
//! Deleting a replicated source file is dispatched to a background task
//! and not awaited by the file loop. The run collects those tasks before
//! it returns so the session outlives every delete it started.

use crate::error::{CollectorError, SessionError, TransferError, TransferStage};
use crate::policy::{Clock, FileNamePolicy};
use crate::profile::ServerProfile;
use crate::replicate::{DEFAULT_WRITE_TIMEOUT, ReplicationTarget, Replicator};
use crate::session::{RemoteSession, join_path};
use crate::store::ArchiveStore;
use diagnostics::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Default pause between two files of the same run
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Timing knobs shared by every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub pacing: Duration,
    pub write_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// What happened to one listed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Primary and all secondary copies written
    Replicated { primary_key: String, bytes: u64 },
    /// Not in scope: filter mismatch or a directory
    FilteredOut,
    /// Transfer failed at `stage`; the source was left in place
    ReplicationFailed { stage: TransferStage, reason: String },
    /// Replicated, but the source could not be removed
    DeleteFailed { primary_key: String, reason: String },
}

/// Outcome for one entry of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub name: String,
    pub outcome: RunOutcome,
}

/// Summary of one run, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub server: String,
    pub outcomes: Vec<FileOutcome>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    /// Files whose replication succeeded, including those whose delete failed
    #[must_use]
    pub fn replicated(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                RunOutcome::Replicated { .. } | RunOutcome::DeleteFailed { .. }
            )
        })
    }

    #[must_use]
    pub fn filtered(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::FilteredOut))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::ReplicationFailed { .. }))
    }

    #[must_use]
    pub fn delete_failed(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::DeleteFailed { .. }))
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&RunOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.outcome)
    }
}

/// A dispatched delete: index into the outcomes, source path, result
type DeleteResult = (usize, String, Result<(), SessionError>);

/// A single pass over one server profile
pub struct CollectionRun {
    profile: ServerProfile,
    policy: FileNamePolicy,
    session: Arc<dyn RemoteSession>,
    store: Arc<dyn ArchiveStore>,
    clock: Arc<dyn Clock>,
    options: RunOptions,
}

impl CollectionRun {
    #[must_use]
    pub fn new(
        profile: ServerProfile,
        policy: FileNamePolicy,
        session: Arc<dyn RemoteSession>,
        store: Arc<dyn ArchiveStore>,
        clock: Arc<dyn Clock>,
        options: RunOptions,
    ) -> Self {
        Self {
            profile,
            policy,
            session,
            store,
            clock,
            options,
        }
    }

    /// Process every entry of the source directory
    ///
    /// Returns `Err` only when the directory cannot be listed.
    pub async fn run(self) -> Result<RunReport, CollectorError> {
        let server = self.profile.name.as_str();
        let source_dir = self.profile.source_directory.as_str();

        let entries = self
            .session
            .list(source_dir)
            .await
            .map_err(|source| CollectorError::List {
                server: server.to_string(),
                dir: source_dir.to_string(),
                source,
            })?;
        let entry_count = entries.len();
        info!("Listed {entry_count} entries in {source_dir} on {server}",
            entry_count: entry_count, source_dir: source_dir, server: server);

        let replicator = Replicator::new(self.options.write_timeout);
        let mut report = RunReport {
            server: server.to_string(),
            outcomes: Vec::with_capacity(entry_count),
        };
        let mut deletes: JoinSet<DeleteResult> = JoinSet::new();
        let mut attempted = 0usize;

        for entry in entries {
            let name = entry.name;
            if entry.is_directory {
                debug!("Skipping directory {name} on {server}", name: name.as_str(), server: server);
                report.outcomes.push(FileOutcome {
                    name,
                    outcome: RunOutcome::FilteredOut,
                });
                continue;
            }

            if !self.policy.matches(&name) {
                report.outcomes.push(FileOutcome {
                    name,
                    outcome: RunOutcome::FilteredOut,
                });
                continue;
            }

            if attempted > 0 && !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }
            attempted += 1;

            // Stamp after the pause
            let output_name = self.policy.output_name(&name, self.clock.now());

            let source_path = join_path(source_dir, &name);
            let target = ReplicationTarget::new(
                &self.profile.primary_destination_dir,
                &output_name,
                &self.profile.secondary_destination_dirs,
                &name,
            );

            let outcome = match replicator
                .replicate(self.session.as_ref(), self.store.as_ref(), &source_path, &target)
                .await
            {
                Ok(bytes) => {
                    let primary_key = target.primary_key.as_str();
                    info!("Replicated {source_path} to {primary_key} ({bytes} bytes) on {server}",
                        source_path: source_path.as_str(), primary_key: primary_key, bytes: bytes, server: server);
                    if self.profile.delete_on_success {
                        self.dispatch_delete(&mut deletes, report.outcomes.len(), source_path);
                    }
                    RunOutcome::Replicated {
                        primary_key: target.primary_key,
                        bytes,
                    }
                }
                Err(err) => {
                    log_transfer_failure(server, &source_path, &err);
                    RunOutcome::ReplicationFailed {
                        stage: err.stage(),
                        reason: err.to_string(),
                    }
                }
            };
            report.outcomes.push(FileOutcome { name, outcome });
        }

        collect_deletes(server, &mut deletes, &mut report).await;

        let replicated = report.replicated();
        let filtered = report.filtered();
        let failed = report.failed();
        let delete_failed = report.delete_failed();
        info!("Run on {server} finished: {replicated} replicated, {filtered} filtered out, {failed} failed, {delete_failed} not deleted",
            server: server, replicated: replicated, filtered: filtered, failed: failed, delete_failed: delete_failed);

        Ok(report)
    }

    /// Start removing `source_path` without waiting for it
    fn dispatch_delete(&self, deletes: &mut JoinSet<DeleteResult>, index: usize, source_path: String) {
        let session = Arc::clone(&self.session);
        _ = deletes.spawn(async move {
            let result = session.remove(&source_path).await;
            (index, source_path, result)
        });
    }
}

fn log_transfer_failure(server: &str, source_path: &str, err: &TransferError) {
    let stage = err.stage().to_string();
    let error_str = err.to_string();
    warn!("Failed to replicate {source_path} on {server} at stage {stage}: {error}",
        source_path: source_path, server: server, stage: stage, error: error_str);
}

/// Wait for dispatched deletes and record their failures
async fn collect_deletes(server: &str, deletes: &mut JoinSet<DeleteResult>, report: &mut RunReport) {
    while let Some(joined) = deletes.join_next().await {
        let (index, source_path, result) = match joined {
            Ok(done) => done,
            Err(join_err) => {
                let error_str = join_err.to_string();
                error!("Delete task on {server} failed: {error}", server: server, error: error_str);
                continue;
            }
        };

        match result {
            Ok(()) => {
                debug!("Deleted {source_path} on {server}", source_path: source_path.as_str(), server: server);
            }
            Err(err) => {
                let error_str = err.to_string();
                warn!("Failed to delete {source_path} on {server}: {error}",
                    source_path: source_path.as_str(), server: server, error: error_str.as_str());
                if let Some(file) = report.outcomes.get_mut(index) {
                    if let RunOutcome::Replicated { primary_key, .. } = &file.outcome {
                        file.outcome = RunOutcome::DeleteFailed {
                            primary_key: primary_key.clone(),
                            reason: error_str,
                        };
                    }
                }
            }
        }
    }
}
