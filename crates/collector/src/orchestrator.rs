// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Fan-out of collection runs across servers
//!
//! Every profile gets its own task: validate, connect, run. Profiles share
//! only the archive store and the clock. A profile that cannot be validated
//! or connected is skipped without affecting the others, and a task that
//! panics is reported as aborted.

use crate::error::CollectorError;
use crate::policy::{Clock, FileNamePolicy};
use crate::profile::ServerProfile;
use crate::run::{CollectionRun, RunOptions, RunReport};
use crate::session::SessionConnector;
use crate::store::ArchiveStore;
use chrono_tz::Tz;
use diagnostics::*;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;

/// How one server's collection ended
#[derive(Debug)]
pub enum ServerStatus {
    Completed(RunReport),
    /// Not attempted: invalid profile or no session
    Skipped(CollectorError),
    /// Started but could not finish
    Aborted(CollectorError),
}

#[derive(Debug)]
pub struct ServerReport {
    pub name: String,
    pub status: ServerStatus,
}

/// Per-server results in configuration order
#[derive(Debug, Default)]
pub struct OrchestratorReport {
    pub servers: Vec<ServerReport>,
}

impl OrchestratorReport {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServerStatus> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.status)
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.servers
            .iter()
            .filter(|s| matches!(s.status, ServerStatus::Completed(_)))
            .count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.servers
            .iter()
            .filter(|s| matches!(s.status, ServerStatus::Skipped(_)))
            .count()
    }

    #[must_use]
    pub fn aborted(&self) -> usize {
        self.servers
            .iter()
            .filter(|s| matches!(s.status, ServerStatus::Aborted(_)))
            .count()
    }
}

/// Runs one [`CollectionRun`] per server profile concurrently
pub struct Orchestrator {
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn ArchiveStore>,
    clock: Arc<dyn Clock>,
    time_zone: Tz,
    options: RunOptions,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        store: Arc<dyn ArchiveStore>,
        clock: Arc<dyn Clock>,
        time_zone: Tz,
    ) -> Self {
        Self {
            connector,
            store,
            clock,
            time_zone,
            options: RunOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Collect from every profile and wait for all of them
    pub async fn run_all(&self, profiles: Vec<ServerProfile>) -> OrchestratorReport {
        let names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
        let server_count = names.len();
        info!("Starting collection for {server_count} servers", server_count: server_count);

        let mut tasks: JoinSet<(usize, ServerStatus)> = JoinSet::new();
        for (index, profile) in profiles.into_iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let store = Arc::clone(&self.store);
            let clock = Arc::clone(&self.clock);
            let time_zone = self.time_zone;
            let options = self.options;
            _ = tasks.spawn(async move {
                let server = profile.name.clone();
                let collected = AssertUnwindSafe(collect_server(
                    profile, connector, store, clock, time_zone, options,
                ))
                .catch_unwind()
                .await;
                let status = collected.unwrap_or_else(|_| {
                    error!("Collection for {server} panicked", server: server.as_str());
                    ServerStatus::Aborted(CollectorError::Task {
                        server,
                        message: "task panicked".to_string(),
                    })
                });
                (index, status)
            });
        }

        let mut statuses: Vec<Option<ServerStatus>> = (0..server_count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, status)) => {
                    if let Some(slot) = statuses.get_mut(index) {
                        *slot = Some(status);
                    }
                }
                Err(join_err) => {
                    let error_str = join_err.to_string();
                    error!("Collection task failed: {error}", error: error_str);
                }
            }
        }

        let servers: Vec<ServerReport> = names
            .into_iter()
            .zip(statuses)
            .map(|(name, status)| {
                let status = status.unwrap_or_else(|| {
                    ServerStatus::Aborted(CollectorError::Task {
                        server: name.clone(),
                        message: "task did not complete".to_string(),
                    })
                });
                ServerReport { name, status }
            })
            .collect();
        let report = OrchestratorReport { servers };

        let completed = report.completed();
        let skipped = report.skipped();
        let aborted = report.aborted();
        info!("Collection finished: {completed} completed, {skipped} skipped, {aborted} aborted",
            completed: completed, skipped: skipped, aborted: aborted);
        report
    }
}

async fn collect_server(
    profile: ServerProfile,
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn ArchiveStore>,
    clock: Arc<dyn Clock>,
    time_zone: Tz,
    options: RunOptions,
) -> ServerStatus {
    let server = profile.name.clone();

    let validated = profile
        .validate()
        .and_then(|()| FileNamePolicy::from_profile(&profile, time_zone));
    let policy = match validated {
        Ok(policy) => policy,
        Err(source) => {
            let err = CollectorError::Config { server, source };
            let error_str = err.to_string();
            warn!("Skipping server: {error}", error: error_str);
            return ServerStatus::Skipped(err);
        }
    };

    let session = match connector.connect(&profile.endpoint).await {
        Ok(session) => session,
        Err(source) => {
            let err = CollectorError::Connection { server, source };
            let error_str = err.to_string();
            warn!("Skipping server: {error}", error: error_str);
            return ServerStatus::Skipped(err);
        }
    };
    debug!("Connected to {server}", server: server.as_str());

    match CollectionRun::new(profile, policy, session, store, clock, options)
        .run()
        .await
    {
        Ok(report) => ServerStatus::Completed(report),
        Err(err) => {
            let error_str = err.to_string();
            error!("Collection run aborted: {error}", error: error_str);
            ServerStatus::Aborted(err)
        }
    }
}
