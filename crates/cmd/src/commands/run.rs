// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::commands::seed::seed;
use crate::config::{CollectorConfig, load_config};
use anyhow::{Context, Result};
use collector::{
    ArchiveStore, ObjectArchive, Orchestrator, OrchestratorReport, ServerProfile, ServerStatus,
    SessionConnector, SystemClock, build_object_store,
};
use diagnostics::*;
use sftp::SftpConnector;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Parse a `--every` interval such as `15m` or `1h`
pub fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = parse_duration::parse(value).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

pub fn build_orchestrator(
    config: &CollectorConfig,
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn ArchiveStore>,
) -> Result<Orchestrator> {
    Ok(Orchestrator::new(
        connector,
        store,
        Arc::new(SystemClock),
        config.resolved_time_zone()?,
    )
    .with_options(config.run_options()?))
}

/// One pass over every profile, logging a line per server
pub async fn collect_once(
    orchestrator: &Orchestrator,
    profiles: Vec<ServerProfile>,
) -> OrchestratorReport {
    let report = orchestrator.run_all(profiles).await;
    for server in &report.servers {
        let name = server.name.as_str();
        match &server.status {
            ServerStatus::Completed(run) => {
                let replicated = run.replicated();
                let failed = run.failed();
                let delete_failed = run.delete_failed();
                info!("{server}: {replicated} replicated, {failed} failed, {delete_failed} not deleted",
                    server: name, replicated: replicated, failed: failed, delete_failed: delete_failed);
            }
            ServerStatus::Skipped(e) => {
                let error_str = e.to_string();
                warn!("{server}: skipped: {error}", server: name, error: error_str.as_str());
            }
            ServerStatus::Aborted(e) => {
                let error_str = e.to_string();
                error!("{server}: aborted: {error}", server: name, error: error_str.as_str());
            }
        }
    }
    report
}

/// Collect once, or every `every` until interrupted
///
/// An interrupt is only acted on between passes.
pub async fn run_command(
    config_path: &Path,
    servers: &[String],
    every: Option<Duration>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let profiles = config.profiles(servers)?;
    let connector: Arc<dyn SessionConnector> = Arc::new(SftpConnector::default());

    if config.seeding_enabled() {
        match seed(&config, connector.as_ref()).await {
            Ok(uploaded) => info!("Uploaded {uploaded} sample files", uploaded: uploaded),
            Err(e) => {
                let error_str = format!("{e:#}");
                warn!("Sample upload failed: {error}", error: error_str.as_str());
            }
        }
    }

    let store = build_object_store(&config.store).with_context(|| "Failed to open archive store")?;
    let archive: Arc<dyn ArchiveStore> = Arc::new(ObjectArchive::new(store));
    let orchestrator = build_orchestrator(&config, connector, archive)?;

    let Some(interval) = every else {
        _ = collect_once(&orchestrator, profiles).await;
        return Ok(());
    };

    let (stop_tx, mut stop_rx) = watch::channel(false);
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; stopping after the current pass");
            _ = stop_tx.send(true);
        }
    }));

    loop {
        _ = collect_once(&orchestrator, profiles.clone()).await;
        if *stop_rx.borrow() {
            break;
        }
        let seconds = interval.as_secs();
        debug!("Next pass in {seconds}s", seconds: seconds);
        tokio::select! {
            Ok(()) = stop_rx.changed() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}
