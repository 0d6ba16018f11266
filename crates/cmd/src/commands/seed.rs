// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::{CollectorConfig, load_config};
use anyhow::{Context, Result, anyhow};
use collector::SessionConnector;
use diagnostics::*;
use sftp::SftpConnector;
use std::path::Path;

pub async fn seed_command(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let uploaded = seed(&config, &SftpConnector::default()).await?;
    info!("Uploaded {uploaded} sample files", uploaded: uploaded);
    Ok(())
}

/// Upload the configured sample files to the test server
///
/// A file that cannot be uploaded is logged and skipped. Returns the
/// number of files uploaded.
pub async fn seed(config: &CollectorConfig, connector: &dyn SessionConnector) -> Result<usize> {
    let upload = config
        .sample_upload
        .as_ref()
        .ok_or_else(|| anyhow!("sample_upload is not configured"))?;
    let endpoint = upload.endpoint();
    let addr = endpoint.addr();
    let file_count = upload.files.len();
    info!("Uploading {file_count} sample files to {addr}", file_count: file_count, addr: addr.as_str());

    let session = connector
        .connect(&endpoint)
        .await
        .with_context(|| format!("Failed to connect to sample server {addr}"))?;

    let mut uploaded = 0;
    for file in &upload.files {
        let local = file.local.display().to_string();
        let remote = file.remote.as_str();
        match session.write(&file.local, remote).await {
            Ok(()) => {
                debug!("Uploaded {local} to {remote}", local: local.as_str(), remote: remote);
                uploaded += 1;
            }
            Err(e) => {
                let error_str = e.to_string();
                warn!("Failed to upload {local} to {remote}: {error}",
                    local: local.as_str(), remote: remote, error: error_str.as_str());
            }
        }
    }
    Ok(uploaded)
}
