// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::config::{CollectorConfig, load_config};
use anyhow::Result;
use diagnostics::*;
use std::path::Path;

#[allow(clippy::print_stdout)]
pub fn check_command(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    print!("{}", render_profiles(&config)?);
    Ok(())
}

/// Resolved profiles of the active servers as YAML, secrets redacted
///
/// Servers that would be skipped at run time are reported as warnings.
pub fn render_profiles(config: &CollectorConfig) -> Result<String> {
    let profiles = config.profiles(&[])?;
    for profile in &profiles {
        if let Err(e) = profile.validate() {
            let error_str = e.to_string();
            warn!("Server {server} will be skipped: {error}",
                server: profile.name.as_str(), error: error_str.as_str());
        }
    }
    Ok(serde_yaml_ng::to_string(&profiles)?)
}
