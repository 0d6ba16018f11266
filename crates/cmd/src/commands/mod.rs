// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod check;
pub mod run;
pub mod seed;

pub use check::{check_command, render_profiles};
pub use run::{build_orchestrator, collect_once, parse_interval, run_command};
pub use seed::{seed, seed_command};
