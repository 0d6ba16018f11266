// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! SFTP sessions for the collector
//!
//! [`SftpConnector`] opens password-authenticated SFTP sessions with `ssh2`.
//! `ssh2` is blocking, so every protocol call runs on tokio's blocking pool.

mod connect;
mod session;

pub use connect::{DEFAULT_CONNECT_TIMEOUT, SftpConnector, validate_endpoint};
pub use session::SftpSession;
