// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::session::SftpSession;
use async_trait::async_trait;
use collector::{Endpoint, RemoteSession, SessionConnector, SessionError};
use diagnostics::*;
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Bound on TCP connect and on each blocking SSH operation
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reject connection settings that cannot possibly work
pub fn validate_endpoint(endpoint: &Endpoint) -> Result<(), SessionError> {
    if endpoint.host.trim().is_empty() {
        return Err(SessionError::InvalidEndpoint("host is empty".to_string()));
    }
    if endpoint.user.trim().is_empty() {
        return Err(SessionError::InvalidEndpoint("user is empty".to_string()));
    }
    if endpoint.secret.is_empty() {
        return Err(SessionError::InvalidEndpoint("password is empty".to_string()));
    }
    if endpoint.port == 0 {
        return Err(SessionError::InvalidEndpoint(
            "port must be between 1 and 65535".to_string(),
        ));
    }
    Ok(())
}

/// Establishes [`SftpSession`]s
#[derive(Debug, Clone, Copy)]
pub struct SftpConnector {
    connect_timeout: Duration,
}

impl Default for SftpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl SftpConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SessionConnector for SftpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteSession>, SessionError> {
        validate_endpoint(endpoint)?;

        let addr = endpoint.addr();
        info!("Connecting to {addr}", addr: addr.as_str());

        let endpoint = endpoint.clone();
        let timeout = self.connect_timeout;
        let session = tokio::task::spawn_blocking(move || establish(&endpoint, timeout))
            .await
            .map_err(|e| SessionError::Join(e.to_string()))??;

        info!("Connected to {addr}", addr: addr.as_str());
        Ok(Arc::new(session))
    }
}

fn open_tcp(addr: &str, timeout: Duration) -> Result<TcpStream, SessionError> {
    let connect_error = |message: String| SessionError::Connect {
        addr: addr.to_string(),
        message,
    };

    let candidates = addr
        .to_socket_addrs()
        .map_err(|e| connect_error(e.to_string()))?;

    let mut last_error = "no addresses resolved".to_string();
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(connect_error(last_error))
}

/// Blocking: TCP connect, SSH handshake, password auth, SFTP subsystem
fn establish(endpoint: &Endpoint, timeout: Duration) -> Result<SftpSession, SessionError> {
    let addr = endpoint.addr();
    let tcp = open_tcp(&addr, timeout)?;

    let connect_error = |stage: &str, e: ssh2::Error| SessionError::Connect {
        addr: addr.clone(),
        message: format!("{stage}: {e}"),
    };

    let mut session = Session::new().map_err(|e| connect_error("ssh session", e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| connect_error("ssh handshake", e))?;

    session
        .userauth_password(&endpoint.user, endpoint.secret.as_declassified())
        .map_err(|e| SessionError::Auth {
            user: endpoint.user.clone(),
            addr: addr.clone(),
            message: e.to_string(),
        })?;
    if !session.authenticated() {
        return Err(SessionError::Auth {
            user: endpoint.user.clone(),
            addr,
            message: "server did not accept the password".to_string(),
        });
    }

    let sftp = session
        .sftp()
        .map_err(|e| SessionError::protocol("sftp subsystem", e))?;

    Ok(SftpSession::new(
        session,
        sftp,
        endpoint.host.clone(),
        endpoint.user.clone(),
        endpoint.port,
    ))
}
