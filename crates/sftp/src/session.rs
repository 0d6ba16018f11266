// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use collector::{RemoteFileEntry, RemoteReader, RemoteSession, SessionError};
use diagnostics::*;
use ssh2::{Session, Sftp};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::StreamReader;

const CHUNK_SIZE: usize = 32 * 1024;
const CHANNEL_DEPTH: usize = 8;
const DIR_MODE: i32 = 0o755;

struct Handle {
    // Kept alive for as long as the SFTP channel is in use
    _session: Session,
    sftp: Sftp,
}

/// An authenticated SFTP session with one server
pub struct SftpSession {
    host: String,
    user: String,
    port: u16,
    handle: Arc<Mutex<Handle>>,
}

fn lock(handle: &Mutex<Handle>) -> MutexGuard<'_, Handle> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SftpSession {
    pub(crate) fn new(session: Session, sftp: Sftp, host: String, user: String, port: u16) -> Self {
        Self {
            host,
            user,
            port,
            handle: Arc::new(Mutex::new(Handle {
                _session: session,
                sftp,
            })),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run `op` against the SFTP handle on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T, SessionError> + Send + 'static,
    {
        let handle = Arc::clone(&self.handle);
        tokio::task::spawn_blocking(move || op(&lock(&handle).sftp))
            .await
            .map_err(|e| SessionError::Join(e.to_string()))?
    }
}

/// Parent directories of `path`, outermost first
fn parent_dirs(path: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut current = String::new();
    let parts: Vec<&str> = path.split('/').collect();
    let Some((_, parents)) = parts.split_last() else {
        return dirs;
    };
    for (i, part) in parents.iter().enumerate() {
        if part.is_empty() {
            if i == 0 {
                current.push('/');
            }
            continue;
        }
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);
        dirs.push(current.clone());
    }
    dirs
}

/// Last path segment as the server sent it; `Path::file_name` folds `.`
fn entry_name(path: &Path) -> Option<String> {
    let full = path.to_string_lossy();
    let name = full.rsplit('/').next().unwrap_or_default();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Blocking: open `path`, report the outcome, then stream chunks into `tx`
fn pump(
    handle: Arc<Mutex<Handle>>,
    path: String,
    opened: oneshot::Sender<Result<(), SessionError>>,
    tx: mpsc::Sender<io::Result<Bytes>>,
) {
    let file = lock(&handle).sftp.open(Path::new(&path));
    let mut file = match file {
        Ok(file) => {
            if opened.send(Ok(())).is_err() {
                return;
            }
            file
        }
        Err(e) => {
            _ = opened.send(Err(SessionError::protocol(&path, e)));
            return;
        }
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let chunk = match file.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        // A closed receiver means the reader was dropped
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteFileEntry>, SessionError> {
        let dir = dir.to_string();
        self.blocking(move |sftp| {
            let listed = sftp
                .readdir(Path::new(&dir))
                .map_err(|e| SessionError::protocol(&dir, e))?;
            Ok(listed
                .into_iter()
                .filter_map(|(path, stat)| {
                    entry_name(&path).map(|name| RemoteFileEntry {
                        name,
                        is_directory: stat.is_dir(),
                    })
                })
                .collect())
        })
        .await
    }

    async fn open(&self, path: &str) -> Result<RemoteReader, SessionError> {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let handle = Arc::clone(&self.handle);
        let owned = path.to_string();
        drop(tokio::task::spawn_blocking(move || pump(handle, owned, opened_tx, tx)));

        opened_rx
            .await
            .map_err(|_| SessionError::Join(format!("reader for {path} exited early")))??;
        debug!("Opened {path} on {host}", path: path, host: self.host.as_str());

        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }

    async fn remove(&self, path: &str) -> Result<(), SessionError> {
        let path = path.to_string();
        self.blocking(move |sftp| {
            sftp.unlink(Path::new(&path))
                .map_err(|e| SessionError::protocol(&path, e))
        })
        .await
    }

    async fn write(&self, local: &Path, remote: &str) -> Result<(), SessionError> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        let host = self.host.clone();
        self.blocking(move |sftp| {
            let mut source = std::fs::File::open(&local)?;
            for dir in parent_dirs(&remote) {
                // Fails when the directory already exists
                if sftp.mkdir(Path::new(&dir), DIR_MODE).is_ok() {
                    debug!("Created {dir} on {host}", dir: dir.as_str(), host: host.as_str());
                }
            }
            let mut target = sftp
                .create(Path::new(&remote))
                .map_err(|e| SessionError::protocol(&remote, e))?;
            let written = io::copy(&mut source, &mut target)?;
            info!("Uploaded {written} bytes to {remote} on {host}",
                written: written, remote: remote.as_str(), host: host.as_str());
            Ok(())
        })
        .await
    }
}
