// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory sessions and stores for tests
//!
//! These doubles record every call they receive and can be told to fail
//! specific operations, so pipeline behaviour can be checked without a
//! real server or bucket.

use crate::error::{SessionError, StoreError};
use crate::policy::Clock;
use crate::profile::Endpoint;
use crate::session::{RemoteFileEntry, RemoteReader, RemoteSession, SessionConnector, join_path};
use crate::store::{ArchiveStore, ObjectArchive};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}

fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() && dir.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Default)]
struct SessionState {
    listings: HashMap<String, Vec<RemoteFileEntry>>,
    files: HashMap<String, Bytes>,
    fail_list: HashSet<String>,
    fail_open: HashSet<String>,
    fail_remove: HashSet<String>,
    opened: Vec<String>,
    removed: Vec<String>,
}

/// A clock that advances with tokio time, so paused-time tests see pacing
#[derive(Debug)]
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.base + elapsed
    }
}

/// A remote server held in memory
#[derive(Default)]
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file to the listing of `dir`
    pub fn add_file(&self, dir: &str, name: &str, content: impl Into<Bytes>) {
        let dir = normalize_dir(dir);
        let mut state = lock(&self.state);
        state
            .listings
            .entry(dir.clone())
            .or_default()
            .push(RemoteFileEntry::file(name));
        state.files.insert(join_path(&dir, name), content.into());
    }

    /// Append a subdirectory entry to the listing of `dir`
    pub fn add_directory(&self, dir: &str, name: &str) {
        let dir = normalize_dir(dir);
        lock(&self.state)
            .listings
            .entry(dir)
            .or_default()
            .push(RemoteFileEntry::directory(name));
    }

    pub fn fail_list(&self, dir: &str) {
        lock(&self.state).fail_list.insert(normalize_dir(dir));
    }

    pub fn fail_open(&self, path: &str) {
        lock(&self.state).fail_open.insert(path.to_string());
    }

    pub fn fail_remove(&self, path: &str) {
        lock(&self.state).fail_remove.insert(path.to_string());
    }

    /// Paths passed to `open`, in call order
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        lock(&self.state).opened.clone()
    }

    /// Paths passed to `remove`, in call order, including failed calls
    #[must_use]
    pub fn removed(&self) -> Vec<String> {
        lock(&self.state).removed.clone()
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        lock(&self.state).files.contains_key(path)
    }

    #[must_use]
    pub fn content(&self, path: &str) -> Option<Bytes> {
        lock(&self.state).files.get(path).cloned()
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteFileEntry>, SessionError> {
        let dir = normalize_dir(dir);
        let state = lock(&self.state);
        if state.fail_list.contains(&dir) {
            return Err(SessionError::protocol(dir, "permission denied"));
        }
        state
            .listings
            .get(&dir)
            .cloned()
            .ok_or_else(|| SessionError::protocol(dir, "no such directory"))
    }

    async fn open(&self, path: &str) -> Result<RemoteReader, SessionError> {
        let mut state = lock(&self.state);
        state.opened.push(path.to_string());
        if state.fail_open.contains(path) {
            return Err(SessionError::protocol(path, "permission denied"));
        }
        let content = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SessionError::protocol(path, "no such file"))?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }

    async fn remove(&self, path: &str) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.removed.push(path.to_string());
        if state.fail_remove.contains(path) {
            return Err(SessionError::protocol(path, "permission denied"));
        }
        if state.files.remove(path).is_none() {
            return Err(SessionError::protocol(path, "no such file"));
        }
        let (dir, name) = split_path(path);
        if let Some(entries) = state.listings.get_mut(dir) {
            entries.retain(|entry| entry.name != name);
        }
        Ok(())
    }

    async fn write(&self, local: &Path, remote: &str) -> Result<(), SessionError> {
        let content = tokio::fs::read(local).await?;
        let (dir, name) = split_path(remote);
        let exists = self.contains(remote);
        if exists {
            lock(&self.state).files.insert(remote.to_string(), content.into());
        } else {
            self.add_file(dir, name, content);
        }
        Ok(())
    }
}

/// Hands out [`MemorySession`]s by host name
#[derive(Default)]
pub struct MemoryConnector {
    sessions: Mutex<HashMap<String, Arc<MemorySession>>>,
    refused: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `host`, returning it for setup and inspection
    pub fn add_host(&self, host: &str) -> Arc<MemorySession> {
        let session = Arc::new(MemorySession::new());
        lock(&self.sessions).insert(host.to_string(), Arc::clone(&session));
        session
    }

    pub fn refuse(&self, host: &str) {
        lock(&self.refused).insert(host.to_string());
    }

    /// Hosts passed to `connect`, in call order
    #[must_use]
    pub fn attempts(&self) -> Vec<String> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl SessionConnector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteSession>, SessionError> {
        lock(&self.attempts).push(endpoint.host.clone());
        let refused = lock(&self.refused).contains(&endpoint.host);
        let session = lock(&self.sessions).get(&endpoint.host).cloned();
        match session {
            Some(session) if !refused => Ok(session),
            _ => Err(SessionError::Connect {
                addr: endpoint.addr(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// A call received by [`RecordingArchive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveCall {
    Write(String),
    Copy { from: String, to: String },
}

#[derive(Default)]
struct ArchiveState {
    calls: Vec<ArchiveCall>,
    fail_write: HashSet<String>,
    fail_copy: HashSet<String>,
}

/// In-memory [`ArchiveStore`] that records calls and injects failures
pub struct RecordingArchive {
    inner: ObjectArchive,
    state: Mutex<ArchiveState>,
}

impl Default for RecordingArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingArchive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: ObjectArchive::in_memory(),
            state: Mutex::new(ArchiveState::default()),
        }
    }

    /// Make writes to `key` fail
    pub fn fail_write(&self, key: &str) {
        lock(&self.state).fail_write.insert(key.to_string());
    }

    /// Make copies to `key` fail
    pub fn fail_copy(&self, key: &str) {
        lock(&self.state).fail_copy.insert(key.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ArchiveCall> {
        lock(&self.state).calls.clone()
    }

    #[must_use]
    pub fn copy_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ArchiveCall::Copy { from, to } => Some((from, to)),
                ArchiveCall::Write(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn write_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ArchiveCall::Write(key) => Some(key),
                ArchiveCall::Copy { .. } => None,
            })
            .collect()
    }

    /// Content stored at `key`, if any
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let store = self.inner.object_store();
        let result = store.get(&object_store::path::Path::from(key)).await.ok()?;
        result.bytes().await.ok()
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        use futures::TryStreamExt;
        let store = self.inner.object_store();
        let listed: Vec<_> = store.list(None).try_collect().await.unwrap_or_default();
        let mut keys: Vec<String> = listed
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArchiveStore for RecordingArchive {
    async fn write(
        &self,
        key: &str,
        reader: RemoteReader,
        timeout: Duration,
    ) -> Result<u64, StoreError> {
        let fail = {
            let mut state = lock(&self.state);
            state.calls.push(ArchiveCall::Write(key.to_string()));
            state.fail_write.contains(key)
        };
        if fail {
            return Err(StoreError::Configuration(format!("write to {key} rejected")));
        }
        self.inner.write(key, reader, timeout).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let fail = {
            let mut state = lock(&self.state);
            state.calls.push(ArchiveCall::Copy {
                from: from.to_string(),
                to: to.to_string(),
            });
            state.fail_copy.contains(to)
        };
        if fail {
            return Err(StoreError::Configuration(format!("copy to {to} rejected")));
        }
        self.inner.copy(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_memory_session_roundtrip() -> anyhow::Result<()> {
        let session = MemorySession::new();
        session.add_file("/in", "a.ic", "abc");
        session.add_directory("/in", "old");

        let entries = session.list("/in/").await?;
        assert_eq!(
            entries,
            vec![RemoteFileEntry::file("a.ic"), RemoteFileEntry::directory("old")]
        );

        let mut content = String::new();
        _ = session.open("/in/a.ic").await?.read_to_string(&mut content).await?;
        assert_eq!(content, "abc");

        session.remove("/in/a.ic").await?;
        assert!(!session.contains("/in/a.ic"));
        assert_eq!(session.list("/in").await?, vec![RemoteFileEntry::directory("old")]);
        assert_eq!(session.removed(), vec!["/in/a.ic".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_session_write() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let local = temp_dir.path().join("sample.txt");
        std::fs::write(&local, "sample")?;

        let session = MemorySession::new();
        session.write(&local, "/srvone_remote/a.txt").await?;
        assert_eq!(session.list("/srvone_remote").await?, vec![RemoteFileEntry::file("a.txt")]);
        assert_eq!(session.content("/srvone_remote/a.txt"), Some(Bytes::from("sample")));
        Ok(())
    }

    #[tokio::test]
    async fn test_connector_refusal() {
        let connector = MemoryConnector::new();
        _ = connector.add_host("a");
        connector.refuse("a");
        let endpoint = Endpoint {
            host: "a".to_string(),
            port: 22,
            user: "u".to_string(),
            secret: crate::profile::Secret::new("s"),
        };
        assert!(connector.connect(&endpoint).await.is_err());
        assert_eq!(connector.attempts(), vec!["a".to_string()]);
    }
}
