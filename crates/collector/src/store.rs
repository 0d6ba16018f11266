// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Archive store capability and its object_store implementation
//!
//! Destinations are addressed by `/`-separated keys. The same code serves a
//! local directory (`file://`), Google Cloud Storage (`gs://`), S3-compatible
//! buckets (`s3://`) and an in-memory store (`memory://`).

use crate::error::StoreError;
use crate::profile::Secret;
use crate::session::RemoteReader;
use async_trait::async_trait;
use diagnostics::*;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Default store location when none is configured
pub const DEFAULT_STORE_URL: &str = "file://./files";

/// Durable destination for collected files
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Stream `reader` to completion into `key`, bounded by `timeout`
    ///
    /// Returns the number of bytes written. A failure while streaming
    /// leaves nothing at `key`; a failure while finishing the upload may.
    async fn write(
        &self,
        key: &str,
        reader: RemoteReader,
        timeout: Duration,
    ) -> Result<u64, StoreError>;

    /// Store-internal copy; the source is not re-read from the remote server
    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError>;
}

/// Join a destination directory and a file name into a store key
#[must_use]
pub fn join_key(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// [`ArchiveStore`] over any [`ObjectStore`]
#[derive(Debug, Clone)]
pub struct ObjectArchive {
    store: Arc<dyn ObjectStore>,
}

impl ObjectArchive {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// An archive backed by process memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// The underlying object store
    #[must_use]
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl ArchiveStore for ObjectArchive {
    async fn write(
        &self,
        key: &str,
        mut reader: RemoteReader,
        timeout: Duration,
    ) -> Result<u64, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let timed_out = || StoreError::Timeout {
            key: key.to_string(),
            timeout,
        };
        let mut writer = BufWriter::new(Arc::clone(&self.store), Path::from(key));

        let copied =
            tokio::time::timeout_at(deadline, tokio::io::copy(&mut reader, &mut writer)).await;
        let written = match copied {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                abort_upload(&mut writer, key).await;
                return Err(StoreError::Io(e));
            }
            Err(_) => {
                abort_upload(&mut writer, key).await;
                return Err(timed_out());
            }
        };

        // Once shutdown starts the upload can no longer be aborted
        match tokio::time::timeout_at(deadline, writer.shutdown()).await {
            Ok(Ok(())) => {
                debug!("Stored {written} bytes at {key}", written: written, key: key);
                Ok(written)
            }
            Ok(Err(e)) => Err(StoreError::Io(e)),
            Err(_) => Err(timed_out()),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.store.copy(&Path::from(from), &Path::from(to)).await?;
        Ok(())
    }
}

async fn abort_upload(writer: &mut BufWriter, key: &str) {
    if let Err(e) = writer.abort().await {
        let error_str = e.to_string();
        debug!("Abort of upload to {key} reported: {error}", key: key, error: error_str);
    }
}

/// Where collected files are stored
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `file:///path`, `gs://bucket[/prefix]`, `s3://bucket[/prefix]` or `memory://`
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Google application credentials file (service account JSON)
    #[serde(default)]
    pub credentials_path: Option<String>,

    /// AWS region (for S3)
    #[serde(default)]
    pub region: String,

    /// Custom S3 endpoint (for MinIO, R2, etc.)
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub access_key: Secret,

    #[serde(default)]
    pub secret_key: Secret,
}

fn default_store_url() -> String {
    DEFAULT_STORE_URL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            credentials_path: None,
            region: String::new(),
            endpoint: String::new(),
            access_key: Secret::default(),
            secret_key: Secret::default(),
        }
    }
}

fn client_options() -> ClientOptions {
    ClientOptions::new().with_timeout(Duration::from_secs(30))
}

fn prefixed<T: ObjectStore>(store: T, prefix: &str) -> Arc<dyn ObjectStore> {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        Arc::new(store)
    } else {
        Arc::new(object_store::prefix::PrefixStore::new(store, prefix))
    }
}

/// Build an object store from configuration
pub fn build_object_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let url = config.url.trim();
    if url.is_empty() {
        return Err(StoreError::Configuration("store url is required".to_string()));
    }

    if url.starts_with("memory://") {
        info!("Using in-memory archive store");
        return Ok(Arc::new(object_store::memory::InMemory::new()));
    }

    if !url.contains("://") || url.starts_with("file://") {
        let path = url.strip_prefix("file://").unwrap_or(url);
        info!("Using local archive store at {path}", path: path);
        std::fs::create_dir_all(path)?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(path)?;
        return Ok(Arc::new(store));
    }

    let parsed = Url::parse(url)
        .map_err(|e| StoreError::Configuration(format!("Invalid store url {url}: {e}")))?;
    let bucket = parsed
        .host_str()
        .filter(|bucket| !bucket.is_empty())
        .ok_or_else(|| StoreError::Configuration(format!("No bucket in store url {url}")))?;

    match parsed.scheme() {
        "gs" => {
            info!("Using Google Cloud Storage bucket {bucket}", bucket: bucket);
            let mut builder = object_store::gcp::GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .with_client_options(client_options());
            if let Some(path) = config.credentials_path.as_deref().filter(|p| !p.is_empty()) {
                builder = builder.with_application_credentials(path);
            }
            Ok(prefixed(builder.build()?, parsed.path()))
        }
        "s3" | "s3a" => {
            info!("Using S3 bucket {bucket}", bucket: bucket);
            let mut builder = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_client_options(client_options());
            if !config.region.is_empty() {
                builder = builder.with_region(&config.region);
            }
            if !config.access_key.is_empty() {
                builder = builder.with_access_key_id(config.access_key.as_declassified());
            }
            if !config.secret_key.is_empty() {
                builder = builder.with_secret_access_key(config.secret_key.as_declassified());
            }
            if !config.endpoint.is_empty() {
                builder = builder
                    .with_endpoint(&config.endpoint)
                    .with_allow_http(config.endpoint.starts_with("http://"));
            }
            Ok(prefixed(builder.build()?, parsed.path()))
        }
        other => Err(StoreError::Configuration(format!(
            "Unsupported store scheme {other:?}; use file, memory, gs or s3"
        ))),
    }
}
