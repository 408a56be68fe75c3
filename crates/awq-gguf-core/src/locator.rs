//! Locate (or fetch once) the external HF-to-GGUF converter script.
//!
//! Search order:
//! 1. each configured well-known path, first existing one wins
//! 2. one network fetch into the first well-known path
//! 3. otherwise "not found", which selects the pipeline's fallback branch

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::IoResultExt;
use crate::{ConvertError, Result};

/// Outcome of a locate call. Decided once per conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterHandle {
    Located(PathBuf),
    NotFound,
}

impl ConverterHandle {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConverterHandle::Located(path) => Some(path),
            ConverterHandle::NotFound => None,
        }
    }
}

/// Downloads the converter script to a destination file.
#[async_trait]
pub trait ConverterFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<()>;
}

/// `ConverterFetcher` over HTTP(S).
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ConvertError::Network {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConverterFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| map_fetch_error(e, timeout))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| map_fetch_error(e, timeout))?;

        // Write to a temp name first so an interrupted fetch never leaves a
        // truncated script on a search path.
        let part = partial_path(dest);
        let written = match tokio::fs::write(&part, &body).await.with_path(&part) {
            Ok(()) => tokio::fs::rename(&part, dest).await.with_path(dest),
            Err(e) => Err(e),
        };
        if written.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        written
    }
}

fn map_fetch_error(err: reqwest::Error, timeout: Duration) -> ConvertError {
    if err.is_timeout() {
        ConvertError::Timeout(timeout)
    } else {
        ConvertError::from(err)
    }
}

/// Finds the converter according to the fixed search order.
pub struct ConverterLocator {
    search_paths: Vec<PathBuf>,
    url: String,
    timeout: Duration,
    fetcher: Arc<dyn ConverterFetcher>,
}

impl ConverterLocator {
    pub fn new(
        search_paths: Vec<PathBuf>,
        url: impl Into<String>,
        timeout: Duration,
        fetcher: Arc<dyn ConverterFetcher>,
    ) -> Self {
        Self {
            search_paths,
            url: url.into(),
            timeout,
            fetcher,
        }
    }

    /// Resolve the converter. Never fails: every problem degrades to
    /// `ConverterHandle::NotFound`.
    pub async fn locate(&self) -> ConverterHandle {
        for path in &self.search_paths {
            if path.exists() {
                debug!("Converter found at {}", path.display());
                return ConverterHandle::Located(absolute(path));
            }
        }

        let Some(dest) = self.search_paths.first() else {
            warn!("No converter search paths configured");
            return ConverterHandle::NotFound;
        };

        match self.fetch_to(dest).await {
            Ok(()) => {
                info!("Converter downloaded to {}", dest.display());
                ConverterHandle::Located(absolute(dest))
            }
            Err(e) => {
                warn!("Converter fetch failed, using fallback: {}", e);
                ConverterHandle::NotFound
            }
        }
    }

    async fn fetch_to(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }
        self.fetcher.fetch(&self.url, dest, self.timeout).await
    }
}

/// `<dest>.part`, the in-progress name of a fetched file.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
