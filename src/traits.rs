//! Storage backend abstraction.
//!
//! A deployment reads device data from exactly one backend, chosen from
//! `[storage].backend` at startup:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │       StorageBackend         │
//!            │  ┌──────────┐ ┌───────────┐  │
//!            │  │  Local   │ │  Drive    │  │
//!            │  │ (walkdir)│ │ (reqwest) │  │
//!            │  └──────────┘ └───────────┘  │
//!            └──────────────┬───────────────┘
//!                           ▼
//!                 resolve() → fetch() → loader
//! ```

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendKind, Config};
use crate::connector_drive::{DriveBackend, TokenSource};
use crate::connector_fs::LocalBackend;
use crate::error::{ExportError, Result};
use crate::models::{Backend, DeviceId, Locator};

/// A read-only source of per-device data files.
///
/// Implementations never mutate the underlying store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> Backend;

    /// Find the data file for `device_id`.
    ///
    /// Returns [`ExportError::NotFound`] when no file matches and
    /// [`ExportError::Load`] when the backend itself failed.
    async fn resolve(&self, device_id: &DeviceId) -> Result<Locator>;

    /// Retrieve the full content behind a locator produced by
    /// [`resolve`](StorageBackend::resolve).
    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>>;
}

/// Build the configured backend. Failures here are startup faults.
pub fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let timeout = Duration::from_secs(config.storage.timeout_secs);
    match config.storage.backend {
        BackendKind::Local => {
            let local = config
                .storage
                .local
                .as_ref()
                .context("[storage.local] is not configured")?;
            Ok(Arc::new(LocalBackend::new(local.clone())?))
        }
        BackendKind::Remote => {
            let remote = config
                .storage
                .remote
                .as_ref()
                .context("[storage.remote] is not configured")?;
            let tokens = TokenSource::from_config(remote)?;
            Ok(Arc::new(DriveBackend::new(remote.clone(), tokens, timeout)?))
        }
    }
}

pub(crate) fn backend_failure(device_id: &DeviceId, err: impl Into<anyhow::Error>) -> ExportError {
    ExportError::load(device_id.as_str(), err)
}
