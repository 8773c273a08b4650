//! Local filesystem backend.
//!
//! Device files live anywhere under `[storage.local].root`; lookup walks the
//! tree recursively and takes the first file whose name is exactly
//! `<device_id>_enriched.csv`. Entries are visited sorted by file name so
//! the "first match" is stable across runs.

use anyhow::{anyhow, bail, Result as AnyResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::LocalStorageConfig;
use crate::error::{ExportError, Result};
use crate::models::{Backend, DeviceId, Locator, Reference};
use crate::traits::{backend_failure, StorageBackend};

/// Reads device files from a directory tree on local disk.
pub struct LocalBackend {
    /// Root directory searched recursively; checked to exist at construction.
    config: LocalStorageConfig,
}

impl LocalBackend {
    pub fn new(config: LocalStorageConfig) -> AnyResult<Self> {
        if !config.root.is_dir() {
            bail!(
                "Local storage root does not exist or is not a directory: {}",
                config.root.display()
            );
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> Backend {
        Backend::Local
    }

    async fn resolve(&self, device_id: &DeviceId) -> Result<Locator> {
        let root = self.config.root.clone();
        let follow = self.config.follow_symlinks;
        let file_name = device_id.data_file_name();

        let found = tokio::task::spawn_blocking(move || find_file(&root, &file_name, follow))
            .await
            .map_err(|e| backend_failure(device_id, anyhow!("directory walk panicked: {}", e)))?;

        match found {
            Some(path) => {
                tracing::debug!(device = %device_id, path = %path.display(), "resolved local file");
                Ok(Locator {
                    device_id: device_id.clone(),
                    reference: Reference::Path(path),
                })
            }
            None => Err(ExportError::NotFound(device_id.to_string())),
        }
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>> {
        let Reference::Path(path) = &locator.reference else {
            return Err(backend_failure(
                &locator.device_id,
                anyhow!("local backend cannot fetch a remote locator"),
            ));
        };
        tokio::fs::read(path).await.map_err(|e| {
            backend_failure(
                &locator.device_id,
                anyhow!("failed to read {}: {}", path.display(), e),
            )
        })
    }
}

/// Depth-first search for a file named exactly `file_name`.
///
/// Unreadable subdirectories are skipped with a warning rather than
/// failing the whole lookup.
fn find_file(root: &Path, file_name: &str, follow_symlinks: bool) -> Option<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry during device lookup");
                continue;
            }
        };
        if entry.file_type().is_file() && entry.file_name() == file_name {
            return Some(entry.into_path());
        }
    }
    None
}
