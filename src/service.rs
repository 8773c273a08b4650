//! The request-level pipeline: resolve → load → filter → render → name.
//!
//! [`ExportService`] holds only immutable, shared state (the backend, the
//! directory, policy), so one instance serves every request concurrently.
//! Resolve + load together are bounded by `[storage].timeout_secs`.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, PolicyConfig, TableConfig};
use crate::directory::Directory;
use crate::error::{ExportError, Result};
use crate::filter::{filter_by_date, truncate_to_recent_days, unique_dates};
use crate::loader;
use crate::models::{DateRange, DeviceEntry, DeviceId, ExportArtifact, ExportFormat, Table};
use crate::naming::download_name;
use crate::preview::render_preview;
use crate::render::{render, DocumentPolicy};
use crate::traits::StorageBackend;

pub struct ExportService {
    /// The single storage backend of this deployment.
    backend: Arc<dyn StorageBackend>,
    /// Directory loaded at startup; read-only from here on.
    directory: Arc<Directory>,
    /// Timestamp column and format used when parsing device files.
    table: TableConfig,
    /// Preview day limit and document row/cell limits.
    policy: PolicyConfig,
    /// Upper bound on resolve plus load for one request.
    timeout: Duration,
}

/// Result of a device/group selection.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub group: String,
    pub devices: Vec<DeviceEntry>,
    pub selected: Option<DeviceEntry>,
}

#[derive(Debug, Clone)]
pub struct Preview {
    pub html: String,
    /// Rows shown after truncation.
    pub rows: usize,
    /// Distinct dates shown after truncation.
    pub dates: Vec<NaiveDate>,
    /// Whether older dates were cut to honour the preview day limit.
    pub truncated: bool,
}

impl ExportService {
    pub fn new(backend: Arc<dyn StorageBackend>, directory: Arc<Directory>, config: &Config) -> Self {
        Self {
            backend,
            directory,
            table: config.table.clone(),
            policy: config.policy.clone(),
            timeout: Duration::from_secs(config.storage.timeout_secs),
        }
    }

    pub fn with_policy(
        backend: Arc<dyn StorageBackend>,
        directory: Arc<Directory>,
        table: TableConfig,
        policy: PolicyConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            directory,
            table,
            policy,
            timeout,
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Select by group, by device, or both.
    ///
    /// A device id pins the group to the device's own group unless an
    /// explicit group is given.
    pub fn select(&self, group: Option<&str>, device_id: Option<&str>) -> Result<Selection> {
        let selected = match device_id {
            Some(raw) => {
                let id = DeviceId::parse(raw)?;
                let entry = self
                    .directory
                    .find_device(&id)
                    .ok_or_else(|| ExportError::NotFound(id.to_string()))?;
                Some(entry.clone())
            }
            None => None,
        };

        let group = match (group, &selected) {
            (Some(g), _) => g.to_string(),
            (None, Some(entry)) => entry.group.clone(),
            (None, None) => return Err(ExportError::MissingParameter("group")),
        };

        let devices = self.directory.list_devices_for(&group).to_vec();
        let selected = selected.filter(|entry| entry.group == group);
        Ok(Selection {
            group,
            devices,
            selected,
        })
    }

    /// Resolve and load a device's full table within the configured bound.
    pub async fn load_device(&self, raw_id: &str) -> Result<(DeviceId, Table)> {
        let device_id = DeviceId::parse(raw_id)?;
        let backend = self.backend.as_ref();
        let work = async {
            let locator = backend.resolve(&device_id).await?;
            loader::load(backend, &locator, &self.table).await
        };

        let table = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| ExportError::SourceUnavailable {
                device_id: device_id.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        tracing::debug!(device = %device_id, rows = table.len(), "loaded device table");
        Ok((device_id, table))
    }

    pub async fn available_dates(&self, raw_id: &str) -> Result<Vec<NaiveDate>> {
        let (_, table) = self.load_device(raw_id).await?;
        Ok(unique_dates(&table))
    }

    /// Preview never fails on an empty range; it renders a notice instead.
    pub async fn preview(&self, raw_id: &str, range: &DateRange) -> Result<Preview> {
        let (device_id, table) = self.load_device(raw_id).await?;
        let filtered = filter_by_date(&table, range);
        let shown = truncate_to_recent_days(&filtered, self.policy.preview_recent_days);
        let truncated = shown.len() < filtered.len();

        Ok(Preview {
            html: render_preview(&device_id, range, &shown),
            rows: shown.len(),
            dates: unique_dates(&shown),
            truncated,
        })
    }

    /// Full-range file export. An empty range is [`ExportError::EmptyResult`].
    pub async fn export(
        &self,
        raw_id: &str,
        range: &DateRange,
        format: ExportFormat,
    ) -> Result<ExportArtifact> {
        let (device_id, table) = self.load_device(raw_id).await?;
        let filtered = filter_by_date(&table, range);
        if filtered.is_empty() {
            return Err(ExportError::EmptyResult {
                device_id: device_id.to_string(),
                start: range.start.to_string(),
                end: range.end.to_string(),
            });
        }

        let title = format!(
            "Table Data: {} ({} to {})",
            device_id, range.start, range.end
        );
        let (bytes, mime_type) =
            render(&filtered, format, &DocumentPolicy::from(&self.policy), &title)?;
        let file_name = download_name(&device_id, range, format.extension());

        tracing::info!(
            device = %device_id,
            format = format.extension(),
            rows = filtered.len(),
            bytes = bytes.len(),
            "export rendered"
        );
        Ok(ExportArtifact {
            bytes,
            mime_type,
            file_name,
        })
    }
}
