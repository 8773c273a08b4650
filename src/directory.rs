//! Device directory: groups (stations/databases) and the devices in each.
//!
//! Loaded once at startup from the `devices` table of the SQLite catalog
//! and never mutated afterwards; share it as `Arc<Directory>`. A load
//! failure is a [`ExportError::Configuration`] fault and should stop the
//! process.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

use crate::db;
use crate::error::{ExportError, Result};
use crate::models::{DeviceEntry, DeviceId};

#[derive(Debug, Clone, Default)]
pub struct Directory {
    groups: BTreeMap<String, Vec<DeviceEntry>>,
}

impl Directory {
    pub async fn load(path: &Path) -> Result<Self> {
        let pool = db::connect_read_only(path)
            .await
            .map_err(|e| ExportError::Configuration(format!("{:#}", e)))?;

        let rows = sqlx::query(
            "SELECT group_name, device_id, display_name FROM devices \
             ORDER BY group_name, display_name, device_id",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            ExportError::Configuration(format!(
                "failed to read devices from {}: {}",
                path.display(),
                e
            ))
        })?;
        pool.close().await;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let group = text_column(&row, "group_name", path)?;
            let raw_id = text_column(&row, "device_id", path)?;
            let display_name = text_column(&row, "display_name", path)?;
            match DeviceId::parse(&raw_id) {
                Ok(device_id) => entries.push(DeviceEntry {
                    group,
                    device_id,
                    display_name,
                }),
                Err(_) => {
                    tracing::warn!(group = %group, device_id = %raw_id, "skipping directory row with invalid device id")
                }
            }
        }

        let directory = Self::from_entries(entries);
        tracing::info!(
            groups = directory.groups.len(),
            devices = directory.device_count(),
            "loaded device directory"
        );
        Ok(directory)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = DeviceEntry>) -> Self {
        let mut groups: BTreeMap<String, Vec<DeviceEntry>> = BTreeMap::new();
        for entry in entries {
            groups.entry(entry.group.clone()).or_default().push(entry);
        }
        Self { groups }
    }

    /// Group names, sorted.
    pub fn list_groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Devices in `group`, ordered by display name. Unknown groups yield
    /// an empty slice.
    pub fn list_devices_for(&self, group: &str) -> &[DeviceEntry] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first directory entry for `device_id`, in group order.
    pub fn find_device(&self, device_id: &DeviceId) -> Option<&DeviceEntry> {
        self.groups
            .values()
            .flatten()
            .find(|e| &e.device_id == device_id)
    }

    pub fn device_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

fn text_column(row: &SqliteRow, column: &str, path: &Path) -> Result<String> {
    row.try_get::<String, _>(column).map_err(|e| {
        ExportError::Configuration(format!(
            "unreadable {} in devices table of {}: {}",
            column,
            path.display(),
            e
        ))
    })
}
