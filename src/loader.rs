//! Record loading: raw bytes → time-indexed [`Table`].
//!
//! The content is a header-first delimited file. The timestamp column is
//! parsed with one fixed format (by default `%d/%m/%y %H:%M`); rows that
//! do not parse are dropped and counted, never retried with other formats.

use anyhow::anyhow;
use chrono::NaiveDateTime;

use crate::config::TableConfig;
use crate::error::{ExportError, Result};
use crate::models::{Locator, Row, Table};
use crate::traits::StorageBackend;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Fetch and parse the dataset behind `locator`.
///
/// The locator must come from the same kind of backend that fetches it.
pub async fn load(
    backend: &dyn StorageBackend,
    locator: &Locator,
    table_config: &TableConfig,
) -> Result<Table> {
    if locator.backend() != backend.kind() {
        return Err(ExportError::load(
            locator.device_id.as_str(),
            anyhow!(
                "{:?} locator cannot be fetched by the {:?} backend",
                locator.backend(),
                backend.kind()
            ),
        ));
    }
    let bytes = backend.fetch(locator).await?;
    let table = parse_table(&bytes, table_config)
        .map_err(|e| ExportError::load(locator.device_id.as_str(), e))?;

    if table.dropped_rows > 0 {
        tracing::warn!(
            device = %locator.device_id,
            backend = ?locator.backend(),
            dropped = table.dropped_rows,
            kept = table.len(),
            "dropped rows with unparsable timestamps"
        );
    }
    Ok(table)
}

/// Parse delimited content into a [`Table`].
///
/// Errors only when the content itself is unusable (no header, missing
/// timestamp column, broken quoting). A file whose rows all fail timestamp
/// parsing yields an empty table.
pub fn parse_table(bytes: &[u8], table_config: &TableConfig) -> anyhow::Result<Table> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    if columns.iter().all(|c| c.is_empty()) {
        return Err(anyhow!("missing header row"));
    }

    let ts_index = columns
        .iter()
        .position(|c| c == &table_config.timestamp_column)
        .ok_or_else(|| {
            anyhow!(
                "timestamp column '{}' not found in header",
                table_config.timestamp_column
            )
        })?;

    let width = columns.len();
    let mut rows = Vec::new();
    let mut dropped_rows = 0;

    for record in reader.byte_records() {
        let record = record?;
        let mut cells: Vec<String> = record
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        cells.resize(width, String::new());

        match parse_timestamp(&cells[ts_index], &table_config.timestamp_format) {
            Some(timestamp) => rows.push(Row { timestamp, cells }),
            None => dropped_rows += 1,
        }
    }

    Ok(Table {
        columns,
        rows,
        dropped_rows,
    })
}

fn parse_timestamp(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), format).ok()
}
