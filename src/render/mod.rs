//! Export rendering.
//!
//! | Format | Module | Fidelity |
//! |--------|--------|----------|
//! | CSV | [`delimited`] | lossless |
//! | XLSX | [`spreadsheet`] | lossless, one sheet |
//! | PDF | [`document`] | first N rows, long cells elided, paginated |
//!
//! Only the PDF path is lossy. Empty tables are rejected here at the file
//! level; the preview path handles them separately.

pub mod delimited;
pub mod document;
pub mod spreadsheet;

use crate::config::PolicyConfig;
use crate::error::{ExportError, Result};
use crate::models::{ExportFormat, Table};

/// Limits applied by the paginated document renderer.
#[derive(Debug, Clone, Copy)]
pub struct DocumentPolicy {
    pub max_rows: usize,
    pub max_cell_chars: usize,
}

impl Default for DocumentPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for DocumentPolicy {
    fn from(p: &PolicyConfig) -> Self {
        Self {
            max_rows: p.document_max_rows,
            max_cell_chars: p.document_max_cell_chars,
        }
    }
}

/// Render `table` as `format`, returning the bytes and MIME type.
///
/// `title` is printed at the top of the first page of a PDF and ignored by
/// the other formats.
pub fn render(
    table: &Table,
    format: ExportFormat,
    policy: &DocumentPolicy,
    title: &str,
) -> Result<(Vec<u8>, &'static str)> {
    if table.is_empty() {
        return Err(ExportError::Render("table has no rows".to_string()));
    }
    let bytes = match format {
        ExportFormat::Csv => delimited::render_csv(table)?,
        ExportFormat::Xlsx => spreadsheet::render_xlsx(table)?,
        ExportFormat::Pdf => document::render_pdf(table, policy, title)?,
    };
    Ok((bytes, format.mime_type()))
}
