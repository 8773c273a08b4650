//! CSV export: header plus every row, cells written verbatim with standard
//! quoting.

use crate::error::{ExportError, Result};
use crate::models::Table;

pub fn render_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(&table.columns).map_err(ExportError::render)?;
    for row in &table.rows {
        writer.write_record(&row.cells).map_err(ExportError::render)?;
    }
    writer.into_inner().map_err(ExportError::render)
}
