//! Interactive preview rendering.
//!
//! Produces an HTML fragment: either a table of the (already truncated)
//! rows or an explicit "no data" notice. An empty table is a normal state
//! here, unlike the file exports.

use std::fmt::Write;

use crate::models::{DateRange, DeviceId, Table};

pub const NO_DATA_NOTICE: &str = "No data available for the selected date range.";

pub fn render_preview(device_id: &DeviceId, range: &DateRange, table: &Table) -> String {
    let mut html = String::new();
    let _ = writeln!(
        html,
        "<section class=\"preview\" data-device=\"{}\" data-start=\"{}\" data-end=\"{}\">",
        device_id, range.start, range.end
    );

    if table.is_empty() {
        let _ = writeln!(html, "<p class=\"no-data\">{}</p>", NO_DATA_NOTICE);
        html.push_str("</section>\n");
        return html;
    }

    html.push_str("<table>\n<thead><tr>");
    for column in &table.columns {
        let _ = write!(html, "<th>{}</th>", escape_html(column));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in &row.cells {
            let _ = write!(html, "<td>{}</td>", escape_html(cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</section>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
