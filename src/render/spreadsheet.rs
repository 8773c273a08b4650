//! XLSX export.
//!
//! Writes a minimal SpreadsheetML package (one worksheet) with `zip` and
//! `quick-xml`. Text cells are inline strings with whitespace preserved;
//! a cell becomes numeric only when its text is the canonical rendering of
//! a finite number, so reading the sheet back yields the original text.
//!
//! Inline text is escaped the way SpreadsheetML readers expect: carriage
//! returns as `&#13;` (a literal CR would be normalized away by the XML
//! parser), other C0 control characters as `_xHHHH_`, and text that already
//! looks like `_xHHHH_` gets its underscore escaped as `_x005F_`.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::{ExportError, Result};
use crate::models::Table;

pub const SHEET_NAME: &str = "Data";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn render_xlsx(table: &Table) -> Result<Vec<u8>> {
    let sheet = sheet_xml(table)?;

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:r="{}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        SPREADSHEET_NS, RELATIONSHIPS_NS, SHEET_NAME
    );

    let parts: [(&str, &[u8]); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", ROOT_RELS.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes()),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];
    for (name, body) in parts {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name, options).map_err(ExportError::render)?;
        zip.write_all(body).map_err(ExportError::render)?;
    }

    let cursor = zip.finish().map_err(ExportError::render)?;
    Ok(cursor.into_inner())
}

fn sheet_xml(table: &Table) -> Result<Vec<u8>> {
    let mut w = quick_xml::Writer::new(Vec::new());

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(ExportError::render)?;
    w.write_event(Event::Start(
        BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS)]),
    ))
    .map_err(ExportError::render)?;
    w.write_event(Event::Start(BytesStart::new("sheetData")))
        .map_err(ExportError::render)?;

    let header = table.columns.iter().map(String::as_str);
    write_row(&mut w, 1, header, false)?;
    for (i, row) in table.rows.iter().enumerate() {
        write_row(&mut w, i + 2, row.cells.iter().map(String::as_str), true)?;
    }

    w.write_event(Event::End(BytesEnd::new("sheetData")))
        .map_err(ExportError::render)?;
    w.write_event(Event::End(BytesEnd::new("worksheet")))
        .map_err(ExportError::render)?;
    Ok(w.into_inner())
}

fn write_row<'a>(
    w: &mut quick_xml::Writer<Vec<u8>>,
    row_number: usize,
    cells: impl Iterator<Item = &'a str>,
    allow_numbers: bool,
) -> Result<()> {
    let r = row_number.to_string();
    w.write_event(Event::Start(
        BytesStart::new("row").with_attributes([("r", r.as_str())]),
    ))
    .map_err(ExportError::render)?;

    for (col, text) in cells.enumerate() {
        let cell_ref = format!("{}{}", column_letters(col), row_number);
        if allow_numbers && is_canonical_number(text) {
            w.write_event(Event::Start(
                BytesStart::new("c").with_attributes([("r", cell_ref.as_str())]),
            ))
            .map_err(ExportError::render)?;
            w.write_event(Event::Start(BytesStart::new("v")))
                .map_err(ExportError::render)?;
            w.write_event(Event::Text(BytesText::new(text)))
                .map_err(ExportError::render)?;
            w.write_event(Event::End(BytesEnd::new("v")))
                .map_err(ExportError::render)?;
        } else {
            w.write_event(Event::Start(
                BytesStart::new("c")
                    .with_attributes([("r", cell_ref.as_str()), ("t", "inlineStr")]),
            ))
            .map_err(ExportError::render)?;
            w.write_event(Event::Start(BytesStart::new("is")))
                .map_err(ExportError::render)?;
            write_inline_text(w, text)?;
            w.write_event(Event::End(BytesEnd::new("is")))
                .map_err(ExportError::render)?;
        }
        w.write_event(Event::End(BytesEnd::new("c")))
            .map_err(ExportError::render)?;
    }

    w.write_event(Event::End(BytesEnd::new("row")))
        .map_err(ExportError::render)?;
    Ok(())
}

fn write_inline_text(w: &mut quick_xml::Writer<Vec<u8>>, text: &str) -> Result<()> {
    w.write_event(Event::Start(
        BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
    ))
    .map_err(ExportError::render)?;
    w.write_event(Event::Text(BytesText::from_escaped(escape_inline(text))))
        .map_err(ExportError::render)?;
    w.write_event(Event::End(BytesEnd::new("t")))
        .map_err(ExportError::render)?;
    Ok(())
}

/// Zero-based column index → `A`, `B`, … `Z`, `AA`, …
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn is_canonical_number(text: &str) -> bool {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => v.to_string() == text,
        _ => false,
    }
}

/// Escape cell text for a `<t>` element, already in XML-escaped form.
fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '_' if looks_like_escape(&text[i..]) => out.push_str("_x005F_"),
            c if is_xml_forbidden(c) => out.push_str(&format!("_x{:04X}_", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `_xHHHH_` at the start of `rest`.
fn looks_like_escape(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() >= 7
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}

/// XML 1.0 cannot carry these C0 control characters, even as references.
fn is_xml_forbidden(c: char) -> bool {
    (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r')
}
