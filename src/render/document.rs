//! Paginated PDF export.
//!
//! Layout and encoding are split: [`paginate`] is a pure function that
//! places text on fixed-size pages, [`render_pdf`] turns those pages into
//! PDF content streams with `lopdf`.
//!
//! The document is a printing aid, not an archive. Only the first
//! `max_rows` rows are laid out and every cell longer than
//! `max_cell_chars` is cut to `max_cell_chars - 3` characters plus `...`.
//! Title and header appear once, on the first page.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::DocumentPolicy;
use crate::error::{ExportError, Result};
use crate::models::Table;

const ELLIPSIS: &str = "...";

/// Page size and text grid, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_x: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub row_height: f32,
    pub font_size: f32,
}

impl PageGeometry {
    /// US Letter, 9pt Helvetica, 20pt rows.
    pub fn letter() -> Self {
        Self {
            width: 612.0,
            height: 792.0,
            margin_x: 30.0,
            margin_top: 40.0,
            margin_bottom: 40.0,
            row_height: 20.0,
            font_size: 9.0,
        }
    }

    fn column_width(&self, columns: usize) -> f32 {
        (self.width - 2.0 * self.margin_x) / columns.max(1) as f32
    }
}

/// A run of text anchored at its baseline origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub texts: Vec<PlacedText>,
    /// Number of data rows on this page (title and header excluded).
    pub data_rows: usize,
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn elide(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Lay out a title line, a header row and data rows top to bottom.
///
/// A new page starts whenever the next line would fall below the bottom
/// margin. Continuation pages hold data rows only.
pub fn paginate(
    title: &str,
    header: &[String],
    rows: &[Vec<String>],
    geometry: &PageGeometry,
    max_cell_chars: usize,
) -> Vec<Page> {
    let col_width = geometry.column_width(header.len());
    let top = geometry.height - geometry.margin_top;

    let mut pages = Vec::new();
    let mut page = Page::default();
    let mut y = top;

    page.texts.push(PlacedText {
        x: geometry.margin_x,
        y,
        text: title.to_string(),
    });
    y -= geometry.row_height;

    let place_row = |page: &mut Page, y: f32, cells: &[String]| {
        for (i, cell) in cells.iter().enumerate() {
            page.texts.push(PlacedText {
                x: geometry.margin_x + i as f32 * col_width,
                y,
                text: elide(cell, max_cell_chars),
            });
        }
    };

    place_row(&mut page, y, header);
    y -= geometry.row_height;

    for row in rows {
        if y < geometry.margin_bottom {
            pages.push(std::mem::take(&mut page));
            y = top;
        }
        place_row(&mut page, y, row);
        page.data_rows += 1;
        y -= geometry.row_height;
    }

    pages.push(page);
    pages
}

pub fn render_pdf(table: &Table, policy: &DocumentPolicy, title: &str) -> Result<Vec<u8>> {
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(policy.max_rows)
        .map(|r| r.cells.clone())
        .collect();
    let geometry = PageGeometry::letter();
    let pages = paginate(title, &table.columns, &rows, &geometry, policy.max_cell_chars);
    write_pdf(&pages, &geometry)
}

fn write_pdf(pages: &[Page], geometry: &PageGeometry) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let mut operations = Vec::with_capacity(page.texts.len() * 4 + 2);
        operations.push(Operation::new(
            "Tf",
            vec!["F1".into(), geometry.font_size.into()],
        ));
        for placed in &page.texts {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Td",
                vec![placed.x.into(), placed.y.into()],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(latin1(&placed.text))],
            ));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let encoded = content.encode().map_err(ExportError::render)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), geometry.width.into(), geometry.height.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(ExportError::render)?;
    Ok(out)
}

/// Standard Type1 fonts only cover a single-byte encoding.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
        .collect()
}
