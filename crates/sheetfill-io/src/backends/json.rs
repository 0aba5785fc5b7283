//! JSON documents: a serde mirror of the in-memory sheet buffers.
//!
//! The format keeps sheets in workbook order and cells sparse, so a filled
//! document serializes to exactly what a reader would load back. Formula
//! text is stored without a leading `=`; a leading `=` in incoming json is
//! accepted and stripped.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sheetfill_common::{AreaRef, CellRef, Value};
use sheetfill_engine::transform::{CellData, DocumentTransformer, ImageKind, InMemoryTransformer};

use crate::IoError;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct JsonWorkbook {
    #[serde(default)]
    pub sheets: Vec<JsonSheet>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct JsonSheet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<JsonCell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<JsonComment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_heights: Vec<(u32, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub col_widths: Vec<(u32, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged: Vec<AreaRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<JsonImage>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JsonCell {
    pub row: u32,
    pub col: u32,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JsonComment {
    pub row: u32,
    pub col: u32,
    pub text: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JsonImage {
    pub area: AreaRef,
    pub kind: String,
    pub data: Vec<u8>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

fn kind_name(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Png => "png",
        ImageKind::Jpeg => "jpeg",
        ImageKind::Gif => "gif",
        ImageKind::Bmp => "bmp",
    }
}

impl JsonWorkbook {
    /// Snapshot the live buffers of a document.
    pub fn from_document(doc: &InMemoryTransformer) -> Self {
        let sheets = doc
            .sheet_buffers()
            .iter()
            .map(|buf| JsonSheet {
                name: buf.name.clone(),
                cells: buf
                    .cells
                    .iter()
                    .map(|(&(row, col), content)| JsonCell {
                        row,
                        col,
                        value: content.value.clone(),
                        formula: content.formula.clone(),
                        style: content.style,
                    })
                    .collect(),
                comments: buf
                    .comments
                    .iter()
                    .map(|(&(row, col), text)| JsonComment {
                        row,
                        col,
                        text: text.clone(),
                    })
                    .collect(),
                row_heights: buf.row_heights.iter().map(|(&r, &h)| (r, h)).collect(),
                col_widths: buf.col_widths.iter().map(|(&c, &w)| (c, w)).collect(),
                merged: buf.merged.clone(),
                images: buf
                    .images
                    .iter()
                    .map(|img| JsonImage {
                        area: img.area.clone(),
                        kind: kind_name(img.kind).to_string(),
                        data: img.data.clone(),
                    })
                    .collect(),
                hidden: buf.hidden,
            })
            .collect();
        JsonWorkbook { sheets }
    }

    /// Rebuild an in-memory document, template snapshot included.
    pub fn into_document(self) -> Result<InMemoryTransformer, IoError> {
        let mut doc = InMemoryTransformer::new();
        for sheet in self.sheets {
            doc.add_sheet(&sheet.name);
            for cell in sheet.cells {
                let mut data = match &cell.formula {
                    Some(formula) => {
                        let text = formula.strip_prefix('=').unwrap_or(formula);
                        let mut data = CellData::from_formula(text);
                        data.value = cell.value;
                        data
                    }
                    None => CellData::from_value(cell.value),
                };
                data.style = cell.style;
                doc.load_cell(CellRef::new(sheet.name.clone(), cell.row, cell.col), data);
            }
            for comment in sheet.comments {
                doc.load_comment(
                    &CellRef::new(sheet.name.clone(), comment.row, comment.col),
                    comment.text,
                );
            }
            for (row, height) in sheet.row_heights {
                doc.load_row_height(&sheet.name, row, height);
            }
            for (col, width) in sheet.col_widths {
                doc.load_col_width(&sheet.name, col, width);
            }
            for area in sheet.merged {
                doc.merge_cells(&area)?;
            }
            for image in sheet.images {
                let kind = image.kind.parse::<ImageKind>().map_err(|_| IoError::Field {
                    field: "image kind",
                    value: image.kind.clone(),
                })?;
                doc.add_image(&image.area, &image.data, kind)?;
            }
            if sheet.hidden {
                doc.hide_sheet(&sheet.name)?;
            }
        }
        Ok(doc)
    }
}

pub fn read_template(reader: impl Read) -> Result<InMemoryTransformer, IoError> {
    let workbook: JsonWorkbook = serde_json::from_reader(reader)?;
    debug!(sheets = workbook.sheets.len(), "document json parsed");
    workbook.into_document()
}

pub fn read_template_str(text: &str) -> Result<InMemoryTransformer, IoError> {
    let workbook: JsonWorkbook = serde_json::from_str(text)?;
    workbook.into_document()
}

pub fn read_template_path(path: impl AsRef<Path>) -> Result<InMemoryTransformer, IoError> {
    read_template(BufReader::new(File::open(path)?))
}

pub fn write_document(doc: &InMemoryTransformer, writer: impl Write) -> Result<(), IoError> {
    serde_json::to_writer_pretty(writer, &JsonWorkbook::from_document(doc))?;
    Ok(())
}

pub fn write_document_path(
    doc: &InMemoryTransformer,
    path: impl AsRef<Path>,
) -> Result<(), IoError> {
    write_document(doc, BufWriter::new(File::create(path)?))
}

pub fn document_to_string(doc: &InMemoryTransformer) -> Result<String, IoError> {
    Ok(serde_json::to_string_pretty(&JsonWorkbook::from_document(
        doc,
    ))?)
}
