#![cfg(feature = "umya")]

//! Template transformer over the `umya-spreadsheet` xlsx codec.
//!
//! The workbook is read eagerly and snapshotted cell by cell into template
//! data; cell comments become the annotation source the area builder reads.
//! Fills write straight into the live [`Spreadsheet`], so styles, column
//! widths and everything else umya round-trips survive untouched.

use std::io::Write;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;
use umya_spreadsheet::{CellRawValue, CellValue, Spreadsheet, Style, Worksheet, reader, writer};

use sheetfill_common::{AreaRef, CellRef, Value};
use sheetfill_engine::transform::{CellData, CellWrite, DocumentTransformer, FormulaParams};
use sheetfill_engine::{Context, ImageKind, TemplateError};

use crate::IoError;

/// [`DocumentTransformer`] backed by an umya [`Spreadsheet`].
///
/// The template snapshot is taken when the transformer is built; mutate the
/// book through [`UmyaTransformer::book_mut`] only to inspect or post-process
/// a finished fill.
pub struct UmyaTransformer {
    book: Spreadsheet,
    template: FxHashMap<CellRef, CellData>,
    comments: FxHashMap<CellRef, String>,
}

impl UmyaTransformer {
    /// Read an xlsx template from disk.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let mut book =
            reader::xlsx::read(path.as_ref()).map_err(|e| IoError::Xlsx(e.to_string()))?;
        for i in 0..book.get_sheet_count() {
            book.read_sheet(i);
        }
        Ok(Self::from_book(book))
    }

    /// Wrap an already loaded workbook.
    pub fn from_book(book: Spreadsheet) -> Self {
        let (template, comments) = snapshot(&book);
        debug!(
            sheets = book.get_sheet_count(),
            cells = template.len(),
            comments = comments.len(),
            "xlsx template snapshot"
        );
        UmyaTransformer {
            book,
            template,
            comments,
        }
    }

    /// Attach an annotation as if the workbook carried it as a cell comment.
    pub fn annotate(&mut self, cell: CellRef, text: impl Into<String>) {
        self.comments.insert(cell, text.into());
    }

    pub fn save_path(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        writer::xlsx::write(&self.book, path.as_ref()).map_err(|e| IoError::Xlsx(e.to_string()))
    }

    pub fn book(&self) -> &Spreadsheet {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut Spreadsheet {
        &mut self.book
    }

    fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.book.get_sheet_by_name(name)
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut Worksheet, TemplateError> {
        self.book
            .get_sheet_by_name_mut(name)
            .ok_or_else(|| TemplateError::sheet(name, "no such sheet"))
    }

    fn cell_style(&self, at: &CellRef) -> Option<Style> {
        let cell = self.sheet(&at.sheet)?.get_cell((at.col + 1, at.row + 1))?;
        Some(cell.get_style().clone())
    }
}

/// Capture every non-empty cell and every cell comment, 0-based.
fn snapshot(book: &Spreadsheet) -> (FxHashMap<CellRef, CellData>, FxHashMap<CellRef, String>) {
    let mut template = FxHashMap::default();
    let mut comments = FxHashMap::default();
    for i in 0..book.get_sheet_count() {
        let Some(ws) = book.get_sheet(&i) else {
            continue;
        };
        let name = ws.get_name().to_string();
        for cell in ws.get_cell_collection() {
            let coord = cell.get_coordinate();
            let at = CellRef::new(
                name.clone(),
                *coord.get_row_num() - 1,
                *coord.get_col_num() - 1,
            );
            let cv = cell.get_cell_value();
            if cv.is_formula() && !cv.get_formula().is_empty() {
                let text = cv.get_formula();
                let data = CellData::from_formula(text.strip_prefix('=').unwrap_or(text));
                template.insert(at, data);
            } else if let Some(value) = convert_value(cv) {
                template.insert(at, CellData::from_value(value));
            }
        }
        for comment in ws.get_comments() {
            let text = comment.get_text().get_text().to_string();
            if text.trim().is_empty() {
                continue;
            }
            let coord = comment.get_coordinate();
            let at = CellRef::new(
                name.clone(),
                *coord.get_row_num() - 1,
                *coord.get_col_num() - 1,
            );
            comments.insert(at, text);
        }
    }
    (template, comments)
}

fn convert_value(cv: &CellValue) -> Option<Value> {
    let raw = cv.get_raw_value();
    if raw.is_empty() {
        return None;
    }
    if raw.is_error() {
        // keep the error literal as text so replay reproduces it
        return Some(Value::Text(cv.get_value().to_string()));
    }
    match raw {
        CellRawValue::Numeric(n) => Some(Value::Number(*n)),
        CellRawValue::Bool(b) => Some(Value::Bool(*b)),
        CellRawValue::String(s) => Some(Value::Text(s.to_string())),
        CellRawValue::RichText(rt) => Some(Value::Text(rt.get_text().to_string())),
        CellRawValue::Lazy(s) => {
            let text = s.as_ref();
            if let Ok(n) = text.parse::<f64>() {
                Some(Value::Number(n))
            } else if text.eq_ignore_ascii_case("TRUE") {
                Some(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("FALSE") {
                Some(Value::Bool(false))
            } else {
                Some(Value::Text(text.to_string()))
            }
        }
        CellRawValue::Error(_) => unreachable!(),
        CellRawValue::Empty => None,
    }
}

/// Write a plain value, dropping any formula the slot carried.
fn put_value(ws: &mut Worksheet, at: &CellRef, value: &Value) {
    let pos = (at.col + 1, at.row + 1);
    let style = ws.get_cell(pos).map(|c| c.get_style().clone());
    ws.remove_cell(pos);
    let cell = ws.get_cell_mut(pos);
    if let Some(style) = style {
        cell.set_style(style);
    }
    match value {
        Value::Empty => {
            cell.set_blank();
        }
        Value::Bool(b) => {
            cell.set_value_bool(*b);
        }
        Value::Int(i) => {
            cell.set_value_number(*i as f64);
        }
        Value::Number(n) => {
            cell.set_value_number(*n);
        }
        Value::Text(s) => {
            cell.set_value(s.as_str());
        }
        other => {
            cell.set_value(other.to_string());
        }
    }
}

impl DocumentTransformer for UmyaTransformer {
    fn transform_cell(
        &mut self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        update_row_height: bool,
    ) -> Result<(), TemplateError> {
        let Some(data) = self.template.get(src) else {
            return Ok(());
        };
        let write = data.evaluate(ctx)?;
        self.template
            .get_mut(src)
            .expect("snapshot entry checked above")
            .record_target(target.clone());
        let style = self.cell_style(src);
        let ws = self.sheet_mut(&target.sheet)?;
        match write {
            CellWrite::Value(value) => put_value(ws, target, &value),
            CellWrite::Formula(text) => {
                // the formula pass rewrites references afterwards
                let cell = ws.get_cell_mut((target.col + 1, target.row + 1));
                cell.set_formula(text.trim_start_matches('=').to_string());
            }
        }
        if let Some(style) = style {
            ws.get_cell_mut((target.col + 1, target.row + 1))
                .set_style(style);
        }
        if update_row_height {
            if let Some(height) = self.row_height(&src.sheet, src.row) {
                self.set_row_height(&target.sheet, target.row, height)?;
            }
        }
        Ok(())
    }

    fn cell_data(&self, cell: &CellRef) -> Option<&CellData> {
        self.template.get(cell)
    }

    fn cell_comment(&self, cell: &CellRef) -> Option<String> {
        self.comments.get(cell).cloned()
    }

    fn commented_cells(&self) -> Vec<(CellRef, String)> {
        let order: FxHashMap<String, usize> = self
            .sheet_names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();
        let mut out: Vec<(CellRef, String)> = self
            .comments
            .iter()
            .map(|(cell, text)| (cell.clone(), text.clone()))
            .collect();
        out.sort_by_key(|(cell, _)| {
            (
                order.get(&cell.sheet).copied().unwrap_or(usize::MAX),
                cell.row,
                cell.col,
            )
        });
        out
    }

    fn formula_cells(&self) -> Vec<CellRef> {
        let mut out: Vec<CellRef> = self
            .template
            .iter()
            .filter(|(_, data)| data.is_formula())
            .map(|(cell, _)| cell.clone())
            .collect();
        out.sort_by_key(|cell| (cell.sheet.clone(), cell.row, cell.col));
        out
    }

    fn sheet_names(&self) -> Vec<String> {
        let count = self.book.get_sheet_count();
        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            if let Some(sheet) = self.book.get_sheet(&i) {
                names.push(sheet.get_name().to_string());
            }
        }
        names
    }

    fn set_cell_value(&mut self, cell: &CellRef, value: Value) -> Result<(), TemplateError> {
        let ws = self.sheet_mut(&cell.sheet)?;
        put_value(ws, cell, &value);
        Ok(())
    }

    fn set_formula(&mut self, cell: &CellRef, formula: &str) -> Result<(), TemplateError> {
        let ws = self.sheet_mut(&cell.sheet)?;
        ws.get_cell_mut((cell.col + 1, cell.row + 1))
            .set_formula(formula.trim_start_matches('=').to_string());
        Ok(())
    }

    fn clear_cell(&mut self, cell: &CellRef) -> Result<(), TemplateError> {
        if let Some(ws) = self.book.get_sheet_by_name_mut(&cell.sheet) {
            ws.remove_cell((cell.col + 1, cell.row + 1));
        }
        Ok(())
    }

    fn set_formula_params(
        &mut self,
        cell: &CellRef,
        params: FormulaParams,
    ) -> Result<(), TemplateError> {
        self.template
            .entry(cell.clone())
            .or_insert_with(|| CellData::from_value(Value::Empty))
            .params = Some(params);
        Ok(())
    }

    fn clone_sheet(&mut self, src: &str, new_name: &str) -> Result<(), TemplateError> {
        if self.book.get_sheet_by_name(new_name).is_some() {
            return Err(TemplateError::sheet(new_name, "sheet already exists"));
        }
        let Some(ws) = self.book.get_sheet_by_name(src) else {
            return Err(TemplateError::sheet(src, "no such sheet"));
        };
        let mut copy = ws.clone();
        copy.set_name(new_name);
        self.book
            .add_sheet(copy)
            .map_err(|e| TemplateError::sheet(new_name, e))?;
        Ok(())
    }

    fn delete_sheet(&mut self, name: &str) -> Result<(), TemplateError> {
        self.book
            .remove_sheet_by_name(name)
            .map_err(|_| TemplateError::sheet(name, "no such sheet"))
    }

    fn hide_sheet(&mut self, name: &str) -> Result<(), TemplateError> {
        self.sheet_mut(name)?.set_sheet_state("hidden".to_string());
        Ok(())
    }

    fn merge_cells(&mut self, area: &AreaRef) -> Result<(), TemplateError> {
        let range = format!(
            "{}:{}",
            area.first_cell.cell_name(),
            area.last_cell().cell_name()
        );
        self.sheet_mut(&area.first_cell.sheet)?.add_merge_cells(range);
        Ok(())
    }

    fn add_image(
        &mut self,
        area: &AreaRef,
        data: &[u8],
        kind: ImageKind,
    ) -> Result<(), TemplateError> {
        let _ = (data, kind);
        Err(TemplateError::transform(
            area.first_cell.clone(),
            "image embedding is not supported by the xlsx codec",
        ))
    }

    fn row_height(&self, sheet: &str, row: u32) -> Option<f64> {
        let height = *self.sheet(sheet)?.get_row_dimension(&(row + 1))?.get_height();
        (height > 0.0).then_some(height)
    }

    fn col_width(&self, sheet: &str, col: u32) -> Option<f64> {
        let width = *self
            .sheet(sheet)?
            .get_column_dimension_by_number(&(col + 1))?
            .get_width();
        (width > 0.0).then_some(width)
    }

    fn set_row_height(&mut self, sheet: &str, row: u32, height: f64) -> Result<(), TemplateError> {
        self.sheet_mut(sheet)?
            .get_row_dimension_mut(&(row + 1))
            .set_height(height);
        Ok(())
    }

    fn auto_size_row(&mut self, sheet: &str, row: u32) -> Result<(), TemplateError> {
        debug!(sheet, row, "xlsx codec leaves row autosizing to the consumer");
        Ok(())
    }

    fn reset_tracking(&mut self) {
        for data in self.template.values_mut() {
            data.clear_targets();
        }
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), TemplateError> {
        let mut buf: Vec<u8> = Vec::new();
        writer::xlsx::write_writer(&self.book, &mut buf)
            .map_err(|e| TemplateError::sheet("<output>", e))?;
        out.write_all(&buf)
            .map_err(|e| TemplateError::sheet("<output>", e))
    }
}
