//! Reference transformer keeping the whole document in memory.
//!
//! Template content goes in through the `load_*` methods, which populate
//! both the live sheet buffers and the read-only [`CellData`] snapshot the
//! engine works from. Fill output lands in the live buffers only, so the
//! same template can be filled repeatedly after `reset_tracking`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use rustc_hash::FxHashMap;

use sheetfill_common::{AreaRef, CellRef, Value};

use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::transform::{
    CellData, CellWrite, DocumentTransformer, FormulaParams, ImageKind, StyleId,
};

/// One live output cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellContent {
    pub value: Value,
    pub formula: Option<String>,
    pub style: Option<StyleId>,
}

/// An image anchored over a cell rectangle.
#[derive(Clone, Debug)]
pub struct ImagePlacement {
    pub area: AreaRef,
    pub kind: ImageKind,
    pub data: Vec<u8>,
}

/// Live state of one worksheet.
#[derive(Clone, Debug, Default)]
pub struct SheetBuf {
    pub name: String,
    pub cells: BTreeMap<(u32, u32), CellContent>,
    pub comments: BTreeMap<(u32, u32), String>,
    pub row_heights: BTreeMap<u32, f64>,
    pub col_widths: BTreeMap<u32, f64>,
    pub merged: Vec<AreaRef>,
    pub images: Vec<ImagePlacement>,
    pub auto_sized: BTreeSet<u32>,
    pub hidden: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryTransformer {
    sheets: Vec<SheetBuf>,
    template: FxHashMap<CellRef, CellData>,
}

impl InMemoryTransformer {
    pub fn new() -> Self {
        InMemoryTransformer::default()
    }

    /// Append an empty sheet if the name is not present yet.
    pub fn add_sheet(&mut self, name: &str) {
        if self.sheet(name).is_none() {
            self.sheets.push(SheetBuf {
                name: name.to_string(),
                ..SheetBuf::default()
            });
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetBuf> {
        self.sheets.iter().find(|s| s.name == name)
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut SheetBuf> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    fn sheet_mut_or_new(&mut self, name: &str) -> &mut SheetBuf {
        if self.sheet(name).is_none() {
            self.add_sheet(name);
        }
        self.sheet_mut(name).expect("just ensured")
    }

    pub fn sheet_buffers(&self) -> &[SheetBuf] {
        &self.sheets
    }

    /// Define a template cell: live content plus engine snapshot.
    pub fn load_cell(&mut self, cell: CellRef, data: CellData) {
        let content = CellContent {
            value: data.value.clone(),
            formula: data.formula.clone(),
            style: data.style,
        };
        self.sheet_mut_or_new(&cell.sheet)
            .cells
            .insert((cell.row, cell.col), content);
        self.template.insert(cell, data);
    }

    pub fn load_value(&mut self, cell: CellRef, value: impl Into<Value>) {
        self.load_cell(cell, CellData::from_value(value.into()));
    }

    pub fn load_formula(&mut self, cell: CellRef, formula: impl Into<String>) {
        let formula = formula.into();
        let text = formula.strip_prefix('=').unwrap_or(&formula);
        self.load_cell(cell, CellData::from_formula(text));
    }

    /// Attach a template comment (annotation text lives here).
    pub fn load_comment(&mut self, cell: &CellRef, text: impl Into<String>) {
        self.sheet_mut_or_new(&cell.sheet)
            .comments
            .insert((cell.row, cell.col), text.into());
    }

    pub fn load_row_height(&mut self, sheet: &str, row: u32, height: f64) {
        self.sheet_mut_or_new(sheet).row_heights.insert(row, height);
    }

    pub fn load_col_width(&mut self, sheet: &str, col: u32, width: f64) {
        self.sheet_mut_or_new(sheet).col_widths.insert(col, width);
    }

    /// Live content of an output cell.
    pub fn cell_content(&self, cell: &CellRef) -> Option<&CellContent> {
        self.sheet(&cell.sheet)?.cells.get(&(cell.row, cell.col))
    }

    /// Live value of an output cell, `Empty` when absent.
    pub fn value_at(&self, cell: &CellRef) -> Value {
        self.cell_content(cell)
            .map(|c| c.value.clone())
            .unwrap_or(Value::Empty)
    }

    /// Live formula text of an output cell.
    pub fn formula_at(&self, cell: &CellRef) -> Option<String> {
        self.cell_content(cell).and_then(|c| c.formula.clone())
    }

    fn write_content(&mut self, target: &CellRef, write: CellWrite, style: Option<StyleId>) {
        let slot = self
            .sheet_mut_or_new(&target.sheet)
            .cells
            .entry((target.row, target.col))
            .or_default();
        match write {
            CellWrite::Value(value) => {
                slot.value = value;
                slot.formula = None;
            }
            CellWrite::Formula(text) => {
                slot.value = Value::Empty;
                slot.formula = Some(text);
            }
        }
        if style.is_some() {
            slot.style = style;
        }
    }
}

impl DocumentTransformer for InMemoryTransformer {
    fn transform_cell(
        &mut self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        update_row_height: bool,
    ) -> Result<()> {
        let Some(data) = self.template.get(src) else {
            return Ok(());
        };
        let style = data.style;
        let write = data.evaluate(ctx)?;
        self.template
            .get_mut(src)
            .expect("snapshot entry checked above")
            .record_target(target.clone());
        self.write_content(target, write, style);
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
        self.sheet(&cell.sheet)?
            .comments
            .get(&(cell.row, cell.col))
            .cloned()
    }

    fn commented_cells(&self) -> Vec<(CellRef, String)> {
        let mut out = Vec::new();
        for sheet in &self.sheets {
            for (&(row, col), text) in &sheet.comments {
                out.push((CellRef::new(sheet.name.clone(), row, col), text.clone()));
            }
        }
        out
    }

    fn formula_cells(&self) -> Vec<CellRef> {
        let mut out: Vec<CellRef> = self
            .template
            .iter()
            .filter(|(_, data)| data.is_formula())
            .map(|(cell, _)| cell.clone())
            .collect();
        out.sort();
        out
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn set_cell_value(&mut self, cell: &CellRef, value: Value) -> Result<()> {
        self.write_content(cell, CellWrite::Value(value), None);
        Ok(())
    }

    fn set_formula(&mut self, cell: &CellRef, formula: &str) -> Result<()> {
        self.write_content(cell, CellWrite::Formula(formula.to_string()), None);
        Ok(())
    }

    fn clear_cell(&mut self, cell: &CellRef) -> Result<()> {
        if let Some(sheet) = self.sheet_mut(&cell.sheet) {
            sheet.cells.remove(&(cell.row, cell.col));
        }
        Ok(())
    }

    fn set_formula_params(&mut self, cell: &CellRef, params: FormulaParams) -> Result<()> {
        self.template
            .entry(cell.clone())
            .or_insert_with(|| CellData::from_value(Value::Empty))
            .params = Some(params);
        Ok(())
    }

    fn clone_sheet(&mut self, src: &str, new_name: &str) -> Result<()> {
        if self.sheet(new_name).is_some() {
            return Err(TemplateError::sheet(new_name, "sheet already exists"));
        }
        let Some(buf) = self.sheet(src) else {
            return Err(TemplateError::sheet(src, "no such sheet"));
        };
        let mut copy = buf.clone();
        copy.name = new_name.to_string();
        self.sheets.push(copy);
        Ok(())
    }

    fn delete_sheet(&mut self, name: &str) -> Result<()> {
        let before = self.sheets.len();
        self.sheets.retain(|s| s.name != name);
        if self.sheets.len() == before {
            return Err(TemplateError::sheet(name, "no such sheet"));
        }
        Ok(())
    }

    fn hide_sheet(&mut self, name: &str) -> Result<()> {
        match self.sheet_mut(name) {
            Some(sheet) => {
                sheet.hidden = true;
                Ok(())
            }
            None => Err(TemplateError::sheet(name, "no such sheet")),
        }
    }

    fn merge_cells(&mut self, area: &AreaRef) -> Result<()> {
        self.sheet_mut_or_new(&area.first_cell.sheet)
            .merged
            .push(area.clone());
        Ok(())
    }

    fn add_image(&mut self, area: &AreaRef, data: &[u8], kind: ImageKind) -> Result<()> {
        self.sheet_mut_or_new(&area.first_cell.sheet)
            .images
            .push(ImagePlacement {
                area: area.clone(),
                kind,
                data: data.to_vec(),
            });
        Ok(())
    }

    fn row_height(&self, sheet: &str, row: u32) -> Option<f64> {
        self.sheet(sheet)?.row_heights.get(&row).copied()
    }

    fn col_width(&self, sheet: &str, col: u32) -> Option<f64> {
        self.sheet(sheet)?.col_widths.get(&col).copied()
    }

    fn set_row_height(&mut self, sheet: &str, row: u32, height: f64) -> Result<()> {
        self.sheet_mut_or_new(sheet).row_heights.insert(row, height);
        Ok(())
    }

    fn auto_size_row(&mut self, sheet: &str, row: u32) -> Result<()> {
        // No text metrics in memory; remember the request so callers and
        // tests can observe it.
        self.sheet_mut_or_new(sheet).auto_sized.insert(row);
        Ok(())
    }

    fn reset_tracking(&mut self) {
        for data in self.template.values_mut() {
            data.clear_targets();
        }
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        let dump = self.render_dump();
        out.write_all(dump.as_bytes())
            .map_err(|e| TemplateError::sheet("<output>", e))
    }
}

impl InMemoryTransformer {
    /// Deterministic textual dump of the live document.
    fn render_dump(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        for sheet in &self.sheets {
            let _ = writeln!(
                out,
                "# sheet {}{}",
                sheet.name,
                if sheet.hidden { " (hidden)" } else { "" }
            );
            for (&(row, col), content) in &sheet.cells {
                let name = CellRef::new(sheet.name.clone(), row, col).cell_name();
                match &content.formula {
                    Some(f) => {
                        let _ = writeln!(out, "{name} := {f}");
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "{name} = [{}] {}",
                            content.value.type_name(),
                            content.value
                        );
                    }
                }
            }
            for area in &sheet.merged {
                let _ = writeln!(out, "merge {area}");
            }
            for image in &sheet.images {
                let _ = writeln!(
                    out,
                    "image {:?} at {} ({} bytes)",
                    image.kind,
                    image.area,
                    image.data.len()
                );
            }
        }
        out
    }
}
