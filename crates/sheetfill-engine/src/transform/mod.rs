//! The document-transformer seam between the engine and codec backends.
//!
//! A transformer owns the live document being filled plus a read-only
//! snapshot of every template cell ([`CellData`]). During a fill the engine
//! drives it cell by cell; each copy records its target position into the
//! snapshot, building the history the formula pass resolves afterwards.

mod memory;

pub use memory::{CellContent, ImagePlacement, InMemoryTransformer, SheetBuf};

use std::io::Write;
use std::str::FromStr;

use smallvec::SmallVec;

use sheetfill_common::{AreaRef, CellRef, Value};

use crate::context::Context;
use crate::error::Result;

pub type StyleId = u32;

/// Content classification of a template cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CellKind {
    Blank,
    Text,
    Number,
    Bool,
    Date,
    Formula,
    Error,
}

impl CellKind {
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Empty => CellKind::Blank,
            Value::Bool(_) => CellKind::Bool,
            Value::Int(_) | Value::Number(_) => CellKind::Number,
            Value::Date(_) | Value::DateTime(_) => CellKind::Date,
            _ => CellKind::Text,
        }
    }
}

/// Which relocated targets a rewritten formula reference may point at.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FormulaStrategy {
    /// Any recorded target qualifies.
    #[default]
    Default,
    /// Only targets in the same column as the formula's own target.
    ByColumn,
    /// Only targets in the same row as the formula's own target.
    ByRow,
}

impl FromStr for FormulaStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(FormulaStrategy::Default),
            "BY_COLUMN" => Ok(FormulaStrategy::ByColumn),
            "BY_ROW" => Ok(FormulaStrategy::ByRow),
            other => Err(other.to_string()),
        }
    }
}

/// Per-cell overrides configured by a `params` annotation line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormulaParams {
    /// Literal substituted when a referenced cell has no surviving targets.
    pub default_value: Option<String>,
    pub strategy: FormulaStrategy,
}

/// Image formats a transformer may be asked to embed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ImageKind {
    #[default]
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PNG" => Ok(ImageKind::Png),
            "JPEG" | "JPG" => Ok(ImageKind::Jpeg),
            "GIF" => Ok(ImageKind::Gif),
            "BMP" => Ok(ImageKind::Bmp),
            other => Err(other.to_string()),
        }
    }
}

/// Snapshot of one template cell plus its fill-time target history.
#[derive(Clone, Debug)]
pub struct CellData {
    pub kind: CellKind,
    pub value: Value,
    pub formula: Option<String>,
    pub style: Option<StyleId>,
    pub params: Option<FormulaParams>,
    targets: SmallVec<[CellRef; 1]>,
}

impl CellData {
    pub fn from_value(value: Value) -> Self {
        CellData {
            kind: CellKind::of_value(&value),
            value,
            formula: None,
            style: None,
            params: None,
            targets: SmallVec::new(),
        }
    }

    pub fn from_formula(formula: impl Into<String>) -> Self {
        CellData {
            kind: CellKind::Formula,
            value: Value::Empty,
            formula: Some(formula.into()),
            style: None,
            params: None,
            targets: SmallVec::new(),
        }
    }

    pub fn with_style(mut self, style: StyleId) -> Self {
        self.style = Some(style);
        self
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Positions this cell was copied to during the current fill, in copy
    /// order.
    pub fn targets(&self) -> &[CellRef] {
        &self.targets
    }

    pub fn record_target(&mut self, target: CellRef) {
        self.targets.push(target);
    }

    pub fn clear_targets(&mut self) {
        self.targets.clear();
    }

    /// Produce the content to write at a target position.
    ///
    /// Formula text passes through untouched (the formula pass rewrites it
    /// later); text containing expression markers is evaluated, a whole
    /// single expression keeping the evaluator's type; everything else
    /// copies by value.
    pub fn evaluate(&self, ctx: &mut Context) -> Result<CellWrite> {
        if let Some(formula) = &self.formula {
            return Ok(CellWrite::Formula(formula.clone()));
        }
        if let Value::Text(text) = &self.value {
            if ctx.notation().contains_expression(text) {
                let text = text.clone();
                return Ok(CellWrite::Value(ctx.evaluate_cell_text(&text)?));
            }
        }
        Ok(CellWrite::Value(self.value.clone()))
    }
}

/// What a cell copy writes at the target.
#[derive(Clone, Debug, PartialEq)]
pub enum CellWrite {
    Value(Value),
    Formula(String),
}

/// External document codec collaborator.
///
/// Object-safe so one `&mut dyn DocumentTransformer` can be threaded down
/// the whole tree walk.
pub trait DocumentTransformer {
    /// Copy one template cell's content and style to `target`, evaluating
    /// inline expressions through `ctx` and recording the source→target
    /// mapping. `update_row_height` asks for the target row to take the
    /// source row's height.
    fn transform_cell(
        &mut self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        update_row_height: bool,
    ) -> Result<()>;

    /// Template snapshot of a cell, if the template has one there.
    fn cell_data(&self, cell: &CellRef) -> Option<&CellData>;

    /// Template comment text at a cell.
    fn cell_comment(&self, cell: &CellRef) -> Option<String>;

    /// Every template cell carrying a comment, with its text.
    fn commented_cells(&self) -> Vec<(CellRef, String)>;

    /// Every template cell holding a formula.
    fn formula_cells(&self) -> Vec<CellRef>;

    fn sheet_names(&self) -> Vec<String>;

    fn set_cell_value(&mut self, cell: &CellRef, value: Value) -> Result<()>;

    fn set_formula(&mut self, cell: &CellRef, formula: &str) -> Result<()>;

    fn clear_cell(&mut self, cell: &CellRef) -> Result<()>;

    /// Attach `params` overrides to a template cell.
    fn set_formula_params(&mut self, cell: &CellRef, params: FormulaParams) -> Result<()>;

    fn clone_sheet(&mut self, src: &str, new_name: &str) -> Result<()>;

    fn delete_sheet(&mut self, name: &str) -> Result<()>;

    fn hide_sheet(&mut self, name: &str) -> Result<()>;

    fn merge_cells(&mut self, area: &AreaRef) -> Result<()>;

    fn add_image(&mut self, area: &AreaRef, data: &[u8], kind: ImageKind) -> Result<()>;

    fn row_height(&self, sheet: &str, row: u32) -> Option<f64>;

    fn col_width(&self, sheet: &str, col: u32) -> Option<f64>;

    fn set_row_height(&mut self, sheet: &str, row: u32, height: f64) -> Result<()>;

    /// Size a written row to its content, where the backend can.
    fn auto_size_row(&mut self, sheet: &str, row: u32) -> Result<()>;

    /// Wipe all recorded target histories. Must run between fills of the
    /// same template.
    fn reset_tracking(&mut self);

    /// Serialise the whole document to a byte sink.
    fn write_to(&mut self, out: &mut dyn Write) -> Result<()>;
}

/// Per-cell observer invoked around every cell the area engine touches.
pub trait CellListener {
    /// Runs before the default copy; returning `false` vetoes it.
    fn before_transform(
        &self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<bool> {
        let _ = (src, target, ctx, transformer);
        Ok(true)
    }

    /// Runs after a cell was copied.
    fn after_transform(
        &self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<()> {
        let _ = (src, target, ctx, transformer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parsing() {
        assert_eq!(
            "by_column".parse::<FormulaStrategy>().unwrap(),
            FormulaStrategy::ByColumn
        );
        assert_eq!(
            "BY_ROW".parse::<FormulaStrategy>().unwrap(),
            FormulaStrategy::ByRow
        );
        assert!("sideways".parse::<FormulaStrategy>().is_err());
    }

    #[test]
    fn image_kind_parsing() {
        assert_eq!("png".parse::<ImageKind>().unwrap(), ImageKind::Png);
        assert_eq!("JPG".parse::<ImageKind>().unwrap(), ImageKind::Jpeg);
        assert!("tiff".parse::<ImageKind>().is_err());
    }

    #[test]
    fn cell_kind_from_value() {
        assert_eq!(CellKind::of_value(&Value::Empty), CellKind::Blank);
        assert_eq!(CellKind::of_value(&Value::Int(1)), CellKind::Number);
        assert_eq!(CellKind::of_value(&Value::from("x")), CellKind::Text);
    }

    #[test]
    fn target_history() {
        let mut data = CellData::from_value(Value::Int(5));
        assert!(data.targets().is_empty());
        data.record_target(CellRef::new("S", 1, 0));
        data.record_target(CellRef::new("S", 2, 0));
        assert_eq!(data.targets().len(), 2);
        data.clear_targets();
        assert!(data.targets().is_empty());
    }
}
