//! The merge-cells command.

use sheetfill_common::{AreaRef, CellRef, Size, Value};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::transform::DocumentTransformer;

/// Replays its rectangle, then merges it at the target. Optional `cols` /
/// `rows` expressions override the merged extent. Merging a single cell is
/// rejected.
pub struct MergeCellsCommand {
    cols: Option<String>,
    rows: Option<String>,
    area: Area,
}

impl MergeCellsCommand {
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        let cols = spec.attr("cols").map(str::to_string);
        let rows = spec.attr("rows").map(str::to_string);
        if spec.rect.cell_count() <= 1 && cols.is_none() && rows.is_none() {
            return Err(spec.invalid("lastCell", "merge of a single cell"));
        }
        Ok(MergeCellsCommand {
            cols,
            rows,
            area: Area::new(spec.rect.clone()),
        })
    }

    fn extent(&self, attr: &Option<String>, fallback: u32, ctx: &mut Context) -> Result<u32> {
        let Some(expression) = attr else {
            return Ok(fallback);
        };
        match ctx.evaluate(expression)? {
            Value::Int(n) if n >= 1 => Ok(n as u32),
            other => Err(TemplateError::WrongResultType {
                expression: expression.clone(),
                expected: "positive integer",
                actual: other.type_name(),
            }),
        }
    }
}

impl Command for MergeCellsCommand {
    fn name(&self) -> &str {
        "mergeCells"
    }

    fn areas(&self) -> Vec<&Area> {
        vec![&self.area]
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        vec![&mut self.area]
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let applied = self.area.apply_at(target, ctx, transformer)?;
        let merged = Size::new(
            self.extent(&self.cols, applied.width, ctx)?,
            self.extent(&self.rows, applied.height, ctx)?,
        );
        if merged.cell_count() <= 1 {
            return Err(TemplateError::transform(
                target.clone(),
                "merge region is a single cell",
            ));
        }
        transformer.merge_cells(&AreaRef::new(target.clone(), merged))?;
        Ok(applied)
    }
}
