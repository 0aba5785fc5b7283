//! The update-cell command.

use sheetfill_common::{CellRef, Size};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::Context;
use crate::error::Result;
use crate::transform::DocumentTransformer;

/// Writes the evaluated `expression` at the target, replacing whatever the
/// template would have put there.
pub struct UpdateCellCommand {
    expression: String,
    size: Size,
}

impl UpdateCellCommand {
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        Ok(UpdateCellCommand {
            expression: spec.required("expression")?.to_string(),
            size: spec.rect.size,
        })
    }
}

impl Command for UpdateCellCommand {
    fn name(&self) -> &str {
        "updateCell"
    }

    fn areas(&self) -> Vec<&Area> {
        Vec::new()
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        Vec::new()
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let value = ctx.evaluate(&self.expression)?;
        transformer.set_cell_value(target, value)?;
        Ok(self.size)
    }
}
