//! The auto-row-height command.

use sheetfill_common::{CellRef, Size};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::Context;
use crate::error::Result;
use crate::transform::DocumentTransformer;

/// Replays its rectangle, then asks the backend to size every written row
/// to its content.
pub struct AutoRowHeightCommand {
    area: Area,
}

impl AutoRowHeightCommand {
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        Ok(AutoRowHeightCommand {
            area: Area::new(spec.rect.clone()),
        })
    }
}

impl Command for AutoRowHeightCommand {
    fn name(&self) -> &str {
        "autoRowHeight"
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
        let size = self.area.apply_at(target, ctx, transformer)?;
        for row in target.row..target.row + size.height {
            transformer.auto_size_row(&target.sheet, row)?;
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::spec_for_test;
    use crate::testing::path_ctx;
    use crate::transform::InMemoryTransformer;
    use sheetfill_common::Value;

    #[test]
    fn marks_every_written_row() {
        let mut doc = InMemoryTransformer::new();
        doc.load_value(CellRef::new("S", 0, 0), Value::from("a"));
        doc.load_value(CellRef::new("S", 1, 0), Value::from("b"));
        let cmd =
            AutoRowHeightCommand::from_spec(&spec_for_test("autoRowHeight", "S!A1:A2", &[]))
                .unwrap();
        let mut ctx = path_ctx();
        let size = cmd
            .apply(&CellRef::new("S", 3, 0), &mut ctx, &mut doc)
            .unwrap();
        assert_eq!(size, Size::new(1, 2));
        let marked: Vec<u32> = doc.sheet("S").unwrap().auto_sized.iter().copied().collect();
        assert_eq!(marked, vec![3, 4]);
    }
}
