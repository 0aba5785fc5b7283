//! The area replay engine.
//!
//! An [`Area`] owns a rectangle of the template plus the commands bound
//! inside it. Replaying walks the rectangle top to bottom: static rows copy
//! verbatim, bound commands run at their offset and report how much space
//! they actually consumed, and everything after them shifts accordingly.

use tracing::debug;

use sheetfill_common::{AreaRef, CellRef, Size};

use crate::command::Command;
use crate::context::{COL_VAR, Context, ROW_VAR};
use crate::error::Result;
use crate::transform::{CellListener, DocumentTransformer};

/// A nested command's position and footprint inside its owning area,
/// relative to the area origin.
pub struct Binding {
    command: Box<dyn Command>,
    row_offset: u32,
    col_offset: u32,
    size: Size,
}

impl Binding {
    pub fn command(&self) -> &dyn Command {
        self.command.as_ref()
    }

    pub fn row_offset(&self) -> u32 {
        self.row_offset
    }

    pub fn col_offset(&self) -> u32 {
        self.col_offset
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

/// A rectangular template region that can replay itself at any target.
pub struct Area {
    start: CellRef,
    size: Size,
    bindings: Vec<Binding>,
    listeners: Vec<Box<dyn CellListener>>,
}

impl Area {
    pub fn new(area_ref: AreaRef) -> Self {
        Area {
            start: area_ref.first_cell,
            size: area_ref.size,
            bindings: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn start(&self) -> &CellRef {
        &self.start
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn sheet(&self) -> &str {
        &self.start.sheet
    }

    pub fn area_ref(&self) -> AreaRef {
        AreaRef::new(self.start.clone(), self.size)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Attach a command occupying `rect` (absolute template coordinates).
    /// The rectangle must lie inside this area.
    pub fn add_command(&mut self, command: Box<dyn Command>, rect: &AreaRef) {
        debug_assert!(
            self.area_ref().contains_area(rect),
            "command rectangle must lie inside its area"
        );
        self.bindings.push(Binding {
            command,
            row_offset: rect.first_cell.row - self.start.row,
            col_offset: rect.first_cell.col - self.start.col,
            size: rect.size,
        });
    }

    /// Restore the (row, column) binding order after out-of-order
    /// attachment.
    pub fn sort_bindings(&mut self) {
        self.bindings
            .sort_by_key(|b| (b.row_offset, b.col_offset));
    }

    /// Sort bindings here and in every nested command area.
    pub fn sort_tree(&mut self) {
        self.sort_bindings();
        for binding in &mut self.bindings {
            for area in binding.command.areas_mut() {
                area.sort_tree();
            }
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn CellListener>) {
        self.listeners.push(listener);
    }

    /// Drop per-fill command state so the parsed tree can fill again.
    pub fn reset(&mut self) {
        for binding in &mut self.bindings {
            binding.command.reset();
        }
    }

    /// Replay this area with its origin as the target.
    pub fn apply_self(
        &self,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let target = self.start.clone();
        self.apply_at(&target, ctx, transformer)
    }

    /// Replay the area at `target`, returning the size actually written.
    pub fn apply_at(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        debug!(area = %self.area_ref(), target = %target, "applying area");
        if self.bindings.is_empty() {
            self.copy_band(0, self.size.height, target.row, target, None, ctx, transformer)?;
            return Ok(self.size);
        }

        let mut total_height: u32 = 0;
        let mut max_width: u32 = self.size.width;
        let mut current_target_row = target.row;
        let mut src_row: u32 = 0;

        for binding in &self.bindings {
            // Static rows between the previous binding and this one.
            if binding.row_offset > src_row {
                let rows = binding.row_offset - src_row;
                self.copy_band(src_row, rows, current_target_row, target, None, ctx, transformer)?;
                current_target_row += rows;
                total_height += rows;
            }

            // Static columns sharing the command's rows.
            self.copy_band(
                binding.row_offset,
                binding.size.height,
                current_target_row,
                target,
                Some((binding.col_offset, binding.size.width)),
                ctx,
                transformer,
            )?;

            let command_target = CellRef::new(
                target.sheet.clone(),
                current_target_row,
                target.col + binding.col_offset,
            );
            let cmd_size = binding.command.apply(&command_target, ctx, transformer)?;

            // A full-width command may contract to zero rows; a partial-width
            // command never shrinks below its template footprint, because the
            // static cells sharing its rows were already written.
            let full_width = binding.col_offset == 0 && binding.size.width == self.size.width;
            let consumed = if full_width {
                cmd_size.height
            } else {
                cmd_size.height.max(binding.size.height)
            };

            current_target_row += consumed;
            total_height += consumed;
            max_width = max_width.max(binding.col_offset + cmd_size.width);
            src_row = binding.row_offset + binding.size.height;
        }

        // Trailing static rows.
        if src_row < self.size.height {
            let rows = self.size.height - src_row;
            self.copy_band(src_row, rows, current_target_row, target, None, ctx, transformer)?;
            total_height += rows;
        }

        Ok(Size::new(max_width, total_height))
    }

    /// Copy `rows` template rows starting at relative `src_row` to the
    /// absolute `target_row`, skipping the excluded column span if given.
    #[allow(clippy::too_many_arguments)]
    fn copy_band(
        &self,
        src_row: u32,
        rows: u32,
        target_row: u32,
        target: &CellRef,
        exclude_cols: Option<(u32, u32)>,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<()> {
        for dr in 0..rows {
            for col in 0..self.size.width {
                if let Some((from, width)) = exclude_cols {
                    if col >= from && col < from + width {
                        continue;
                    }
                }
                let src = CellRef::new(
                    self.start.sheet.clone(),
                    self.start.row + src_row + dr,
                    self.start.col + col,
                );
                let tgt = CellRef::new(target.sheet.clone(), target_row + dr, target.col + col);
                self.transform_one(&src, &tgt, ctx, transformer)?;
            }
        }
        Ok(())
    }

    /// Copy a single cell: bind the implicit row/column variables, run the
    /// listener hooks, then hand the copy to the transformer. A veto from
    /// any before-hook skips the copy and the after-hooks.
    fn transform_one(
        &self,
        src: &CellRef,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<()> {
        ctx.set_run_var(ROW_VAR, (target.row as i64 + 1).into());
        ctx.set_run_var(COL_VAR, (target.col as i64).into());

        for listener in &self.listeners {
            if !listener.before_transform(src, target, ctx, transformer)? {
                return Ok(());
            }
        }
        let update_row_height = ctx.config().update_row_heights;
        transformer.transform_cell(src, target, ctx, update_row_height)?;
        for listener in &self.listeners {
            listener.after_transform(src, target, ctx, transformer)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Area")
            .field("ref", &self.area_ref().to_string())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
