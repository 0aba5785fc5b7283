//! The conditional command.

use sheetfill_common::{CellRef, Size};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::Context;
use crate::error::Result;
use crate::transform::DocumentTransformer;

/// Replays its true branch when `condition` holds, otherwise the optional
/// false branch. An `Empty` condition result counts as false; any other
/// non-boolean result is an error.
pub struct IfCommand {
    condition: String,
    if_area: Area,
    else_area: Option<Area>,
}

impl IfCommand {
    pub fn new(condition: impl Into<String>, if_area: Area) -> Self {
        IfCommand {
            condition: condition.into(),
            if_area,
            else_area: None,
        }
    }

    pub fn with_else(mut self, area: Area) -> Self {
        self.else_area = Some(area);
        self
    }

    /// The true branch defaults to the command rectangle; an explicit
    /// `areas=["R1","R2"]` attribute overrides it and may add a detached
    /// false branch.
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        let condition = spec.required("condition")?.to_string();
        if spec.area_refs.len() > 2 {
            return Err(spec.invalid("areas", &format!("{} rectangles", spec.area_refs.len())));
        }
        let if_area = match spec.area_refs.first() {
            Some(rect) => Area::new(rect.clone()),
            None => Area::new(spec.rect.clone()),
        };
        let mut cmd = IfCommand::new(condition, if_area);
        if let Some(rect) = spec.area_refs.get(1) {
            cmd.else_area = Some(Area::new(rect.clone()));
        }
        Ok(cmd)
    }
}

impl Command for IfCommand {
    fn name(&self) -> &str {
        "if"
    }

    fn areas(&self) -> Vec<&Area> {
        let mut areas = vec![&self.if_area];
        if let Some(else_area) = &self.else_area {
            areas.push(else_area);
        }
        areas
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        let mut areas = vec![&mut self.if_area];
        if let Some(else_area) = &mut self.else_area {
            areas.push(else_area);
        }
        areas
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        if ctx.evaluate_condition(&self.condition)? {
            self.if_area.apply_at(target, ctx, transformer)
        } else {
            match &self.else_area {
                Some(else_area) => else_area.apply_at(target, ctx, transformer),
                None => Ok(Size::ZERO),
            }
        }
    }
}
