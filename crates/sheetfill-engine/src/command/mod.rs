//! The command vocabulary of the template language.
//!
//! Commands are polymorphic trait objects created by name through a
//! [`CommandRegistry`]. The built-in set covers iteration, conditionals,
//! grid fills and the thin single-cell operations; user commands register a
//! factory under their own name.

mod autofit;
mod conditional;
mod each;
mod grid;
mod image;
mod merge;
mod update;

pub use autofit::AutoRowHeightCommand;
pub use conditional::IfCommand;
pub use each::{Direction, EachCommand, SortOrder};
pub use grid::GridCommand;
pub use image::ImageCommand;
pub use merge::MergeCellsCommand;
pub use update::UpdateCellCommand;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use sheetfill_common::{AreaRef, CellRef, Size};

use crate::area::Area;
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::transform::DocumentTransformer;

/// One executable template command.
pub trait Command {
    /// Registry name the command was created under.
    fn name(&self) -> &str;

    /// Inner areas this command replays, in branch order.
    fn areas(&self) -> Vec<&Area>;

    fn areas_mut(&mut self) -> Vec<&mut Area>;

    /// Execute at `target`, returning the size actually written.
    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size>;

    /// Drop per-fill state so the tree can fill again.
    fn reset(&mut self) {
        for area in self.areas_mut() {
            area.reset();
        }
    }
}

impl std::fmt::Debug for dyn Command + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name())
            .finish()
    }
}

/// One parsed annotation line: the command name, its raw attributes, and
/// the rectangles resolved from `lastCell` / `areas`.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    /// Command name without the annotation marker.
    pub name: String,
    /// The annotated cell.
    pub cell: CellRef,
    /// Rectangle from the annotated cell to the resolved `lastCell`.
    pub rect: AreaRef,
    pub attrs: FxHashMap<String, String>,
    /// Rectangles from an explicit `areas=["R1","R2"]` attribute.
    pub area_refs: Vec<AreaRef>,
}

impl CommandSpec {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| self.missing(name))
    }

    /// Parse an optional boolean attribute; absence means `false`.
    pub fn bool_attr(&self, name: &str) -> Result<bool> {
        match self.attr(name) {
            None => Ok(false),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(name, raw)),
            },
        }
    }

    pub fn missing(&self, attribute: &str) -> TemplateError {
        TemplateError::MissingAttribute {
            command: self.name.clone(),
            cell: self.cell.clone(),
            attribute: attribute.to_string(),
        }
    }

    pub fn invalid(&self, attribute: &str, value: &str) -> TemplateError {
        TemplateError::InvalidAttribute {
            command: self.name.clone(),
            cell: self.cell.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

/// Builds a command from its parsed annotation.
pub type CommandFactory = Arc<dyn Fn(&CommandSpec) -> Result<Box<dyn Command>> + Send + Sync>;

/// Name → factory table consulted by the tree builder.
pub struct CommandRegistry {
    factories: FxHashMap<String, CommandFactory>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        CommandRegistry {
            factories: FxHashMap::default(),
        }
    }

    /// Registry seeded with every built-in command.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("each", |spec| {
            Ok(Box::new(EachCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("if", |spec| {
            Ok(Box::new(IfCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("grid", |spec| {
            Ok(Box::new(GridCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("image", |spec| {
            Ok(Box::new(ImageCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("mergeCells", |spec| {
            Ok(Box::new(MergeCellsCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("updateCell", |spec| {
            Ok(Box::new(UpdateCellCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry.register("autoRowHeight", |spec| {
            Ok(Box::new(AutoRowHeightCommand::from_spec(spec)?) as Box<dyn Command>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&CommandSpec) -> Result<Box<dyn Command>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, spec: &CommandSpec) -> Result<Box<dyn Command>> {
        match self.factories.get(&spec.name) {
            Some(factory) => factory(spec),
            None => Err(TemplateError::UnknownCommand {
                command: spec.name.clone(),
                cell: spec.cell.clone(),
            }),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("commands", &names)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn spec_for_test(name: &str, rect: &str, attrs: &[(&str, &str)]) -> CommandSpec {
    let rect: AreaRef = rect.parse().unwrap();
    CommandSpec {
        name: name.to_string(),
        cell: rect.first_cell.clone(),
        rect: rect.clone(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        area_refs: Vec::new(),
    }
}
