//! Template execution engine.
//!
//! A template is a spreadsheet whose cells carry inline `${...}` expressions
//! and cell comments annotating commands (`sf:each`, `sf:if`, ...). Filling
//! replays annotated rectangles ("areas") against a data context: areas grow
//! or shrink with the data, every written cell records where it came from,
//! and a final pass rewrites formula references to follow the cells they
//! pointed at.

pub mod area;
pub mod builder;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod filler;
pub mod formula;
pub mod transform;
pub mod validate;

#[cfg(feature = "rhai")]
pub mod rhai_eval;

#[cfg(test)]
pub(crate) mod testing;

pub use area::{Area, Binding};
pub use builder::{ANNOTATION_MARKER, AreaBuilder, parse_annotation};
pub use command::{
    AutoRowHeightCommand, Command, CommandFactory, CommandRegistry, CommandSpec, Direction,
    EachCommand, GridCommand, IfCommand, ImageCommand, MergeCellsCommand, SortOrder,
    UpdateCellCommand,
};
pub use config::FillConfig;
pub use context::{Context, VarGuard};
pub use error::TemplateError;
pub use expression::{ExpressionEvaluator, Notation};
pub use filler::{FillSummary, fill};
pub use formula::FormulaProcessor;
pub use transform::{
    CellData, CellKind, CellListener, DocumentTransformer, FormulaParams, FormulaStrategy,
    ImageKind, InMemoryTransformer,
};
pub use validate::{IssueKind, TemplateIssue, validate_template, validate_template_with};

#[cfg(feature = "rhai")]
pub use rhai_eval::RhaiEvaluator;

pub use sheetfill_common::{AreaRef, CellRef, Size, Value};
