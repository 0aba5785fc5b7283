//! Static template validation.
//!
//! Walks every annotation in the template and reports granular issues
//! without executing a fill: annotation syntax, command construction,
//! sub-area containment and expression syntax. A clean report does not
//! guarantee a clean fill (data-shape errors only show up at run time),
//! but every issue reported here would have failed one.

use core::fmt;
use std::str::FromStr;

use sheetfill_common::CellRef;

use crate::builder::parse_annotation;
use crate::command::{CommandRegistry, CommandSpec};
use crate::expression::ExpressionEvaluator;
use crate::transform::{DocumentTransformer, FormulaStrategy};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IssueKind {
    /// A comment line with the annotation marker that does not parse.
    Annotation,
    /// A command that is unknown or rejects its attributes.
    Command,
    /// A declared sub-area escaping its command's rectangle.
    Geometry,
    /// An attribute whose expression the evaluator rejects.
    Expression,
}

/// One problem found in an annotated template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateIssue {
    pub kind: IssueKind,
    pub cell: CellRef,
    pub message: String,
}

impl TemplateIssue {
    fn new(kind: IssueKind, cell: &CellRef, message: impl Into<String>) -> Self {
        TemplateIssue {
            kind,
            cell: cell.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cell, self.message)
    }
}

/// Attributes holding expressions the evaluator should be able to parse.
fn expression_attrs(command: &str) -> &'static [&'static str] {
    match command {
        "each" => &["items", "select", "multisheet"],
        "if" => &["condition"],
        "grid" => &["headers", "data"],
        "image" => &["src"],
        "mergeCells" => &["cols", "rows"],
        "updateCell" => &["expression"],
        _ => &[],
    }
}

/// Validate using the built-in command set.
pub fn validate_template(
    transformer: &dyn DocumentTransformer,
    evaluator: &dyn ExpressionEvaluator,
) -> Vec<TemplateIssue> {
    validate_template_with(transformer, evaluator, &CommandRegistry::with_builtins())
}

/// Validate against a caller-supplied command registry.
pub fn validate_template_with(
    transformer: &dyn DocumentTransformer,
    evaluator: &dyn ExpressionEvaluator,
    registry: &CommandRegistry,
) -> Vec<TemplateIssue> {
    let mut issues = Vec::new();
    for (cell, comment) in transformer.commented_cells() {
        for parsed in parse_annotation(&cell, &comment) {
            match parsed {
                Ok(spec) => check_spec(&cell, &spec, evaluator, registry, &mut issues),
                Err(err) => {
                    issues.push(TemplateIssue::new(IssueKind::Annotation, &cell, err.to_string()));
                }
            }
        }
    }
    issues
}

fn check_spec(
    cell: &CellRef,
    spec: &CommandSpec,
    evaluator: &dyn ExpressionEvaluator,
    registry: &CommandRegistry,
    issues: &mut Vec<TemplateIssue>,
) {
    if spec.name == "params" {
        if let Some(raw) = spec.attr("formulaStrategy") {
            if FormulaStrategy::from_str(raw).is_err() {
                issues.push(TemplateIssue::new(
                    IssueKind::Annotation,
                    cell,
                    format!("unknown formula strategy '{raw}'"),
                ));
            }
        }
        return;
    }
    // Root declarations carry no attributes beyond the rectangle, which
    // the annotation parser already checked.
    if spec.name == "area" {
        return;
    }

    if !registry.contains(&spec.name) {
        issues.push(TemplateIssue::new(
            IssueKind::Command,
            cell,
            format!("unknown command '{}'", spec.name),
        ));
        return;
    }
    if let Err(err) = registry.create(spec) {
        issues.push(TemplateIssue::new(IssueKind::Command, cell, err.to_string()));
    }

    for (i, sub) in spec.area_refs.iter().enumerate() {
        // An If false branch may sit away from the command rectangle.
        if spec.name == "if" && i > 0 {
            continue;
        }
        if !spec.rect.contains_area(sub) {
            issues.push(TemplateIssue::new(
                IssueKind::Geometry,
                cell,
                format!("sub-area {sub} escapes the command rectangle {}", spec.rect),
            ));
        }
    }

    for name in expression_attrs(&spec.name) {
        if let Some(value) = spec.attr(name) {
            if let Err(err) = evaluator.check_syntax(value) {
                issues.push(TemplateIssue::new(
                    IssueKind::Expression,
                    cell,
                    format!("attribute '{name}': {err}"),
                ));
            }
        }
    }
}
