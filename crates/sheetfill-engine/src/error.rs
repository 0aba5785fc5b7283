//! Error surface of the fill engine.
//!
//! Every failure is fatal for the current fill and carries enough context
//! (cell reference, command name, attribute, expression text) to locate the
//! offending template cell. Nothing is retried.

use thiserror::Error;

use sheetfill_common::{A1ParseError, CellRef};

/// Errors raised while building or executing a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template-structural failures, detected while assembling the tree.
    #[error("no annotated cells found in the template")]
    NoAnnotatedCells,

    #[error("no root area command found in the template")]
    NoRootArea,

    #[error("command '{command}' at {cell} is missing required attribute '{attribute}'")]
    MissingAttribute {
        command: String,
        cell: CellRef,
        attribute: String,
    },

    #[error("command '{command}' at {cell}: invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        command: String,
        cell: CellRef,
        attribute: String,
        value: String,
    },

    #[error("unknown command '{command}' at {cell}")]
    UnknownCommand { command: String, cell: CellRef },

    #[error("malformed annotation at {cell}: {text}")]
    MalformedAnnotation { cell: CellRef, text: String },

    #[error("command '{command}' at {cell}: cannot resolve rectangle ending at '{last_cell}'")]
    BadRectangle {
        command: String,
        cell: CellRef,
        last_cell: String,
    },

    /// Expression failures, surfaced with the expression text.
    #[error("failed to evaluate '{expression}': {message}")]
    Evaluation { expression: String, message: String },

    #[error("expression '{expression}' produced {actual}, expected {expected}")]
    WrongResultType {
        expression: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Failures reported by the document transformer.
    #[error("transform failed at {cell}: {message}")]
    Transform { cell: CellRef, message: String },

    #[error("sheet operation on '{name}' failed: {message}")]
    Sheet { name: String, message: String },

    #[error("invalid cell reference: {0}")]
    BadReference(#[from] A1ParseError),
}

impl TemplateError {
    /// Wrap an evaluator failure with the expression that caused it.
    pub fn evaluation(expression: impl Into<String>, message: impl std::fmt::Display) -> Self {
        TemplateError::Evaluation {
            expression: expression.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a transformer failure with the cell being written.
    pub fn transform(cell: CellRef, message: impl std::fmt::Display) -> Self {
        TemplateError::Transform {
            cell,
            message: message.to_string(),
        }
    }

    /// Wrap a sheet-level transformer failure.
    pub fn sheet(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        TemplateError::Sheet {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
