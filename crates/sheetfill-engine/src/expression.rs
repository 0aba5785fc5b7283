//! The expression-evaluator seam and `${...}` notation handling.
//!
//! The engine never interprets expressions itself; it hands them to an
//! injected [`ExpressionEvaluator`] together with the merged name
//! environment. This module owns the marker syntax that locates
//! expressions inside cell text.

use rustc_hash::FxHashMap;

use sheetfill_common::Value;

use crate::error::Result;

/// The begin/end markers wrapping expressions in cell text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notation {
    begin: String,
    end: String,
}

impl Default for Notation {
    fn default() -> Self {
        Notation {
            begin: "${".to_string(),
            end: "}".to_string(),
        }
    }
}

impl Notation {
    /// Custom markers. Both must be non-empty; empty markers fall back to
    /// the defaults.
    pub fn new(begin: &str, end: &str) -> Self {
        if begin.is_empty() || end.is_empty() {
            return Notation::default();
        }
        Notation {
            begin: begin.to_string(),
            end: end.to_string(),
        }
    }

    pub fn begin(&self) -> &str {
        &self.begin
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Whether the text contains at least one complete expression.
    pub fn contains_expression(&self, text: &str) -> bool {
        match text.find(self.begin.as_str()) {
            Some(pos) => text[pos + self.begin.len()..].contains(self.end.as_str()),
            None => false,
        }
    }

    /// If the whole trimmed text is exactly one expression, its body.
    pub fn single_expression<'t>(&self, text: &'t str) -> Option<&'t str> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix(self.begin.as_str())?
            .strip_suffix(self.end.as_str())?;
        // An embedded begin marker means this is two expressions, not one.
        if body.contains(self.begin.as_str()) || body.contains(self.end.as_str()) {
            return None;
        }
        Some(body)
    }

    /// Split text into literal and expression fragments, left to right.
    /// An unterminated begin marker is treated as literal text.
    pub fn fragments<'t>(&self, text: &'t str) -> Vec<Fragment<'t>> {
        let mut out = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find(self.begin.as_str()) {
            let after_begin = &rest[start + self.begin.len()..];
            let Some(close) = after_begin.find(self.end.as_str()) else {
                break;
            };
            if start > 0 {
                out.push(Fragment::Literal(&rest[..start]));
            }
            out.push(Fragment::Expr(&after_begin[..close]));
            rest = &after_begin[close + self.end.len()..];
        }
        if !rest.is_empty() {
            out.push(Fragment::Literal(rest));
        }
        out
    }
}

/// One piece of marker-split cell text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fragment<'t> {
    Literal(&'t str),
    Expr(&'t str),
}

/// External expression-language collaborator.
///
/// Implementations may be shared across concurrent fills, so any internal
/// compiled-expression cache must be safe for concurrent access.
pub trait ExpressionEvaluator: Send + Sync {
    /// Compile and run an expression against a named-value environment.
    fn evaluate(&self, expression: &str, env: &FxHashMap<String, Value>) -> Result<Value>;

    /// Check an expression compiles, without running it.
    fn check_syntax(&self, expression: &str) -> Result<()>;
}
