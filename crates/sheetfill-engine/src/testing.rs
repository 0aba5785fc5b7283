//! Shared fixtures for the unit tests in this crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use sheetfill_common::Value;

use crate::context::Context;
use crate::error::Result;
use crate::expression::ExpressionEvaluator;

/// Minimal evaluator resolving bare names and `a.b.c` map paths against the
/// environment. Anything unresolved is `Empty`.
pub struct PathEvaluator;

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate(&self, expression: &str, env: &FxHashMap<String, Value>) -> Result<Value> {
        let mut parts = expression.trim().split('.');
        let root = match parts.next() {
            Some(root) => root,
            None => return Ok(Value::Empty),
        };
        let mut current = match env.get(root) {
            Some(value) => value.clone(),
            None => return Ok(Value::Empty),
        };
        for part in parts {
            current = match &current {
                Value::Map(map) => map.get(part).cloned().unwrap_or(Value::Empty),
                _ => Value::Empty,
            };
        }
        Ok(current)
    }

    fn check_syntax(&self, _expression: &str) -> Result<()> {
        Ok(())
    }
}

pub fn path_ctx() -> Context {
    Context::new(Arc::new(PathEvaluator))
}

pub fn record(entries: &[(&str, Value)]) -> Value {
    let map: BTreeMap<String, Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Value::map(map)
}
