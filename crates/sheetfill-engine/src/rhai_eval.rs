//! Default [`ExpressionEvaluator`] backed by the Rhai scripting engine.
//!
//! Expressions are compiled once and the ASTs cached; the cache sits behind
//! a read/write lock so one evaluator instance can serve concurrent fills.
//! Before each evaluation the expression's root identifiers are pushed into
//! a fresh scope, unresolved names as unit, which is how a missing binding
//! evaluates to nil instead of failing.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rhai::{AST, Dynamic, Engine, Scope};
use rustc_hash::FxHashMap;

use sheetfill_common::Value;

use crate::error::{Result, TemplateError};
use crate::expression::ExpressionEvaluator;

struct CompiledExpression {
    ast: AST,
    idents: Vec<String>,
}

pub struct RhaiEvaluator {
    engine: Engine,
    cache: RwLock<FxHashMap<String, Arc<CompiledExpression>>>,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        RhaiEvaluator::new()
    }
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        RhaiEvaluator {
            engine: Engine::new(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Access the underlying engine, e.g. to register custom functions
    /// before the first fill.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn compile(&self, expression: &str) -> Result<Arc<CompiledExpression>> {
        if let Some(hit) = self.cache.read().get(expression) {
            return Ok(Arc::clone(hit));
        }
        let ast = self
            .engine
            .compile(expression)
            .map_err(|e| TemplateError::evaluation(expression, e))?;
        let compiled = Arc::new(CompiledExpression {
            ast,
            idents: root_identifiers(expression),
        });
        self.cache
            .write()
            .insert(expression.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expression: &str, env: &FxHashMap<String, Value>) -> Result<Value> {
        let compiled = self.compile(expression)?;
        let mut scope = Scope::new();
        for ident in &compiled.idents {
            match env.get(ident) {
                Some(value) => scope.push_dynamic(ident.clone(), value_to_dynamic(value)),
                None => scope.push_dynamic(ident.clone(), Dynamic::UNIT),
            };
        }
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &compiled.ast)
            .map_err(|e| TemplateError::evaluation(expression, e))?;
        Ok(dynamic_to_value(result))
    }

    fn check_syntax(&self, expression: &str) -> Result<()> {
        self.compile(expression).map(|_| ())
    }
}

fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Empty => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Int(i) => Dynamic::from_int(*i),
        Value::Number(n) => Dynamic::from_float(*n),
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Date(d) => Dynamic::from(d.to_string()),
        Value::DateTime(dt) => Dynamic::from(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Value::List(items) => {
            let arr: rhai::Array = items.iter().map(value_to_dynamic).collect();
            Dynamic::from_array(arr)
        }
        Value::Map(entries) => {
            let mut map = rhai::Map::new();
            for (k, v) in entries.iter() {
                map.insert(k.as_str().into(), value_to_dynamic(v));
            }
            Dynamic::from_map(map)
        }
    }
}

fn dynamic_to_value(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Empty;
    }
    if value.is_bool() {
        return Value::Bool(value.as_bool().unwrap_or_default());
    }
    if value.is_int() {
        return Value::Int(value.as_int().unwrap_or_default());
    }
    if value.is_float() {
        return Value::Number(value.as_float().unwrap_or_default());
    }
    if value.is_char() {
        return Value::Text(value.as_char().map(String::from).unwrap_or_default());
    }
    if value.is_array() {
        let items = value
            .into_array()
            .unwrap_or_default()
            .into_iter()
            .map(dynamic_to_value)
            .collect();
        return Value::list(items);
    }
    if value.is_map() {
        let mut entries = BTreeMap::new();
        if let Some(map) = value.try_cast::<rhai::Map>() {
            for (k, v) in map {
                entries.insert(k.to_string(), dynamic_to_value(v));
            }
        }
        return Value::map(entries);
    }
    match value.into_string() {
        Ok(s) => Value::Text(s),
        Err(type_name) => Value::Text(type_name.to_string()),
    }
}

/// Collect candidate root identifiers from expression text.
///
/// Deliberately liberal: extra names pushed as unit never change a result,
/// so only the clearly-wrong candidates are filtered (property names after
/// `.`, call targets before `(`, keywords, string-literal contents).
fn root_identifiers(expression: &str) -> Vec<String> {
    const KEYWORDS: &[&str] = &[
        "true", "false", "let", "const", "if", "else", "switch", "while", "loop", "do", "until",
        "for", "in", "continue", "break", "return", "throw", "try", "catch", "fn", "private",
        "import", "export", "as", "global", "this",
    ];
    let bytes = expression.as_bytes();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    let mut prev_significant = 0u8;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            let quote = b;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if bytes[i] == quote {
                    break;
                }
                i += 1;
            }
            i += 1;
            prev_significant = quote;
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let ident = &expression[start..i];
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let is_call = j < bytes.len() && bytes[j] == b'(';
            let is_property = prev_significant == b'.';
            if !is_call && !is_property && !KEYWORDS.contains(&ident) {
                if !out.iter().any(|known| known == ident) {
                    out.push(ident.to_string());
                }
            }
            prev_significant = bytes[i - 1];
            continue;
        }
        if !b.is_ascii_whitespace() {
            prev_significant = b;
        }
        i += 1;
    }
    out
}
