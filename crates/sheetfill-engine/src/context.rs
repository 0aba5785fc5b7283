//! Fill-time data context and loop-variable scoping.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use sheetfill_common::Value;

use crate::config::FillConfig;
use crate::error::{Result, TemplateError};
use crate::expression::{ExpressionEvaluator, Fragment, Notation};

/// Implicit run variable holding the 1-based row currently being written.
pub const ROW_VAR: &str = "rowNum";
/// Implicit run variable holding the 0-based column currently being written.
pub const COL_VAR: &str = "colNum";

/// Data environment for one fill invocation.
///
/// Base data is caller-supplied and persists across the fill; run variables
/// are loop-scoped bindings that shadow base data on name collision. The
/// merged view handed to the evaluator is cached and rebuilt lazily after
/// any mutation.
pub struct Context {
    data: FxHashMap<String, Value>,
    run_vars: FxHashMap<String, Value>,
    merged: Option<FxHashMap<String, Value>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    notation: Notation,
    config: FillConfig,
}

impl Context {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Context {
            data: FxHashMap::default(),
            run_vars: FxHashMap::default(),
            merged: None,
            evaluator,
            notation: Notation::default(),
            config: FillConfig::default(),
        }
    }

    /// Override the `${`..`}` markers recognised in cell text.
    pub fn with_notation(mut self, notation: Notation) -> Self {
        self.notation = notation;
        self
    }

    /// Override the fill settings.
    pub fn with_config(mut self, config: FillConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notation(&self) -> &Notation {
        &self.notation
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FillConfig {
        &mut self.config
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        Arc::clone(&self.evaluator)
    }

    /// Insert or replace a base data binding.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
        self.merged = None;
    }

    /// Remove a base data binding, returning the previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let prev = self.data.remove(name);
        if prev.is_some() {
            self.merged = None;
        }
        prev
    }

    /// Look a name up the way expressions see it: run variables first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.run_vars.get(name).or_else(|| self.data.get(name))
    }

    pub fn run_var(&self, name: &str) -> Option<&Value> {
        self.run_vars.get(name)
    }

    /// Bind a run variable, returning whatever run value the name held.
    pub fn set_run_var(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.merged = None;
        self.run_vars.insert(name.into(), value)
    }

    /// Drop a run variable, returning its value.
    pub fn remove_run_var(&mut self, name: &str) -> Option<Value> {
        let prev = self.run_vars.remove(name);
        if prev.is_some() {
            self.merged = None;
        }
        prev
    }

    /// The merged name environment fed to the evaluator.
    pub fn merged_view(&mut self) -> &FxHashMap<String, Value> {
        if self.merged.is_none() {
            let mut merged = self.data.clone();
            for (k, v) in &self.run_vars {
                merged.insert(k.clone(), v.clone());
            }
            self.merged = Some(merged);
        }
        self.merged.as_ref().expect("just built")
    }

    /// Evaluate a bare expression (no notation markers) to a typed value.
    pub fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let evaluator = Arc::clone(&self.evaluator);
        evaluator.evaluate(expression, self.merged_view())
    }

    /// Evaluate a bare expression as a condition: `Empty` is `false`, any
    /// non-boolean result is an error.
    pub fn evaluate_condition(&mut self, expression: &str) -> Result<bool> {
        match self.evaluate(expression)? {
            Value::Empty => Ok(false),
            Value::Bool(b) => Ok(b),
            other => Err(TemplateError::WrongResultType {
                expression: expression.to_string(),
                expected: "boolean",
                actual: other.type_name(),
            }),
        }
    }

    /// Evaluate cell text that may contain expression notation.
    ///
    /// Text that is exactly one `${...}` yields the evaluator's typed
    /// result; mixed text evaluates each fragment and concatenates the
    /// display forms; text without markers comes back verbatim.
    pub fn evaluate_cell_text(&mut self, text: &str) -> Result<Value> {
        if let Some(expr) = self.notation.single_expression(text) {
            let expr = expr.to_string();
            return self.evaluate(&expr);
        }
        if !self.notation.contains_expression(text) {
            return Ok(Value::Text(text.to_string()));
        }
        let fragments: Vec<Fragment<'_>> = self.notation.fragments(text);
        let owned: Vec<(bool, String)> = fragments
            .into_iter()
            .map(|f| match f {
                Fragment::Literal(s) => (false, s.to_string()),
                Fragment::Expr(s) => (true, s.to_string()),
            })
            .collect();
        let mut out = String::new();
        for (is_expr, piece) in owned {
            if is_expr {
                out.push_str(&self.evaluate(&piece)?.to_string());
            } else {
                out.push_str(&piece);
            }
        }
        Ok(Value::Text(out))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data", &self.data.len())
            .field("run_vars", &self.run_vars.len())
            .finish()
    }
}

/// Scoped run-variable binding.
///
/// Remembers whatever run value first occupied each bound name (or its
/// absence) and restores it on drop, so nested loops reusing a variable
/// name shadow and un-shadow correctly on every exit path, including
/// error unwinding.
pub struct VarGuard<'a> {
    ctx: &'a mut Context,
    saved: SmallVec<[(String, Option<Value>); 2]>,
}

impl<'a> VarGuard<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        VarGuard {
            ctx,
            saved: SmallVec::new(),
        }
    }

    /// Bind `name` for the lifetime of the guard. Rebinding the same name
    /// on later iterations keeps the original saved value.
    pub fn bind(&mut self, name: &str, value: Value) {
        let prev = self.ctx.set_run_var(name.to_string(), value);
        if !self.saved.iter().any(|(n, _)| n == name) {
            self.saved.push((name.to_string(), prev));
        }
    }
}

impl Drop for VarGuard<'_> {
    fn drop(&mut self) {
        while let Some((name, prev)) = self.saved.pop() {
            match prev {
                Some(value) => {
                    self.ctx.set_run_var(name, value);
                }
                None => {
                    self.ctx.remove_run_var(&name);
                }
            }
        }
    }
}

impl Deref for VarGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for VarGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionEvaluator;
    use rustc_hash::FxHashMap;

    /// Evaluator that resolves bare names from the environment.
    struct LookupEvaluator;

    impl ExpressionEvaluator for LookupEvaluator {
        fn evaluate(&self, expression: &str, env: &FxHashMap<String, Value>) -> Result<Value> {
            Ok(env.get(expression.trim()).cloned().unwrap_or(Value::Empty))
        }

        fn check_syntax(&self, _expression: &str) -> Result<()> {
            Ok(())
        }
    }

    fn ctx() -> Context {
        Context::new(Arc::new(LookupEvaluator))
    }

    #[test]
    fn run_vars_shadow_base_data() {
        let mut c = ctx();
        c.put("x", 1i64);
        assert_eq!(c.get("x"), Some(&Value::Int(1)));
        c.set_run_var("x", Value::Int(2));
        assert_eq!(c.get("x"), Some(&Value::Int(2)));
        assert_eq!(c.evaluate("x").unwrap(), Value::Int(2));
        c.remove_run_var("x");
        assert_eq!(c.evaluate("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn guard_restores_previous_binding() {
        let mut c = ctx();
        c.set_run_var("e", Value::Int(10));
        {
            let mut guard = VarGuard::new(&mut c);
            guard.bind("e", Value::Int(20));
            guard.bind("e", Value::Int(30));
            assert_eq!(guard.run_var("e"), Some(&Value::Int(30)));
        }
        assert_eq!(c.run_var("e"), Some(&Value::Int(10)));
    }

    #[test]
    fn guard_removes_binding_it_introduced() {
        let mut c = ctx();
        {
            let mut guard = VarGuard::new(&mut c);
            guard.bind("item", Value::Int(1));
            guard.bind("idx", Value::Int(0));
        }
        assert_eq!(c.run_var("item"), None);
        assert_eq!(c.run_var("idx"), None);
    }

    #[test]
    fn condition_semantics() {
        let mut c = ctx();
        c.put("flag", true);
        c.put("n", 3i64);
        assert!(c.evaluate_condition("flag").unwrap());
        assert!(!c.evaluate_condition("missing").unwrap());
        assert!(matches!(
            c.evaluate_condition("n"),
            Err(TemplateError::WrongResultType { .. })
        ));
    }

    #[test]
    fn mixed_cell_text_concatenates() {
        let mut c = ctx();
        c.put("name", "World");
        assert_eq!(
            c.evaluate_cell_text("Hello ${name}!").unwrap(),
            Value::Text("Hello World!".to_string())
        );
        assert_eq!(c.evaluate_cell_text("${name}").unwrap(), Value::from("World"));
        assert_eq!(
            c.evaluate_cell_text("plain").unwrap(),
            Value::Text("plain".to_string())
        );
    }
}
