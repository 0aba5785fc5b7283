//! Formula relocation after area replay.
//!
//! Replay copies formula text verbatim and records, per template cell, the
//! positions it was copied to. This pass runs afterwards: for every formula
//! the template holds inside a processed area, and for every position that
//! formula landed at, it rewrites each cell and range reference to point at
//! the recorded targets of the referenced template cells.

mod refs;

pub use refs::{RefToken, scan_refs};

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use sheetfill_common::{AreaRef, CellRef, sheet_name_needs_quoting};

use crate::error::Result;
use crate::transform::{DocumentTransformer, FormulaParams, FormulaStrategy};

/// References joined with `,` up to this count; longer lists fall back to a
/// `+` chain because function argument lists cap at 255 entries.
const MAX_JOINED_REFS: usize = 255;

/// Rewrites the formulas of one processed root area.
pub struct FormulaProcessor {
    area: AreaRef,
    default_value: String,
}

impl FormulaProcessor {
    pub fn new(area: AreaRef, default_value: impl Into<String>) -> Self {
        FormulaProcessor {
            area,
            default_value: default_value.into(),
        }
    }

    /// Rewrite every template formula inside this processor's area, at every
    /// position the formula cell was copied to. Returns how many copies came
    /// out textually changed.
    pub fn process(&self, transformer: &mut dyn DocumentTransformer) -> Result<usize> {
        let mut rewritten = 0;
        for cell in transformer.formula_cells() {
            if !self.area.contains(&cell) {
                continue;
            }
            let Some(data) = transformer.cell_data(&cell) else {
                continue;
            };
            let Some(formula) = data.formula.clone() else {
                continue;
            };
            let params = data.params.clone();
            let targets = data.targets().to_vec();
            // formulas the replay never copied keep their template text
            if targets.is_empty() {
                continue;
            }
            for target in &targets {
                let new_text = self.rewrite(&formula, target, params.as_ref(), &*transformer);
                if new_text != formula {
                    rewritten += 1;
                }
                transformer.set_formula(target, &new_text)?;
            }
        }
        debug!(area = %self.area, rewritten, "formula pass complete");
        Ok(rewritten)
    }

    /// Produce the rewritten text of one formula copy.
    fn rewrite(
        &self,
        formula: &str,
        formula_target: &CellRef,
        params: Option<&FormulaParams>,
        tx: &dyn DocumentTransformer,
    ) -> String {
        let tokens = scan_refs(formula);
        let mut out = formula.to_string();
        // back to front so earlier spans stay valid while splicing
        for token in tokens.iter().rev() {
            let replacement = if token.is_range() {
                self.rewrite_range(token, formula_target, tx)
            } else {
                self.rewrite_single(token, formula_target, params, tx)
            };
            if let Some(text) = replacement {
                out.replace_range(token.start..token.end, &text);
            }
        }
        out
    }

    /// Rewrite a single-cell reference, or `None` to leave it unchanged.
    fn rewrite_single(
        &self,
        token: &RefToken,
        formula_target: &CellRef,
        params: Option<&FormulaParams>,
        tx: &dyn DocumentTransformer,
    ) -> Option<String> {
        let referenced = self.token_cell(token, token.first);
        let history = recorded_targets(tx, &referenced);
        if history.is_empty() {
            // inside the area the cell was consumed by the fill; outside it
            // still sits where the template put it
            if self.area.contains(&referenced) {
                warn!(
                    reference = %referenced,
                    formula = %formula_target,
                    "no fill targets, using the default literal"
                );
                return Some(self.default_literal(params));
            }
            return None;
        }
        let strategy = params.map(|p| p.strategy).unwrap_or_default();
        let picked: Vec<&CellRef> = match strategy {
            FormulaStrategy::Default => history.iter().collect(),
            FormulaStrategy::ByColumn => history
                .iter()
                .filter(|t| t.sheet == formula_target.sheet && t.col == formula_target.col)
                .collect(),
            FormulaStrategy::ByRow => history
                .iter()
                .filter(|t| t.sheet == formula_target.sheet && t.row == formula_target.row)
                .collect(),
        };
        if picked.is_empty() {
            warn!(
                reference = %referenced,
                formula = %formula_target,
                "strategy filtered out every target, using the default literal"
            );
            return Some(self.default_literal(params));
        }
        Some(self.render_targets(picked, token, formula_target))
    }

    /// Rewrite an `A1:B2` range as the minimal rectangle covering the
    /// recorded targets of both corner cells, or `None` when either corner
    /// has no history.
    fn rewrite_range(
        &self,
        token: &RefToken,
        formula_target: &CellRef,
        tx: &dyn DocumentTransformer,
    ) -> Option<String> {
        let last = token.last?;
        let first_hits = recorded_targets(tx, &self.token_cell(token, token.first));
        let last_hits = recorded_targets(tx, &self.token_cell(token, last));
        if first_hits.is_empty() || last_hits.is_empty() {
            return None;
        }
        let mut pool: Vec<&CellRef> = first_hits.iter().chain(last_hits.iter()).collect();
        // corners scattered over several sheets: keep the formula's own
        // sheet when it is represented, otherwise the first recorded one
        if pool.iter().any(|t| t.sheet == formula_target.sheet) {
            pool.retain(|t| t.sheet == formula_target.sheet);
        } else {
            let anchor = pool[0].sheet.clone();
            pool.retain(|t| t.sheet == anchor);
        }
        let min_row = pool.iter().map(|t| t.row).min()?;
        let max_row = pool.iter().map(|t| t.row).max()?;
        let min_col = pool.iter().map(|t| t.col).min()?;
        let max_col = pool.iter().map(|t| t.col).max()?;
        let start = CellRef::new(pool[0].sheet.clone(), min_row, min_col);
        let end = CellRef::new(pool[0].sheet.clone(), max_row, max_col);
        let head = self.render_ref(&start, token, formula_target);
        Some(format!("{head}:{}", end.cell_name()))
    }

    /// Render a set of relocated targets as reference text: one reference,
    /// a `start:end` span when they form an unbroken line, or a joined list.
    fn render_targets(
        &self,
        targets: Vec<&CellRef>,
        token: &RefToken,
        formula_target: &CellRef,
    ) -> String {
        let mut seen = FxHashSet::default();
        let targets: Vec<&CellRef> = targets
            .into_iter()
            .filter(|t| seen.insert((*t).clone()))
            .collect();
        if targets.len() == 1 {
            return self.render_ref(targets[0], token, formula_target);
        }
        let mut sorted = targets.clone();
        sorted.sort();
        if let Some((first, last)) = contiguous_run(&sorted) {
            let head = self.render_ref(first, token, formula_target);
            return format!("{head}:{}", last.cell_name());
        }
        let joiner = if targets.len() > MAX_JOINED_REFS {
            "+"
        } else {
            ","
        };
        targets
            .iter()
            .map(|t| self.render_ref(t, token, formula_target))
            .collect::<Vec<_>>()
            .join(joiner)
    }

    /// Render one target, prefixing the sheet when the original reference
    /// already crossed sheets or the target landed off the formula's sheet.
    fn render_ref(&self, target: &CellRef, token: &RefToken, formula_target: &CellRef) -> String {
        let crossed_sheets = token
            .sheet
            .as_deref()
            .is_some_and(|s| !s.eq_ignore_ascii_case(&self.area.first_cell.sheet));
        let needs_sheet =
            crossed_sheets || !target.sheet.eq_ignore_ascii_case(&formula_target.sheet);
        if !needs_sheet {
            return target.cell_name();
        }
        if sheet_name_needs_quoting(&target.sheet) {
            format!("'{}'!{}", target.sheet.replace('\'', "''"), target.cell_name())
        } else {
            format!("{}!{}", target.sheet, target.cell_name())
        }
    }

    /// Resolve a token corner against the area's sheet.
    fn token_cell(&self, token: &RefToken, corner: (u32, u32)) -> CellRef {
        let sheet = token
            .sheet
            .as_deref()
            .unwrap_or(&self.area.first_cell.sheet);
        CellRef::new(sheet, corner.0, corner.1)
    }

    fn default_literal(&self, params: Option<&FormulaParams>) -> String {
        params
            .and_then(|p| p.default_value.clone())
            .unwrap_or_else(|| self.default_value.clone())
    }
}

fn recorded_targets(tx: &dyn DocumentTransformer, cell: &CellRef) -> Vec<CellRef> {
    tx.cell_data(cell)
        .map(|d| d.targets().to_vec())
        .unwrap_or_default()
}

/// When the sorted targets form one vertical or horizontal unbroken line on
/// a single sheet, return its endpoints.
fn contiguous_run<'a>(sorted: &[&'a CellRef]) -> Option<(&'a CellRef, &'a CellRef)> {
    let first = *sorted.first()?;
    let last = *sorted.last()?;
    if sorted.iter().any(|t| t.sheet != first.sheet) {
        return None;
    }
    let vertical = sorted.iter().all(|t| t.col == first.col)
        && sorted.windows(2).all(|w| w[1].row == w[0].row + 1);
    let horizontal = sorted.iter().all(|t| t.row == first.row)
        && sorted.windows(2).all(|w| w[1].col == w[0].col + 1);
    if vertical || horizontal {
        Some((first, last))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::path_ctx;
    use crate::transform::{FormulaStrategy, InMemoryTransformer};
    use sheetfill_common::{Size, Value};

    fn area(text: &str) -> AreaRef {
        text.parse().unwrap()
    }

    fn copy(doc: &mut InMemoryTransformer, src: &CellRef, target: &CellRef) {
        let mut ctx = path_ctx();
        doc.transform_cell(src, target, &mut ctx, false).unwrap();
    }

    #[test]
    fn range_grows_with_the_recorded_targets() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1:A1)");

        copy(&mut doc, &item, &CellRef::new("Sheet1", 0, 0));
        copy(&mut doc, &item, &CellRef::new("Sheet1", 1, 0));
        copy(&mut doc, &item, &CellRef::new("Sheet1", 2, 0));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 3, 0));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 3, 0)).as_deref(),
            Some("SUM(A1:A3)")
        );
    }

    #[test]
    fn single_reference_with_a_vertical_run_becomes_a_span() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 1);
        let formula = CellRef::new("Sheet1", 1, 1);
        doc.load_value(item.clone(), Value::Int(2));
        doc.load_formula(formula.clone(), "SUM(B1)*2");

        for row in 0..4 {
            copy(&mut doc, &item, &CellRef::new("Sheet1", row, 1));
        }
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 4, 1));

        FormulaProcessor::new(area("Sheet1!B1:B2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 4, 1)).as_deref(),
            Some("SUM(B1:B4)*2")
        );
    }

    #[test]
    fn scattered_targets_join_with_commas() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1)");

        for row in [0u32, 2, 5] {
            copy(&mut doc, &item, &CellRef::new("Sheet1", row, 0));
        }
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 7, 0));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 7, 0)).as_deref(),
            Some("SUM(A1,A3,A6)")
        );
    }

    #[test]
    fn long_scattered_lists_chain_with_plus() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1)");

        for i in 0..300u32 {
            copy(&mut doc, &item, &CellRef::new("Sheet1", i * 2, 0));
        }
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 700, 0));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        let text = doc.formula_at(&CellRef::new("Sheet1", 700, 0)).unwrap();
        assert!(text.starts_with("SUM(A1+"));
        assert!(!text.contains(','));
    }

    #[test]
    fn by_column_strategy_keeps_the_formula_column() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1)");
        doc.set_formula_params(
            &formula,
            FormulaParams {
                default_value: None,
                strategy: FormulaStrategy::ByColumn,
            },
        )
        .unwrap();

        copy(&mut doc, &item, &CellRef::new("Sheet1", 1, 2));
        copy(&mut doc, &item, &CellRef::new("Sheet1", 1, 4));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 5, 2));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 5, 4));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 5, 2)).as_deref(),
            Some("SUM(C2)")
        );
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 5, 4)).as_deref(),
            Some("SUM(E2)")
        );
    }

    #[test]
    fn vanished_references_inside_the_area_become_the_default() {
        let mut doc = InMemoryTransformer::new();
        doc.load_value(CellRef::new("Sheet1", 0, 0), Value::Int(1));
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_formula(formula.clone(), "A1+B9");
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 1, 0));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        // A1 collapsed away, B9 lives outside the area
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 1, 0)).as_deref(),
            Some("0+B9")
        );
    }

    #[test]
    fn params_override_the_default_literal() {
        let mut doc = InMemoryTransformer::new();
        let formula = CellRef::new("Sheet1", 1, 0);
        doc.load_formula(formula.clone(), "A1*2");
        doc.set_formula_params(
            &formula,
            FormulaParams {
                default_value: Some("1".to_string()),
                strategy: FormulaStrategy::Default,
            },
        )
        .unwrap();
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 1, 0));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 1, 0)).as_deref(),
            Some("1*2")
        );
    }

    #[test]
    fn formulas_outside_the_area_keep_their_text() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 9, 5);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1)");
        copy(&mut doc, &item, &CellRef::new("Sheet1", 0, 0));
        copy(&mut doc, &item, &CellRef::new("Sheet1", 1, 0));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 9, 5));

        FormulaProcessor::new(area("Sheet1!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 9, 5)).as_deref(),
            Some("SUM(A1)")
        );
    }

    #[test]
    fn range_with_an_uncopied_corner_is_left_alone() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Sheet1", 0, 0);
        let formula = CellRef::new("Sheet1", 2, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_value(CellRef::new("Sheet1", 1, 0), Value::Int(2));
        doc.load_formula(formula.clone(), "SUM(A1:A2)");
        copy(&mut doc, &item, &CellRef::new("Sheet1", 0, 0));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 2, 0));

        FormulaProcessor::new(area("Sheet1!A1:A3"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 2, 0)).as_deref(),
            Some("SUM(A1:A2)")
        );
    }

    #[test]
    fn targets_on_other_sheets_are_prefixed_and_quoted() {
        let mut doc = InMemoryTransformer::new();
        let item = CellRef::new("Tpl", 0, 0);
        let formula = CellRef::new("Tpl", 1, 0);
        doc.load_value(item.clone(), Value::Int(1));
        doc.load_formula(formula.clone(), "SUM(A1)");

        copy(&mut doc, &item, &CellRef::new("North", 0, 0));
        copy(&mut doc, &item, &CellRef::new("My Data", 0, 0));
        copy(&mut doc, &formula, &CellRef::new("North", 1, 0));

        FormulaProcessor::new(area("Tpl!A1:A2"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("North", 1, 0)).as_deref(),
            Some("SUM(A1,'My Data'!A1)")
        );
    }

    #[test]
    fn explicit_foreign_qualifier_keeps_a_prefix() {
        let mut doc = InMemoryTransformer::new();
        let price = CellRef::new("Rates", 0, 0);
        let formula = CellRef::new("Sheet1", 0, 0);
        doc.load_value(price.clone(), Value::Number(1.5));
        doc.load_formula(formula.clone(), "Rates!A1*B1");
        copy(&mut doc, &price, &CellRef::new("Rates", 4, 0));
        copy(&mut doc, &formula, &CellRef::new("Sheet1", 2, 0));

        FormulaProcessor::new(area("Sheet1!A1"), "0")
            .process(&mut doc)
            .unwrap();
        assert_eq!(
            doc.formula_at(&CellRef::new("Sheet1", 2, 0)).as_deref(),
            Some("Rates!A5*B1")
        );
    }
}
