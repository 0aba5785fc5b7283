//! One-call template fill: build, replay, formula pass.

use std::time::Instant;

use tracing::debug;

use crate::builder::AreaBuilder;
use crate::context::Context;
use crate::error::Result;
use crate::formula::FormulaProcessor;
use crate::transform::DocumentTransformer;

/// What a completed fill did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FillSummary {
    /// Root areas found and replayed.
    pub areas: usize,
    /// Combined footprint, in cells, of the bands the roots wrote.
    pub cells_written: u64,
    /// Formula copies whose text changed in the formula pass.
    pub formulas_rewritten: usize,
    /// Sheets present afterwards that the template did not have.
    pub sheets_created: usize,
    pub elapsed_ms: u64,
}

/// Fill the annotated template held by `transformer` against `ctx`.
///
/// Parses the annotations into root areas, replays every root at its own
/// origin, then (unless [`FillConfig`](crate::FillConfig) says otherwise)
/// rewrites formulas per root. Callers needing custom commands or targets
/// compose [`AreaBuilder`], [`Area::apply_at`](crate::Area::apply_at) and
/// [`FormulaProcessor`] directly instead.
pub fn fill(transformer: &mut dyn DocumentTransformer, ctx: &mut Context) -> Result<FillSummary> {
    let started = Instant::now();
    let sheets_before = transformer.sheet_names();

    transformer.reset_tracking();
    let areas = AreaBuilder::new().build(transformer)?;
    debug!(roots = areas.len(), "template built");

    let mut cells_written = 0u64;
    for area in &areas {
        let applied = area.apply_self(ctx, transformer)?;
        cells_written += applied.cell_count();
    }

    let mut formulas_rewritten = 0;
    if ctx.config().process_formulas {
        let default_value = ctx.config().formula_default_value.clone();
        for area in &areas {
            formulas_rewritten +=
                FormulaProcessor::new(area.area_ref(), default_value.clone())
                    .process(transformer)?;
        }
    }

    let sheets_created = transformer
        .sheet_names()
        .iter()
        .filter(|name| !sheets_before.contains(name))
        .count();
    let summary = FillSummary {
        areas: areas.len(),
        cells_written,
        formulas_rewritten,
        sheets_created,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    debug!(?summary, "fill complete");
    Ok(summary)
}
