//! Per-fill configuration knobs, carried on the [`crate::Context`].

/// Settings for one fill invocation.
#[derive(Clone, Debug)]
pub struct FillConfig {
    /// Run the formula-relocation pass after replay.
    pub process_formulas: bool,
    /// Literal substituted for references whose source cell vanished.
    pub formula_default_value: String,
    /// Propagate source row heights to written rows.
    pub update_row_heights: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        FillConfig {
            process_formulas: true,
            formula_default_value: "0".to_string(),
            update_row_heights: false,
        }
    }
}
