//! Meta crate that re-exports the primary sheetfill building blocks with
//! sensible defaults. Downstream users can depend on this crate and opt into
//! specific layers via feature flags while keeping access to the underlying
//! crates when deeper integration is required.

#[cfg(feature = "common")]
pub use sheetfill_common as common;

#[cfg(feature = "engine")]
pub use sheetfill_engine as engine;

#[cfg(feature = "io")]
pub use sheetfill_io as io;

#[cfg(feature = "common")]
pub use sheetfill_common::{AreaRef, CellRef, Size, Value};

#[cfg(feature = "engine")]
pub use sheetfill_engine::{
    Context, DocumentTransformer, FillConfig, FillSummary, InMemoryTransformer, TemplateError,
    fill, validate_template,
};

#[cfg(feature = "rhai")]
pub use sheetfill_engine::RhaiEvaluator;

#[cfg(feature = "umya")]
pub use sheetfill_io::UmyaTransformer;
