//! Persistence adapters for sheetfill documents.
//!
//! Two backends, each behind a feature:
//!
//! - `json` (default): a serde mirror of the in-memory document model,
//!   handy for services and for fixtures in tests.
//! - `umya`: real XLSX workbooks through `umya-spreadsheet`, with template
//!   comments read as annotations and fill output written back in place.

pub mod backends;
pub mod error;

pub use error::IoError;

#[cfg(feature = "json")]
pub use backends::json::JsonWorkbook;
#[cfg(feature = "umya")]
pub use backends::umya::UmyaTransformer;
