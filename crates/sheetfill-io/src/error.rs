use thiserror::Error;

/// Failures opening, decoding or writing documents.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "json")]
    #[error("malformed document json: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "json")]
    #[error("invalid {field} entry: {value:?}")]
    Field { field: &'static str, value: String },

    /// The xlsx codec reports errors as strings.
    #[cfg(feature = "umya")]
    #[error("xlsx: {0}")]
    Xlsx(String),

    #[error(transparent)]
    Template(#[from] sheetfill_engine::TemplateError),
}
