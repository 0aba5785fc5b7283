#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "umya")]
pub mod umya;
