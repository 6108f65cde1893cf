use thiserror::Error;

/// Crate-level error type.
///
/// Per-model stream failures are scoped to one model and carried as events
/// on the fan-in channel; only failures that affect the whole run (every
/// stream failed, unusable preferences file) surface as `ChorusError`.
#[derive(Debug, Error)]
pub enum ChorusError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model '{model}' stream failed: {message}")]
    Stream { model: String, message: String },

    #[error("all model streams failed")]
    AllModelsFailed,

    #[error("preferences file error: {0}")]
    Prefs(String),

    #[error("gesture tracking unavailable: {0}")]
    Gesture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
