use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions that abort the conversion of one input document.
///
/// Recoverable inconsistencies are never reported through this type; they are
/// collected as [`crate::diagnostics::Issue`] values instead.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(String),

    /// Schema violation or missing required element/semantic.
    #[error("parse error: {0}")]
    Parse(String),

    /// Document content is well formed but structurally unusable.
    #[error("structural error: {0}")]
    Structural(String),

    /// A geometry or controller reference could not be resolved.
    #[error("unresolved reference: {0}")]
    Reference(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("bind matrix of joint {joint} is not invertible")]
    NonInvertible { joint: String },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ConversionError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
