use thiserror::Error;

use crate::guid::GuidParseError;
use crate::manifest::ManifestError;

pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors raised while extracting a payload from a hex dump block.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("dump line {line}: cell at column {column} is not a hex byte: `{cell}`")]
    InvalidHexCell {
        line: usize,
        column: usize,
        cell: String,
    },

    #[error("decoded payload is not valid UTF-8: {source}")]
    InvalidUtf8 {
        #[from]
        source: std::string::FromUtf8Error,
    },

    #[error("decoded payload has no `{expected}` marking the start of the document")]
    MissingPayloadStart { expected: char },

    #[error("payload is not valid JSON: {source}")]
    Json { source: serde_json::Error },

    #[error("payload JSON is {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// Errors raised while pulling a typed value out of a decoded field map.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field `{name}` is missing from the payload")]
    Missing { name: &'static str },

    #[error("field `{name}` is not {expected} (found `{found}`)")]
    WrongType {
        name: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("field `{name}` is not a valid identifier: {source}")]
    InvalidGuid {
        name: &'static str,
        source: GuidParseError,
    },
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to ingest manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("capture line {line}: {source}")]
    InvalidCaptureLine {
        line: usize,
        source: serde_json::Error,
    },

    #[error("An I/O error has occurred: {0}")]
    Io(#[from] std::io::Error),
}
