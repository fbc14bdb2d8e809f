use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed manifest XML at position {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("`<{element}>` is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("`<{element}>` has an invalid `{attribute}` attribute: `{value}`")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
}

pub(super) type Result<T> = std::result::Result<T, ManifestError>;
