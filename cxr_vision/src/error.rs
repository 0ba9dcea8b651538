//! Error types for cxr_vision.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for cxr_vision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, transforming or exporting samples.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed report XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed report XML attribute: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed XML escape sequence: {0}")]
    XmlEscape(#[from] quick_xml::escape::EscapeError),

    /// The document ended before its structure was complete.
    #[error("Incomplete report XML: {0}")]
    IncompleteXml(String),

    #[error("Image error on '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required input directory does not exist.
    #[error("{kind} directory '{path}' not found")]
    MissingDirectory { kind: &'static str, path: PathBuf },

    #[error("Sample index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Dataset at '{0}' contains no XML reports")]
    EmptyDataset(PathBuf),

    /// The export worker pool dropped a task or result channel.
    #[error("Worker pool failure: {0}")]
    Worker(&'static str),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Error::Image {
            path: path.into(),
            source,
        }
    }
}
