//! Error types for layercake

use std::path::PathBuf;

use layercake_oci::OciError;
use thiserror::Error;

/// Result type alias using layercake Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in layercake operations
#[derive(Error, Debug)]
pub enum Error {
    /// Digest, blob, layer and manifest errors
    #[error(transparent)]
    Oci(#[from] OciError),

    /// Cache metadata exists but cannot be interpreted
    #[error("cache metadata corrupted at {path}: {reason}")]
    CacheMetadataCorrupted { path: PathBuf, reason: String },

    /// I/O errors
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheMetadataCorrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for I/O failures raised by either crate.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Oci(OciError::Io(_)))
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io("I/O failure", source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_from_either_crate() {
        let own = Error::io("reading x", std::io::Error::other("boom"));
        assert!(own.is_io());
        assert!(own.to_string().contains("reading x"));

        let oci = Error::from(OciError::Io(std::io::Error::other("boom")));
        assert!(oci.is_io());

        assert!(!Error::Config("bad".into()).is_io());
    }

    #[test]
    fn oci_errors_display_transparently() {
        let err = Error::from(OciError::DuplicateLayer("sha256:aa".into()));
        assert_eq!(err.to_string(), "duplicate layer: sha256:aa");
    }
}
