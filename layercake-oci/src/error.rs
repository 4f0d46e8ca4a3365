/// Errors produced by the OCI model types.
#[derive(Debug, thiserror::Error)]
pub enum OciError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("duplicate layer: {0}")]
    DuplicateLayer(String),

    #[error("layer property missing: {0}")]
    LayerPropertyMissing(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OciError>;
