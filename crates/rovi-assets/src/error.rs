//! Asset-layer errors

/// Errors from bundle lookup and mesh decoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found in bundle: {0}")]
    NotFound(String),

    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode mesh '{path}': {reason}")]
    Decode { path: String, reason: String },
}

pub type AssetResult<T> = Result<T, AssetError>;

impl AssetError {
    pub fn decode(path: impl Into<String>, reason: impl ToString) -> Self {
        AssetError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
