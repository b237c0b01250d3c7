//! Adapter error taxonomy

use rovi_assets::AssetError;

use crate::xml::XmlError;

/// Errors surfaced by format adapters and the loading facade.
///
/// Adapter failures are fatal for the load that raised them: no partial
/// model is ever returned, and the previously loaded model stays intact.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The source document is malformed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A file the document requires was missing from the bundle.
    #[error("Asset resolution failed: {0}")]
    AssetResolution(String),

    /// The document parsed but could not be mapped onto the unified model.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// The document's format could not be identified.
    #[error("Unrecognized format for '{0}'")]
    UnknownFormat(String),

    /// Another load is already in flight on this loader.
    #[error("A load is already in progress")]
    LoadInProgress,
}

pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<XmlError> for AdapterError {
    fn from(e: XmlError) -> Self {
        AdapterError::Parse(e.to_string())
    }
}

impl From<AssetError> for AdapterError {
    fn from(e: AssetError) -> Self {
        AdapterError::AssetResolution(e.to_string())
    }
}
