//! Simulation bridge error taxonomy

/// Errors raised by the physics bridge and its staging layer.
///
/// Every failure is fatal for the operation that raised it; a failed load
/// leaves the bridge unloaded with the staging area cleared, and the
/// caller's static model untouched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimError {
    /// The engine failed to initialize or compile the staged document.
    #[error("Engine init failed: {0}")]
    EngineInit(String),

    /// The source document could not be parsed for rewriting.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The staging filesystem rejected an operation.
    #[error("Staging failed: {0}")]
    Staging(String),

    /// A simulation is already loaded; unload it first.
    #[error("A simulation is already loaded")]
    AlreadyLoaded,
}

pub type SimResult<T> = Result<T, SimError>;
