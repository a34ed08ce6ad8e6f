//! Error types for the physics system

use thiserror::Error;

/// Physics system errors
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Handle is stale or refers to an object of another kind
    #[error("Collision object not found: {0:?}")]
    ObjectNotFound(crate::arena::ObjectHandle),

    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// Shape creation failed
    #[error("Failed to create collision shape: {0}")]
    ShapeCreationFailed(String),

    /// A surface parameter with this name is already registered
    #[error("Surface parameter already registered: {0}")]
    DuplicateSurfaceParam(String),

    /// Configuration text could not be parsed
    #[error("Failed to parse physics data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
