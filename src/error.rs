//! Error types for the finite element engine

use thiserror::Error;

use crate::elements::DofCode;

/// Main error type for model construction and analysis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FemError {
    #[error("Node {0} not found in system")]
    NodeNotFound(usize),

    #[error("Element {0} not found in system")]
    ElementNotFound(usize),

    #[error("Degree of freedom '{0}' is not defined at this node")]
    UnknownDof(DofCode),

    #[error("Degree of freedom '{0}' is fixed and cannot be assigned a different displacement")]
    FixedDof(DofCode),

    #[error("Expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid material: {0}")]
    InvalidMaterial(String),

    #[error("Element state is stale - call update_state() after changing nodal displacements")]
    StaleState,

    #[error("Element state has not been computed - call update_state() first")]
    NotUpdated,

    #[error("Singular stiffness matrix - model may be unstable or have insufficient supports")]
    SingularMatrix,

    #[error("Stiffness matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("No solver attached to system")]
    NoSolver,

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FemError {
    fn from(err: serde_json::Error) -> Self {
        FemError::SerializationError(err.to_string())
    }
}

/// Result type for finite element operations
pub type FemResult<T> = Result<T, FemError>;
