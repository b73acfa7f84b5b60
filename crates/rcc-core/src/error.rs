//! Error types for rcc-core

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors raised while resolving a target triple.
///
/// These are always detected before any container operation is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Architecture outside the supported set
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// ROS distribution outside the union of ROS 1 and ROS 2 distributions
    #[error("Unsupported target distribution: {0}")]
    UnsupportedTargetDistribution(String),

    /// A free-form identifier was empty
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Errors produced by the container engine client.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The build log contained an error chunk
    #[error("Error building image {tag}: {message}")]
    Build { tag: String, message: String },

    /// The container ran to completion but exited with a failure code
    #[error("Container from image {image} exited with code {exit_code}: {message}")]
    RunFailure {
        image: String,
        exit_code: i64,
        message: String,
    },

    /// The engine API itself failed (connectivity, missing image, malformed request)
    #[error("Container engine error: {0}")]
    Api(String),

    /// The build context directory could not be packed
    #[error("Failed to pack build context {path:?}: {source}")]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        EngineError::Api(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
