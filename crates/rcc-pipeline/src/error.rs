//! Pipeline error types.

use std::path::PathBuf;

use rcc_core::EngineError;

/// Errors that stop a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("invalid workspace {path:?}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(stage: &'static str, source: EngineError) -> Self {
        PipelineError::Stage { stage, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Name of the failing stage, if the error came from one.
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            PipelineError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
