//! Fatal pipeline errors.
//!
//! Each variant names the stage that failed. Refinement failures are not
//! represented here: the refiner recovers from them locally.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Media read error: {0}")]
    MediaRead(String),

    #[error("Detection service error: {0}")]
    DetectionService(String),

    #[error("Detection parse error: {0}")]
    DetectionParse(String),

    #[error("Crop error: {0}")]
    Crop(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Workspace error: {0}")]
    Workspace(String),
}

impl PipelineError {
    pub fn media_read(msg: impl Into<String>) -> Self {
        Self::MediaRead(msg.into())
    }

    pub fn detection_service(msg: impl Into<String>) -> Self {
        Self::DetectionService(msg.into())
    }

    pub fn detection_parse(msg: impl Into<String>) -> Self {
        Self::DetectionParse(msg.into())
    }

    pub fn crop(msg: impl Into<String>) -> Self {
        Self::Crop(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Short stage name, used in logs and the CLI error line.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::MediaRead(_) => "extract",
            PipelineError::DetectionService(_) | PipelineError::DetectionParse(_) => "detect",
            PipelineError::Crop(_) => "crop",
            PipelineError::Encode(_) => "encode",
            PipelineError::Workspace(_) => "workspace",
        }
    }
}

/// Render an `anyhow` chain on one line so it survives the stage mapping.
pub(crate) fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
