//! Failures of the external tools a run depends on.

use thiserror::Error;

/// A missing or broken external collaborator. The pipeline substitutes synthetic output for
/// these instead of failing the run; every other error is fatal.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("frame extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("detection model not found at {0}")]
    ModelMissing(String),

    #[error("detection model unreadable: {0}")]
    ModelFormat(String),

    #[error("object detector unavailable: {0}")]
    DetectorUnavailable(String),
}

/// True when `err` carries a [`ToolError`] anywhere in its chain.
pub fn is_degraded(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<ToolError>().is_some())
}
