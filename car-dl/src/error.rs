//! The failure taxonomy of the data pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Classified pipeline failures.
///
/// Functions in this crate return [anyhow::Result]. The errors they raise for
/// bad data or bad settings carry one of these variants, which can be
/// recovered with `error.downcast_ref::<PipelineError>()` even after context
/// has been attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },
    #[error("unable to read image '{}': {reason}", path.display())]
    ImageNotFound { path: PathBuf, reason: String },
    #[error("invalid crop box {crop_box:?} for image '{}' of size {width}x{height}", path.display())]
    InvalidCrop {
        path: PathBuf,
        crop_box: [i64; 4],
        width: i64,
        height: i64,
    },
    #[error("class id {class_id} is out of range 1..={num_classes}")]
    OutOfRange { class_id: i64, num_classes: usize },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
