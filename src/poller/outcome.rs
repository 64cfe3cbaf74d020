use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSide {
    /// The customer photo whose face is transplanted.
    Source,
    /// The hairstyle photo receiving the face.
    Target,
}

impl std::fmt::Display for ImageSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSide::Source => write!(f, "source"),
            ImageSide::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapSuccess {
    pub output_url: String,
    /// Time from accepted submission to the successful status check.
    pub elapsed: Duration,
    /// Status checks it took, including the successful one.
    pub attempts: u32,
    pub job_id: String,
}

/// How a swap sequence can end without a result image.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwapError {
    #[error("Vendor authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("No usable face in {side} image: {reason}")]
    DetectionFailed { side: ImageSide, reason: String },

    /// Detection kept failing for reasons unrelated to the image.
    #[error("Face detection unavailable for {side} image: {reason}")]
    VendorUnavailable { side: ImageSide, reason: String },

    #[error("Swap submission failed: {reason}")]
    SubmissionFailed { reason: String },

    #[error("Vendor reported the swap as failed (status check {attempt})")]
    ProcessingFailed { attempt: u32 },

    /// `vendor_record_seen` is false when every status check came back
    /// without a job record.
    #[error("Swap not finished after {attempts} status checks")]
    TimedOut {
        attempts: u32,
        vendor_record_seen: bool,
    },

    #[error("Swap cancelled")]
    Cancelled,
}

impl SwapError {
    /// Stable identifier exposed to API clients and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::Auth(_) => "auth_failed",
            SwapError::DetectionFailed { .. } => "detection_failed",
            SwapError::VendorUnavailable { .. } => "vendor_unavailable",
            SwapError::SubmissionFailed { .. } => "submission_failed",
            SwapError::ProcessingFailed { .. } => "processing_failed",
            SwapError::TimedOut { .. } => "timed_out",
            SwapError::Cancelled => "cancelled",
        }
    }
}

/// Terminal result of one swap sequence.
pub type PollResult = Result<SwapSuccess, SwapError>;
