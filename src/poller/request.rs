use serde::{Deserialize, Serialize};

use crate::vendor::SwapOptions;

/// Who asked for a swap and with which hairstyle. Carried through to the
/// result sink untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub user_id: String,
    pub user_name: String,
    pub style_id: String,
    pub style_name: String,
}

/// One face-swap job to run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    /// Customer photo providing the face.
    pub source: String,
    /// Hairstyle photo the face is placed onto.
    pub target: String,
    pub options: SwapOptions,
    pub metadata: RequestMetadata,
}

impl SwapRequest {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            options: SwapOptions {
                face_enhance: true,
                ..Default::default()
            },
            metadata: RequestMetadata::default(),
        }
    }

    pub fn with_options(mut self, options: SwapOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
