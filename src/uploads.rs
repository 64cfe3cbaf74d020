//! Turns inline `data:image/...;base64,` images into files served under
//! `/uploads`, so the vendor receives plain URLs.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::info;

use crate::config::UploadSettings;

/// Largest decoded image accepted.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Malformed data URL: {0}")]
    Malformed(String),

    #[error("Uploaded data is not a supported image")]
    NotAnImage,

    #[error("Image too large ({0})")]
    TooLarge(String),

    #[error("Failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

pub fn is_inline_image(locator: &str) -> bool {
    locator.starts_with("data:image/")
}

/// Decodes the payload of a base64 image data URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, UploadError> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| UploadError::Malformed("missing ',' separator".to_string()))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(UploadError::Malformed(format!(
            "unsupported header '{}'",
            header
        )));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| UploadError::Malformed(e.to_string()))
}

pub struct UploadStore {
    media_path: PathBuf,
    public_base_url: String,
}

impl UploadStore {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            media_path: settings.media_path.clone(),
            public_base_url: settings.public_base_url.clone(),
        }
    }

    pub fn media_path(&self) -> &PathBuf {
        &self.media_path
    }

    /// Returns `locator` unchanged unless it is an inline image, in which case
    /// the image is written under `folder` and its public URL is returned.
    pub async fn publish_if_inline(&self, locator: &str, folder: &str) -> Result<String, UploadError> {
        if !is_inline_image(locator) {
            return Ok(locator.to_string());
        }

        let bytes = decode_data_url(locator)?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge(format!(
                "{:#}",
                byte_unit::Byte::from(bytes.len())
            )));
        }
        let kind = infer::get(&bytes)
            .filter(|k| k.matcher_type() == infer::MatcherType::Image)
            .ok_or(UploadError::NotAnImage)?;

        let dir = self.media_path.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
        tokio::fs::write(dir.join(&file_name), &bytes).await?;

        info!(
            "Stored inline {} upload as {}/{} ({:#})",
            kind.mime_type(),
            folder,
            file_name,
            byte_unit::Byte::from(bytes.len())
        );
        Ok(format!(
            "{}/uploads/{}/{}",
            self.public_base_url, folder, file_name
        ))
    }
}
