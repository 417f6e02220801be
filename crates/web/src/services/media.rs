//! Media uploads for posts and avatars.
//!
//! Files land in the backend's storage bucket under `<user>/<uuid>.<ext>`,
//! so a user's uploads are grouped and storage policies can key on the
//! first path segment.

use agora_core::UserId;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::{Access, BackendClient, BackendError};
use crate::models::MediaKind;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Largest accepted video.
pub const MAX_VIDEO_BYTES: usize = 50 * 1024 * 1024;

/// Errors from media uploads.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file is larger than {max_mb} MB")]
    TooLarge { max_mb: usize },

    #[error("file is empty")]
    Empty,

    #[error("storage error: {0}")]
    Backend(#[from] BackendError),
}

/// An accepted content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub kind: MediaKind,
    pub extension: &'static str,
    pub max_bytes: usize,
}

/// Check a content type against the allow-list.
///
/// # Errors
///
/// Returns `UnsupportedType` for anything not listed.
pub fn accept(content_type: &str) -> Result<Accepted, MediaError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let (kind, extension) = match essence.as_str() {
        "image/jpeg" => (MediaKind::Image, "jpg"),
        "image/png" => (MediaKind::Image, "png"),
        "image/webp" => (MediaKind::Image, "webp"),
        "image/gif" => (MediaKind::Image, "gif"),
        "video/mp4" => (MediaKind::Video, "mp4"),
        "video/webm" => (MediaKind::Video, "webm"),
        _ => return Err(MediaError::UnsupportedType(essence)),
    };
    let max_bytes = match kind {
        MediaKind::Image => MAX_IMAGE_BYTES,
        MediaKind::Video => MAX_VIDEO_BYTES,
    };

    Ok(Accepted {
        kind,
        extension,
        max_bytes,
    })
}

/// A stored upload.
#[derive(Debug, Clone)]
pub struct Uploaded {
    pub url: String,
    pub kind: MediaKind,
}

/// Upload service.
pub struct MediaService<'a> {
    backend: &'a BackendClient,
}

impl<'a> MediaService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient) -> Self {
        Self { backend }
    }

    /// Validate and store a file, returning its public URL.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType`, `TooLarge` or `Empty` for rejected files.
    #[instrument(skip(self, bytes, access), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        owner: UserId,
        content_type: &str,
        bytes: Vec<u8>,
        access: Access<'_>,
    ) -> Result<Uploaded, MediaError> {
        let accepted = accept(content_type)?;
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if bytes.len() > accepted.max_bytes {
            return Err(MediaError::TooLarge {
                max_mb: accepted.max_bytes / (1024 * 1024),
            });
        }

        let path = format!("{owner}/{}.{}", Uuid::new_v4().simple(), accepted.extension);
        self.backend
            .upload(&path, content_type, bytes, access)
            .await?;
        info!(path = %path, "Media uploaded");

        Ok(Uploaded {
            url: self.backend.public_url(&path),
            kind: accepted.kind,
        })
    }

    /// Remove an upload by its public URL. Failures are logged, not raised.
    pub async fn remove(&self, public_url: &str, access: Access<'_>) {
        let Some(path) = self.backend.object_path(public_url) else {
            return;
        };
        if let Err(e) = self.backend.remove(&[path], access).await {
            warn!(error = %e, path = %path, "Failed to remove media");
        }
    }
}
