//! Remote document storage.
//!
//! Generated artifacts can be pushed to a document store; the store answers with a
//! shareable URL that replaces the local path as the record's file reference.

pub mod google_drive;

pub use google_drive::GoogleDriveStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),
    #[error("failed to encode file metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("invalid upload endpoint")]
    InvalidUrl,
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("document store returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Destination for generated artifacts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upload a local file and return a URL referencing the stored copy.
    async fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

/// File name component of an artifact path.
pub fn artifact_file_name(path: &Path) -> Result<String, UploadError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| UploadError::NoFileName(path.to_path_buf()))
}
