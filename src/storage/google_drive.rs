//! Google Drive document store (Drive API v3, multipart upload).

use async_trait::async_trait;
use reqwest::{header, Method, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{artifact_file_name, DocumentStore, UploadError};
use crate::google::GoogleAuth;

const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";
const OPEN_URL: &str = "https://docs.google.com/open?id=";

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Uploads artifacts into a Drive folder.
pub struct GoogleDriveStore {
    auth: GoogleAuth,
    folder_id: Option<String>,
}

impl GoogleDriveStore {
    /// `folder_id` of `None` (or empty) uploads to the Drive root.
    pub fn new(auth: GoogleAuth, folder_id: Option<String>) -> Self {
        Self {
            auth,
            folder_id: folder_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

/// Build a `multipart/related` body: JSON metadata part, then the media part.
pub fn multipart_related_body(
    boundary: &str,
    metadata: &[u8],
    mime: &str,
    media: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Shareable link for a Drive file id.
pub fn open_url(file_id: &str) -> String {
    format!("{}{}", OPEN_URL, file_id)
}

#[async_trait]
impl DocumentStore for GoogleDriveStore {
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let name = artifact_file_name(path)?;
        let media = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let metadata = serde_json::to_vec(&FileMetadata {
            name: &name,
            parents: self.folder_id.as_deref().into_iter().collect(),
        })?;

        let boundary = format!("certgen-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata, mime.essence_str(), &media);

        let mut url = Url::parse(UPLOAD_ENDPOINT).map_err(|_| UploadError::InvalidUrl)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id");

        log::info!("Uploading {} ({} bytes)", name, media.len());
        let response = self
            .auth
            .request(Method::POST, url)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedFile = response.json().await?;
        let url = open_url(&created.id);
        log::info!("Uploaded {} as {}", name, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_related_body_layout() {
        let body = multipart_related_body("b", br#"{"name":"Ada.pdf"}"#, "application/pdf", b"%PDF");
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"Ada.pdf\"}\r\n--b\r\nContent-Type: application/pdf\r\n\r\n%PDF\r\n--b--\r\n"
        );
    }

    #[test]
    fn test_metadata_omits_empty_parents() {
        let json = serde_json::to_string(&FileMetadata {
            name: "Ada.pdf",
            parents: Vec::new(),
        })
        .unwrap();
        assert_eq!(json, r#"{"name":"Ada.pdf"}"#);

        let json = serde_json::to_string(&FileMetadata {
            name: "Ada.pdf",
            parents: vec!["folder-1"],
        })
        .unwrap();
        assert_eq!(json, r#"{"name":"Ada.pdf","parents":["folder-1"]}"#);
    }

    #[test]
    fn test_blank_folder_id_means_root() {
        let auth = GoogleAuth::from_access_token(reqwest::Client::new(), "t");
        let store = GoogleDriveStore::new(auth, Some("  ".to_string()));
        assert!(store.folder_id.is_none());
    }

    #[test]
    fn test_open_url() {
        assert_eq!(open_url("abc123"), "https://docs.google.com/open?id=abc123");
    }

    #[test]
    fn test_created_file_response() {
        let created: CreatedFile = serde_json::from_str(r#"{"id":"1AbC"}"#).unwrap();
        assert_eq!(created.id, "1AbC");
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let auth = GoogleAuth::from_access_token(reqwest::Client::new(), "t");
        let store = GoogleDriveStore::new(auth, None);
        let dir = tempfile::tempdir().unwrap();
        let err = store.upload(&dir.path().join("nope.pdf")).await.unwrap_err();
        assert!(matches!(err, UploadError::Read { .. }));
    }
}
