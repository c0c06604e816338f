//! Google API credentials.
//!
//! Reads the OAuth client file and a previously stored token file, refreshing the access
//! token when a refresh token is available. Obtaining the first token (the interactive
//! consent flow) is left to external tooling.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials file {} has neither an 'installed' nor a 'web' client", .0.display())]
    NoClient(PathBuf),
    #[error("Google credentials were not loaded")]
    NotLoaded,
    #[error("token refresh failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Refresh { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Authorized HTTP access to Google APIs.
#[derive(Clone)]
pub struct GoogleAuth {
    http: reqwest::Client,
    access_token: String,
}

impl std::fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAuth").finish_non_exhaustive()
    }
}

impl GoogleAuth {
    /// Build an authorized client from stored credentials.
    pub async fn initialize(
        http: reqwest::Client,
        credentials_file: &Path,
        token_file: &Path,
    ) -> Result<Self, AuthError> {
        log::info!("Loading credentials from {}", credentials_file.display());
        let client = load_client_secret(credentials_file)?;

        log::info!("Loading token from {}", token_file.display());
        let token: StoredToken = read_json(token_file)?;

        let access_token = match token.refresh_token.as_deref() {
            Some(refresh_token) => refresh_access_token(&http, &client, refresh_token).await?,
            None => token.access_token,
        };

        Ok(Self { http, access_token })
    }

    /// Wrap an already valid access token.
    pub fn from_access_token(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Start an authorized request.
    pub fn request(&self, method: reqwest::Method, url: reqwest::Url) -> reqwest::RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.access_token)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let raw = std::fs::read(path).map_err(|source| AuthError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| AuthError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret, AuthError> {
    let file: CredentialsFile = read_json(path)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| AuthError::NoClient(path.to_path_buf()))
}

async fn refresh_access_token(
    http: &reqwest::Client,
    client: &ClientSecret,
    refresh_token: &str,
) -> Result<String, AuthError> {
    let token_uri = client.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    log::debug!("Refreshing access token at {}", token_uri);

    let response = http
        .post(token_uri)
        .form(&[
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Refresh {
            status: status.as_u16(),
            body,
        });
    }

    let refreshed: RefreshResponse = response.json().await?;
    Ok(refreshed.access_token)
}
