//! Run-level errors.
//!
//! Every variant is fatal: the run stops at the first error instead of skipping the record,
//! so the table is never left half updated behind a run that kept going.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::google::AuthError;
use crate::render::ConversionError;
use crate::source::SourceError;
use crate::storage::UploadError;
use crate::templates::TemplateError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("data source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("template '{name}' not found at {}", path.display())]
    TemplateNotFound { name: String, path: PathBuf },
    #[error("template '{name}' is invalid: {reason}")]
    TemplateInvalid { name: String, reason: String },
    #[error("record #{row} names no template and no default template is configured")]
    NoTemplate { row: usize },
    #[error("failed to render record #{row} with template '{template}': {source}")]
    Render {
        row: usize,
        template: String,
        #[source]
        source: tera::Error,
    },
    #[error("failed to convert record #{row}: {source}")]
    Conversion {
        row: usize,
        #[source]
        source: ConversionError,
    },
    #[error("renderer failure: {0}")]
    Renderer(#[source] ConversionError),
    #[error("failed to upload record #{row}: {source}")]
    Upload {
        row: usize,
        #[source]
        source: UploadError,
    },
    #[error("failed to save to the data source: {0}")]
    Persist(#[source] SourceError),
    #[error("failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<TemplateError> for PipelineError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound { name, path } => Self::TemplateNotFound { name, path },
            TemplateError::Invalid { name, reason } => Self::TemplateInvalid { name, reason },
        }
    }
}
