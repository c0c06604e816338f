//! Document rendering.
//!
//! A [`DocumentRenderer`] is a single browser page: it is opened once per run, pointed at
//! each intermediary document in turn and asked to export it. Callers own the handle and
//! must [`close`](DocumentRenderer::close) it when the run ends.

pub mod chrome;

pub use chrome::ChromeRenderer;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to write intermediary document {}: {source}", path.display())]
    WriteIntermediary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable browser found (tried: {0})")]
    BrowserNotFound(String),
    #[error("failed to prepare renderer workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("cannot load {0}")]
    Load(String),
    #[error("export requested before any document was loaded")]
    NothingLoaded,
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("browser exited with status {code}: {stderr}")]
    Exit { code: i32, stderr: String },
    #[error("browser reported success but {} was not written", .0.display())]
    MissingOutput(PathBuf),
}

/// PDF export options.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub path: PathBuf,
    pub format: Option<String>,
    pub landscape: Option<bool>,
    pub print_background: bool,
}

impl PdfOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            landscape: None,
            print_background: true,
        }
    }
}

/// Headless page used to turn documents into PDFs.
#[async_trait]
pub trait DocumentRenderer: Send {
    /// Load a document, usually a `file://` URL.
    async fn navigate(&mut self, uri: &str) -> Result<(), ConversionError>;

    /// Export the loaded document as PDF.
    async fn export_pdf(&mut self, options: &PdfOptions) -> Result<(), ConversionError>;

    /// Release the page and everything behind it.
    async fn close(&mut self) -> Result<(), ConversionError>;
}

/// CSS `@page` size for a page format and orientation.
pub fn page_size_css(format: Option<&str>, landscape: Option<bool>) -> Option<String> {
    let orientation = match landscape {
        Some(true) => Some("landscape"),
        Some(false) => Some("portrait"),
        None => None,
    };

    let size = format.map(|f| match f.to_ascii_lowercase().as_str() {
        "letter" => "letter".to_string(),
        "legal" => "legal".to_string(),
        "ledger" => "ledger".to_string(),
        "tabloid" => "11in 17in".to_string(),
        "a0" | "a1" | "a2" | "a3" | "a4" | "a5" | "a6" => f.to_ascii_uppercase(),
        _ => f.to_string(),
    });

    match (size, orientation) {
        (Some(size), Some(o)) => Some(match size.split_once(' ') {
            Some((width, height)) if o == "landscape" => format!("{} {}", height, width),
            Some(_) => size.clone(),
            None => format!("{} {}", size, o),
        }),
        (Some(size), None) => Some(size),
        (None, Some(o)) => Some(o.to_string()),
        (None, None) => None,
    }
}
