//! Headless Chrome renderer.
//!
//! Drives a Chrome/Chromium executable in headless mode, the same way for every record:
//! the navigated document is copied into a private workspace with print rules for page
//! size, orientation and backgrounds, then printed to PDF.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

use super::{page_size_css, ConversionError, DocumentRenderer, PdfOptions};

const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

const LAUNCH_ARGS: [&str; 8] = [
    "--headless",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--no-pdf-header-footer",
    "--print-to-pdf-no-header",
    "--run-all-compositor-stages-before-draw",
    "--virtual-time-budget=10000",
];

const MAX_STDERR: usize = 2000;

lazy_static! {
    static ref HEAD_TAG: Regex = Regex::new(r"(?i)<head(\s[^>]*)?>").expect("head pattern is valid");
}

#[derive(Debug)]
struct LoadedDocument {
    uri: String,
    local: Option<PathBuf>,
}

/// A headless browser page backed by a Chrome executable.
#[derive(Debug)]
pub struct ChromeRenderer {
    binary: String,
    workspace: Option<TempDir>,
    current: Option<LoadedDocument>,
    exported: usize,
}

impl ChromeRenderer {
    /// Find a working browser and prepare a private profile/workspace directory.
    pub async fn launch(binary: Option<&Path>) -> Result<Self, ConversionError> {
        let candidates: Vec<String> = match binary {
            Some(path) => vec![path.to_string_lossy().into_owned()],
            None => BROWSER_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        };

        let mut found = None;
        for candidate in &candidates {
            match Command::new(candidate).arg("--version").output().await {
                Ok(output) if output.status.success() => {
                    log::info!(
                        "Using browser {} ({})",
                        candidate,
                        String::from_utf8_lossy(&output.stdout).trim()
                    );
                    found = Some(candidate.clone());
                    break;
                }
                Ok(output) => log::debug!("{} --version exited with {}", candidate, output.status),
                Err(e) => log::debug!("{} is not usable: {}", candidate, e),
            }
        }
        let binary = found.ok_or_else(|| ConversionError::BrowserNotFound(candidates.join(", ")))?;

        let workspace = tempfile::Builder::new()
            .prefix("certgen-chrome-")
            .tempdir()
            .map_err(ConversionError::Workspace)?;
        log::debug!("Renderer workspace at {}", workspace.path().display());

        Ok(Self {
            binary,
            workspace: Some(workspace),
            current: None,
            exported: 0,
        })
    }

    fn workspace(&self) -> Result<&Path, ConversionError> {
        self.workspace
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| ConversionError::Load("renderer is closed".to_string()))
    }

    /// Write the print copy of a local document and return its URL.
    async fn prepare_print_copy(
        &mut self,
        local: &Path,
        options: &PdfOptions,
    ) -> Result<String, ConversionError> {
        let html = tokio::fs::read_to_string(local)
            .await
            .map_err(|e| ConversionError::Load(format!("{}: {}", local.display(), e)))?;
        let base = local
            .parent()
            .and_then(|dir| Url::from_directory_path(dir).ok())
            .ok_or_else(|| ConversionError::Load(local.display().to_string()))?;

        let printable = inject_print_head(&html, base.as_str(), &print_stylesheet(options));

        self.exported += 1;
        let copy = self.workspace()?.join(format!("print-{}.html", self.exported));
        tokio::fs::write(&copy, printable)
            .await
            .map_err(ConversionError::Workspace)?;

        Url::from_file_path(&copy)
            .map(|u| u.to_string())
            .map_err(|_| ConversionError::Load(copy.display().to_string()))
    }
}

/// Print rules for page size, orientation and backgrounds.
pub fn print_stylesheet(options: &PdfOptions) -> String {
    let mut css = String::new();
    if let Some(size) = page_size_css(options.format.as_deref(), options.landscape) {
        css.push_str(&format!("@page {{ size: {}; }}\n", size));
    }
    if options.print_background {
        css.push_str("html, body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\n");
    }
    css
}

/// Insert a `<base>` and a `<style>` block right after `<head>`, or at the top if there is none.
pub fn inject_print_head(html: &str, base_href: &str, css: &str) -> String {
    let snippet = format!(
        "<base href=\"{}\"><style media=\"print\">{}</style>",
        base_href.replace('"', "%22"),
        css
    );

    match HEAD_TAG.find(html) {
        Some(head) => {
            let mut out = String::with_capacity(html.len() + snippet.len());
            out.push_str(&html[..head.end()]);
            out.push_str(&snippet);
            out.push_str(&html[head.end()..]);
            out
        }
        None => format!("{}{}", snippet, html),
    }
}

fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let end: String = text.chars().skip(count - max).collect();
    format!("...{}", end)
}

#[async_trait]
impl DocumentRenderer for ChromeRenderer {
    async fn navigate(&mut self, uri: &str) -> Result<(), ConversionError> {
        let parsed = Url::parse(uri).map_err(|e| ConversionError::Load(format!("{}: {}", uri, e)))?;

        let local = if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| ConversionError::Load(uri.to_string()))?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(ConversionError::Load(format!("{} does not exist", path.display())));
            }
            Some(path)
        } else {
            None
        };

        log::debug!("Renderer navigated to {}", uri);
        self.current = Some(LoadedDocument {
            uri: uri.to_string(),
            local,
        });
        Ok(())
    }

    async fn export_pdf(&mut self, options: &PdfOptions) -> Result<(), ConversionError> {
        let (uri, local) = match &self.current {
            Some(doc) => (doc.uri.clone(), doc.local.clone()),
            None => return Err(ConversionError::NothingLoaded),
        };
        let target = match local {
            Some(path) => self.prepare_print_copy(&path, options).await?,
            None => uri,
        };
        let profile = self.workspace()?.join("profile");

        log::debug!("Printing {} to {}", target, options.path.display());
        let output = Command::new(&self.binary)
            .args(LAUNCH_ARGS)
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg(format!("--print-to-pdf={}", options.path.display()))
            .arg(&target)
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConversionError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), MAX_STDERR),
            });
        }
        if !tokio::fs::try_exists(&options.path).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(options.path.clone()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConversionError> {
        self.current = None;
        if let Some(workspace) = self.workspace.take() {
            log::debug!("Closing renderer workspace {}", workspace.path().display());
            workspace.close().map_err(ConversionError::Workspace)?;
        }
        Ok(())
    }
}
