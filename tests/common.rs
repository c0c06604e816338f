#![allow(dead_code)]

use async_trait::async_trait;
use certgen::pipeline::{PipelineOptions, RenderPipeline};
use certgen::render::{ConversionError, DocumentRenderer, PdfOptions};
use certgen::source::csv_file::parse_csv;
use certgen::source::CsvFileSource;
use certgen::storage::{artifact_file_name, DocumentStore, UploadError};
use certgen::templates::{CatalogFolders, TemplateCatalog};
use certgen::{ControlColumns, Orchestrator, RecordStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

/// What a mock renderer saw during a run.
#[derive(Debug, Default)]
pub struct RendererLog {
    /// (uri, document contents at load time)
    pub loaded: Vec<(String, String)>,
    pub exported: Vec<PdfOptions>,
    pub closed: bool,
}

/// Renderer that writes a placeholder PDF instead of driving a browser.
///
/// A failing renderer leaves a truncated PDF behind, like a browser killed mid-print.
pub struct MockRenderer {
    log: Arc<Mutex<RendererLog>>,
    fail_export: bool,
}

impl MockRenderer {
    pub fn new() -> (Self, Arc<Mutex<RendererLog>>) {
        let log = Arc::new(Mutex::new(RendererLog::default()));
        (
            Self {
                log: log.clone(),
                fail_export: false,
            },
            log,
        )
    }

    pub fn failing() -> (Self, Arc<Mutex<RendererLog>>) {
        let (mut renderer, log) = Self::new();
        renderer.fail_export = true;
        (renderer, log)
    }
}

#[async_trait]
impl DocumentRenderer for MockRenderer {
    async fn navigate(&mut self, uri: &str) -> Result<(), ConversionError> {
        let path = reqwest::Url::parse(uri)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| ConversionError::Load(uri.to_string()))?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConversionError::Load(e.to_string()))?;
        self.log.lock().await.loaded.push((uri.to_string(), contents));
        Ok(())
    }

    async fn export_pdf(&mut self, options: &PdfOptions) -> Result<(), ConversionError> {
        if self.fail_export {
            tokio::fs::write(&options.path, b"%PDF-1")
                .await
                .map_err(ConversionError::Workspace)?;
            return Err(ConversionError::Exit {
                code: 1,
                stderr: "simulated crash".to_string(),
            });
        }
        tokio::fs::write(&options.path, b"%PDF-1.4\n")
            .await
            .map_err(ConversionError::Workspace)?;
        self.log.lock().await.exported.push(options.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConversionError> {
        self.log.lock().await.closed = true;
        Ok(())
    }
}

/// In-memory document store.
#[derive(Clone, Default)]
pub struct MockDocumentStore {
    pub uploads: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let name = artifact_file_name(path)?;
        tokio::fs::metadata(path)
            .await
            .map_err(|source| UploadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.uploads.lock().await.push(name.clone());
        Ok(format!("https://docs.example.com/open?id={}", name))
    }
}

/// A scratch directory with a CSV table and a template tree.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.path().join("people.csv")
    }

    pub fn write_csv(&self, contents: &str) {
        std::fs::write(self.csv_path(), contents).unwrap();
    }

    pub fn read_csv(&self) -> Vec<Vec<String>> {
        parse_csv(&std::fs::read(self.csv_path()).unwrap()).unwrap()
    }

    pub fn write_template(&self, path: &str, slug: &str, body: &str, settings: &str) {
        let dir = self.dir.path().join("templates").join(path);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.html", slug)), body).unwrap();
        std::fs::write(dir.join("settings.yaml"), settings).unwrap();
    }

    pub fn intermediaries(&self) -> PathBuf {
        self.dir.path().join("intermediaries")
    }

    pub fn results(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub async fn store(&self) -> RecordStore {
        let mut store = RecordStore::new(
            Box::new(CsvFileSource::new(self.csv_path())),
            ControlColumns {
                template_header: "Template".to_string(),
                file_header: "File".to_string(),
            },
        );
        store.initialize().await.unwrap();
        store
    }

    pub fn pipeline(
        &self,
        uploader: Option<Arc<dyn DocumentStore>>,
        options: PipelineOptions,
    ) -> RenderPipeline {
        let catalog = TemplateCatalog::new(CatalogFolders {
            template_folder: self.dir.path().join("templates"),
            intermediary_folder: self.intermediaries(),
            output_folder: self.results(),
        });
        RenderPipeline::new(catalog, uploader, options)
    }

    /// Orchestrator over a freshly loaded store, like a new run of the program.
    pub async fn orchestrator(
        &self,
        renderer: MockRenderer,
        uploader: Option<Arc<dyn DocumentStore>>,
        options: PipelineOptions,
        replace: bool,
    ) -> Orchestrator {
        Orchestrator::new(
            self.store().await,
            self.pipeline(uploader, options),
            Box::new(renderer),
            replace,
        )
    }
}

/// Defaults of a normal run without uploads.
pub fn local_options() -> PipelineOptions {
    PipelineOptions {
        default_template: None,
        change: true,
        preserve_intermediary: false,
        preserve_output: true,
    }
}

pub fn greeting_fixture(csv: &str) -> Fixture {
    let fixture = Fixture::new();
    fixture.write_csv(csv);
    fixture.write_template(
        "",
        "greeting",
        "<html><body><p>Hello {{ Name }}</p></body></html>",
        "file_name: \"{{ Name }}\"\n",
    );
    fixture
}
