use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod google;
pub mod orchestrator;
pub mod pipeline;
pub mod records;
pub mod render;
pub mod source;
pub mod storage;
pub mod templates;

pub use crate::config::{Cli, DataBackend, Settings, SourceKind};
pub use crate::error::PipelineError;
pub use crate::orchestrator::{Orchestrator, RunSummary};
pub use crate::pipeline::{GeneratedArtifact, PipelineOptions, RenderPipeline};
pub use crate::records::{ControlColumns, RecordRow, RecordStore};

use crate::google::GoogleAuth;
use crate::render::{ChromeRenderer, DocumentRenderer};
use crate::source::{CsvFileSource, GoogleSheetSource, TabularSource};
use crate::storage::{DocumentStore, GoogleDriveStore};
use crate::templates::{CatalogFolders, TemplateCatalog};

const USER_AGENT: &str = concat!("certgen/", env!("CARGO_PKG_VERSION"));

/// Build the data source adapter for the selected backend.
pub fn build_source(
    backend: DataBackend,
    auth: Option<&GoogleAuth>,
) -> Result<Box<dyn TabularSource>, PipelineError> {
    match backend {
        DataBackend::Csv { path } => {
            log::info!("Reading records from {}", path.display());
            Ok(Box::new(CsvFileSource::new(path)))
        }
        DataBackend::GoogleSheet {
            spreadsheet_id,
            worksheet,
        } => {
            let auth = auth.cloned().ok_or(google::AuthError::NotLoaded)?;
            log::info!(
                "Reading records from spreadsheet {} ({})",
                spreadsheet_id,
                worksheet
            );
            Ok(Box::new(GoogleSheetSource::new(
                auth,
                spreadsheet_id,
                worksheet,
            )))
        }
    }
}

/// Wire every component for `settings` and process all records.
pub async fn execute(settings: &Settings) -> Result<RunSummary, PipelineError> {
    let backend = settings.backend()?;

    let auth = if settings.needs_google() {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(google::AuthError::Http)?;
        Some(GoogleAuth::initialize(http, &settings.credentials_file, &settings.token_file).await?)
    } else {
        None
    };

    let uploader: Option<Arc<dyn DocumentStore>> = match (&auth, settings.upload) {
        (Some(auth), true) => Some(Arc::new(GoogleDriveStore::new(
            auth.clone(),
            settings.google_folder_id.clone(),
        ))),
        _ => None,
    };

    let mut store = RecordStore::new(
        build_source(backend, auth.as_ref())?,
        ControlColumns {
            template_header: settings.template_header.clone(),
            file_header: settings.file_header.clone(),
        },
    );
    store.initialize().await?;

    let catalog = TemplateCatalog::new(CatalogFolders {
        template_folder: settings.template_folder.clone(),
        intermediary_folder: settings.intermediary_folder.clone(),
        output_folder: settings.output_folder.clone(),
    });
    let pipeline = RenderPipeline::new(
        catalog,
        uploader,
        PipelineOptions {
            default_template: settings.template.clone(),
            change: settings.change,
            preserve_intermediary: settings.preserve_intermediary,
            preserve_output: settings.preserve_output,
        },
    );

    let renderer: Box<dyn DocumentRenderer> = Box::new(
        ChromeRenderer::launch(settings.chrome_binary.as_deref())
            .await
            .map_err(PipelineError::Renderer)?,
    );

    Orchestrator::new(store, pipeline, renderer, settings.replace)
        .run()
        .await
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli).context("failed to load settings")?;
    log::debug!("Settings: {:?}", settings);

    let started = std::time::Instant::now();
    let summary = execute(&settings).await?;
    log::info!(
        "Done in {:.1?}: {} generated, {} skipped",
        started.elapsed(),
        summary.processed,
        summary.skipped
    );
    Ok(())
}
