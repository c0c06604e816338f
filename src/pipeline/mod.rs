//! Per-record render pipeline.
//!
//! One record goes through a fixed sequence of awaited steps:
//! bind, render, materialize, distribute, persist. Cleanup runs afterwards whatever
//! happened. The first failing step ends the record with its error; cleanup still runs.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PipelineError;
use crate::records::{RecordRow, RecordStore};
use crate::render::{ConversionError, DocumentRenderer, PdfOptions};
use crate::storage::DocumentStore;
use crate::templates::naming::output_file_name;
use crate::templates::{RenderContext, SystemNamespace, Template, TemplateCatalog};

const INTERMEDIARY_EXTENSION: &str = "html";
const OUTPUT_EXTENSION: &str = "pdf";

/// Run-wide switches for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Template used when a record does not name one.
    pub default_template: Option<String>,
    /// Write the file reference back to the data source.
    pub change: bool,
    pub preserve_intermediary: bool,
    pub preserve_output: bool,
}

/// Files and references produced for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedArtifact {
    pub intermediary: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub remote_url: Option<String>,
}

impl GeneratedArtifact {
    /// What gets written back to the table: the remote URL if uploaded, else the local path.
    pub fn reference(&self) -> Option<String> {
        self.remote_url
            .clone()
            .or_else(|| self.output.as_ref().map(|p| p.display().to_string()))
    }
}

/// A record bound to its template.
struct BoundRecord {
    row: usize,
    template: Arc<Template>,
    context: RenderContext,
}

/// Rendered document text and its sanitized base file name.
#[derive(Debug)]
struct RenderedDocument {
    contents: String,
    file_name: String,
}

pub struct RenderPipeline {
    catalog: TemplateCatalog,
    uploader: Option<Arc<dyn DocumentStore>>,
    options: PipelineOptions,
}

impl RenderPipeline {
    /// `uploader` of `None` keeps artifacts local.
    pub fn new(
        catalog: TemplateCatalog,
        uploader: Option<Arc<dyn DocumentStore>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            uploader,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Generate, distribute and record the artifact for one record.
    pub async fn process(
        &self,
        renderer: &mut dyn DocumentRenderer,
        record: &RecordRow,
        store: &mut RecordStore,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let mut artifact = GeneratedArtifact::default();

        let outcome = self.run_steps(renderer, record, store, &mut artifact).await;
        let cleanup = self.cleanup(&artifact).await;

        outcome?;
        cleanup?;
        Ok(artifact)
    }

    async fn run_steps(
        &self,
        renderer: &mut dyn DocumentRenderer,
        record: &RecordRow,
        store: &mut RecordStore,
        artifact: &mut GeneratedArtifact,
    ) -> Result<(), PipelineError> {
        let template_column = store.template_column().map(str::to_string);
        let bound = self.bind(record, template_column.as_deref()).await?;
        let rendered = self.render(&bound)?;
        self.materialize(renderer, &bound, &rendered, artifact)
            .await?;
        let reference = self.distribute(bound.row, artifact).await?;
        self.persist(store, bound.row, &reference).await
    }

    async fn bind(
        &self,
        record: &RecordRow,
        template_column: Option<&str>,
    ) -> Result<BoundRecord, PipelineError> {
        let name = template_column
            .and_then(|column| record.non_empty(column))
            .map(|name| name.trim().to_string())
            .or_else(|| self.options.default_template.clone())
            .ok_or(PipelineError::NoTemplate { row: record.index })?;

        let template = self.catalog.get(&name).await?;
        let system = SystemNamespace {
            path: template.base_path_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            settings: template.settings_value().clone(),
        };
        log::debug!("Record #{} bound to template '{}'", record.index, name);

        Ok(BoundRecord {
            row: record.index,
            context: RenderContext::new(record, system),
            template,
        })
    }

    fn render(&self, bound: &BoundRecord) -> Result<RenderedDocument, PipelineError> {
        let context = bound.context.to_tera();
        let render_error = |source| PipelineError::Render {
            row: bound.row,
            template: bound.template.name.clone(),
            source,
        };

        let contents = bound
            .template
            .render_contents(&context)
            .map_err(render_error)?;
        let raw_name = bound
            .template
            .render_file_name(&context)
            .map_err(render_error)?;
        let file_name = output_file_name(&raw_name, &format!("record-{}", bound.row));

        Ok(RenderedDocument {
            contents,
            file_name,
        })
    }

    async fn materialize(
        &self,
        renderer: &mut dyn DocumentRenderer,
        bound: &BoundRecord,
        rendered: &RenderedDocument,
        artifact: &mut GeneratedArtifact,
    ) -> Result<(), PipelineError> {
        let template = &bound.template;
        let conversion = |source| PipelineError::Conversion {
            row: bound.row,
            source,
        };

        let intermediary = template.intermediary_folder.join(format!(
            "{}.{}",
            rendered.file_name, INTERMEDIARY_EXTENSION
        ));
        let output = template
            .output_folder
            .join(format!("{}.{}", rendered.file_name, OUTPUT_EXTENSION));

        tokio::fs::write(&intermediary, &rendered.contents)
            .await
            .map_err(|source| {
                conversion(ConversionError::WriteIntermediary {
                    path: intermediary.clone(),
                    source,
                })
            })?;
        artifact.intermediary = Some(intermediary.clone());
        log::debug!("Wrote intermediary {}", intermediary.display());

        let uri = reqwest::Url::from_file_path(&intermediary)
            .map_err(|_| conversion(ConversionError::Load(intermediary.display().to_string())))?;
        renderer.navigate(uri.as_str()).await.map_err(conversion)?;

        let options = PdfOptions {
            path: output.clone(),
            format: template.settings.format.clone(),
            landscape: template.settings.landscape,
            print_background: true,
        };
        artifact.output = Some(output.clone());
        if let Err(e) = renderer.export_pdf(&options).await {
            // A failed export can leave a truncated file behind, whatever the retention flags.
            match tokio::fs::remove_file(&output).await {
                Ok(()) => log::debug!("Discarded partial output {}", output.display()),
                Err(gone) if gone.kind() == std::io::ErrorKind::NotFound => {}
                Err(other) => log::warn!(
                    "Could not discard partial output {}: {}",
                    output.display(),
                    other
                ),
            }
            artifact.output = None;
            return Err(conversion(e));
        }
        Ok(())
    }

    async fn distribute(
        &self,
        row: usize,
        artifact: &mut GeneratedArtifact,
    ) -> Result<String, PipelineError> {
        let output = artifact.output.clone().ok_or(PipelineError::Conversion {
            row,
            source: ConversionError::NothingLoaded,
        })?;

        if let Some(uploader) = &self.uploader {
            let url = uploader
                .upload(&output)
                .await
                .map_err(|source| PipelineError::Upload { row, source })?;
            artifact.remote_url = Some(url);
        }

        Ok(artifact
            .reference()
            .unwrap_or_else(|| output.display().to_string()))
    }

    async fn persist(
        &self,
        store: &mut RecordStore,
        row: usize,
        reference: &str,
    ) -> Result<(), PipelineError> {
        if !self.options.change {
            return Ok(());
        }
        if store.file_column().is_none() {
            log::debug!("No file column; not recording reference for row #{}", row);
            return Ok(());
        }
        store.save_file_reference(row, reference).await?;
        log::info!("Record #{} now references {}", row, reference);
        Ok(())
    }

    /// Delete what the retention flags do not keep. Every deletion is attempted; the first
    /// failure is reported.
    async fn cleanup(&self, artifact: &GeneratedArtifact) -> Result<(), PipelineError> {
        let mut disposable = Vec::with_capacity(2);
        if !self.options.preserve_intermediary {
            disposable.extend(artifact.intermediary.as_deref());
        }
        if !self.options.preserve_output {
            disposable.extend(artifact.output.as_deref());
        }

        let mut first_error = None;
        for path in disposable {
            if let Err(e) = remove_generated(path).await {
                log::warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Delete a generated file; one that is already gone is fine.
async fn remove_generated(path: &Path) -> Result<(), PipelineError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("{} was already removed", path.display());
            Ok(())
        }
        Err(source) => Err(PipelineError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
