//! Run driver: walks the records in order and feeds each one through the pipeline.

use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::RenderPipeline;
use crate::records::RecordStore;
use crate::render::DocumentRenderer;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
}

pub struct Orchestrator {
    store: RecordStore,
    pipeline: RenderPipeline,
    renderer: Box<dyn DocumentRenderer>,
    replace: bool,
}

impl Orchestrator {
    /// The orchestrator owns the renderer for the whole run and closes it when done.
    pub fn new(
        store: RecordStore,
        pipeline: RenderPipeline,
        renderer: Box<dyn DocumentRenderer>,
        replace: bool,
    ) -> Self {
        Self {
            store,
            pipeline,
            renderer,
            replace,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// A record that already references a file is left alone unless replacing.
    pub fn should_skip(&self, row: usize) -> bool {
        !self.replace && self.store.file_reference(row).is_some()
    }

    /// Process every record in order, stopping at the first error.
    ///
    /// The renderer is closed before returning, on success and on failure.
    pub async fn run(mut self) -> Result<RunSummary, PipelineError> {
        let outcome = self.process_records().await;

        let closed = self.renderer.close().await.map_err(PipelineError::Renderer);
        match (outcome, closed) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                log::warn!("Renderer did not close cleanly: {}", close);
                Err(e)
            }
        }
    }

    async fn process_records(&mut self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        log::info!("Processing {} records", self.store.len());

        for row in 0..self.store.len() {
            if self.should_skip(row) {
                log::info!("Skipping record #{}: already generated", row);
                summary.skipped += 1;
                continue;
            }
            let Some(record) = self.store.get(row).cloned() else {
                continue;
            };

            log::info!("Processing record #{}", row);
            let artifact = self
                .pipeline
                .process(self.renderer.as_mut(), &record, &mut self.store)
                .await?;
            if let Some(reference) = artifact.reference() {
                log::info!("Record #{} done: {}", row, reference);
            }
            summary.processed += 1;
        }

        Ok(summary)
    }
}
