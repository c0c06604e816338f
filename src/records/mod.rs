//! Backend-agnostic record access.
//!
//! [`RecordStore`] owns the loaded table in two parallel forms: positional value rows (the
//! write path back to the backend) and named [`RecordRow`]s (the read path for templates).
//! Every mutation goes through [`RecordStore::save`], which keeps both forms in step.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::source::{RowUpdate, SourceError, SourceMetadata, TabularSource};

/// Column name to column position, built once from the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderIndex {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Index a header row. Never fails; a repeated name resolves to its last occurrence.
    pub fn build(header: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(header.len());
        for (i, name) in header.iter().enumerate() {
            if let Some(previous) = positions.insert(name.clone(), i) {
                log::warn!(
                    "Duplicate header '{}' in columns {} and {}; using column {}",
                    name,
                    previous,
                    i,
                    i
                );
            }
        }

        Self {
            columns: header.to_vec(),
            positions,
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One data row exposed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordRow {
    /// Zero-based position among the data rows (the header is not counted).
    pub index: usize,
    pub fields: HashMap<String, String>,
}

impl RecordRow {
    /// Value of a field, `None` when the column does not exist.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Value of a field when it exists and is not blank.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }
}

/// Names of the optional control columns.
#[derive(Debug, Clone)]
pub struct ControlColumns {
    pub template_header: String,
    pub file_header: String,
}

/// Loaded table plus the adapter used to persist changes.
pub struct RecordStore {
    source: Box<dyn TabularSource>,
    columns: ControlColumns,
    metadata: Option<SourceMetadata>,
    index: HeaderIndex,
    values: Vec<Vec<String>>,
    records: Vec<RecordRow>,
}

impl RecordStore {
    pub fn new(source: Box<dyn TabularSource>, columns: ControlColumns) -> Self {
        Self {
            source,
            columns,
            metadata: None,
            index: HeaderIndex::default(),
            values: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Load the table and build records. Any backend failure is `SourceUnavailable`.
    pub async fn initialize(&mut self) -> Result<(), PipelineError> {
        self.load().await.map_err(PipelineError::SourceUnavailable)?;
        self.build_index();
        self.load_values()
            .await
            .map_err(PipelineError::SourceUnavailable)?;
        self.build_records();

        log::info!(
            "Data source ({}) loaded: {} columns, {} records",
            self.source.kind(),
            self.index.len(),
            self.records.len()
        );
        Ok(())
    }

    /// Fetch the table and its metadata from the backend.
    pub async fn load(&mut self) -> Result<(), SourceError> {
        self.source.load().await?;
        let metadata = self.source.metadata().await?;
        log::debug!("Source metadata: {:?}", metadata);
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Derive the header index from the loaded header row.
    pub fn build_index(&mut self) -> &HeaderIndex {
        let header = self
            .metadata
            .as_ref()
            .map(|m| m.header.as_slice())
            .unwrap_or_default();
        self.index = HeaderIndex::build(header);

        if !self.index.contains(&self.columns.template_header) {
            log::info!(
                "No '{}' column; every record uses the default template",
                self.columns.template_header
            );
        }
        if !self.index.contains(&self.columns.file_header) {
            log::info!(
                "No '{}' column; file references will not be tracked",
                self.columns.file_header
            );
        }
        &self.index
    }

    /// Fetch the data rows, padded to the header width.
    pub async fn load_values(&mut self) -> Result<(), SourceError> {
        let width = self.index.len();
        let mut values = self.source.read_rows().await?;
        for row in &mut values {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
        self.values = values;
        Ok(())
    }

    /// Zip every value row with the header into a named record.
    pub fn build_records(&mut self) -> &[RecordRow] {
        self.records = self
            .values
            .iter()
            .enumerate()
            .map(|(index, values)| RecordRow {
                index,
                fields: values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| Some((self.index.name_at(i)?.to_string(), v.clone())))
                    .collect(),
            })
            .collect();
        &self.records
    }

    /// Update the given fields of one row and persist the row through the adapter.
    ///
    /// A field whose name is not in the header only changes the named record; it has no
    /// column to be written to.
    pub async fn save(
        &mut self,
        row: usize,
        fields: &[(String, String)],
    ) -> Result<(), PipelineError> {
        if row >= self.records.len() {
            return Err(PipelineError::Persist(SourceError::UnknownRow(row)));
        }

        let mut changes = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            self.records[row].fields.insert(name.clone(), value.clone());
            match self.index.index_of(name) {
                Some(column) => {
                    self.values[row][column] = value.clone();
                    changes.push((column, value.clone()));
                }
                None => log::warn!(
                    "Column '{}' is not in the header; row #{} keeps it in memory only",
                    name,
                    row
                ),
            }
        }

        self.source
            .save(RowUpdate {
                row,
                changes: &changes,
                header: self.index.columns(),
                rows: &self.values,
            })
            .await
            .map_err(PipelineError::Persist)
    }

    /// Store a reference to a generated file in the file column.
    pub async fn save_file_reference(
        &mut self,
        row: usize,
        reference: &str,
    ) -> Result<(), PipelineError> {
        let column = self.columns.file_header.clone();
        self.save(row, &[(column, reference.to_string())]).await
    }

    pub fn records(&self) -> &[RecordRow] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&RecordRow> {
        self.records.get(row)
    }

    pub fn values(&self, row: usize) -> Option<&[String]> {
        self.values.get(row).map(Vec::as_slice)
    }

    pub fn index(&self) -> &HeaderIndex {
        &self.index
    }

    pub fn metadata(&self) -> Option<&SourceMetadata> {
        self.metadata.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The template column, when the header has one.
    pub fn template_column(&self) -> Option<&str> {
        let name = self.columns.template_header.as_str();
        self.index.contains(name).then_some(name)
    }

    /// The file reference column, when the header has one.
    pub fn file_column(&self) -> Option<&str> {
        let name = self.columns.file_header.as_str();
        self.index.contains(name).then_some(name)
    }

    /// Current file reference of a row, if the file column exists and the cell is not empty.
    ///
    /// Any content counts, whitespace included.
    pub fn file_reference(&self, row: usize) -> Option<&str> {
        let column = self.file_column()?;
        self.records
            .get(row)?
            .get(column)
            .filter(|v| !v.is_empty())
    }
}
