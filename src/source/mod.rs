//! Tabular source adapters.
//!
//! Every backend exposes the same small contract: load the table, describe it, hand back the
//! data rows, and persist a row update. All record bookkeeping lives in
//! [`crate::records::RecordStore`]; adapters only move cells in and out of their backend.
//!
//! - `csv_file` - a local CSV file, rewritten in full on every save
//! - `google_sheet` - a worksheet of a Google Sheets spreadsheet, updated one row at a time

pub mod a1;
pub mod csv_file;
pub mod google_sheet;

pub use csv_file::CsvFileSource;
pub use google_sheet::GoogleSheetSource;

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by tabular backends.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("table has no header row")]
    MissingHeader,
    #[error("worksheet '{0}' not found in spreadsheet")]
    WorksheetNotFound(String),
    #[error("worksheet '{0}' is not a grid of cells")]
    NotAGrid(String),
    #[error("spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid spreadsheet URL")]
    InvalidUrl,
    #[error("source used before load()")]
    NotLoaded,
    #[error("row {0} was never loaded")]
    UnknownRow(usize),
}

/// Shape of a loaded table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub column_count: usize,
    pub row_count: usize,
    pub frozen_rows: Option<usize>,
    pub header: Vec<String>,
}

/// A single-row write handed to an adapter.
///
/// `changes` holds only the cells that actually changed, addressed by column position.
/// `header` and `rows` are the store's full positional snapshot for adapters that rewrite
/// the whole table.
#[derive(Debug)]
pub struct RowUpdate<'a> {
    pub row: usize,
    pub changes: &'a [(usize, String)],
    pub header: &'a [String],
    pub rows: &'a [Vec<String>],
}

/// Backend-specific access to a table.
#[async_trait]
pub trait TabularSource: Send {
    /// Short backend label used in logs.
    fn kind(&self) -> &'static str;

    /// Fetch the table from the backend.
    async fn load(&mut self) -> Result<(), SourceError>;

    /// Describe the loaded table, header row included.
    async fn metadata(&mut self) -> Result<SourceMetadata, SourceError>;

    /// Data rows (everything after the header), in table order.
    async fn read_rows(&mut self) -> Result<Vec<Vec<String>>, SourceError>;

    /// Persist one row update.
    async fn save(&mut self, update: RowUpdate<'_>) -> Result<(), SourceError>;
}
