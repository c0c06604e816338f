//! CSV file backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{RowUpdate, SourceError, SourceMetadata, TabularSource};

/// Table stored as a comma-separated file on local disk.
///
/// Saves rewrite the whole file from the store's snapshot, header first.
pub struct CsvFileSource {
    path: PathBuf,
    rows: Option<Vec<Vec<String>>>,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn loaded(&self) -> Result<&Vec<Vec<String>>, SourceError> {
        self.rows.as_ref().ok_or(SourceError::NotLoaded)
    }
}

/// Parse CSV bytes into rows. Rows may have differing lengths.
pub fn parse_csv(raw: &[u8]) -> Result<Vec<Vec<String>>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .flexible(true)
        .from_reader(raw);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Serialize a header and data rows back to CSV bytes.
pub fn write_csv(header: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, SourceError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| SourceError::Csv(csv::Error::from(e.into_error())))
}

#[async_trait]
impl TabularSource for CsvFileSource {
    fn kind(&self) -> &'static str {
        "csv"
    }

    async fn load(&mut self) -> Result<(), SourceError> {
        log::info!("Loading CSV file {}", self.path.display());
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;

        let rows = parse_csv(&raw)?;
        if rows.is_empty() {
            return Err(SourceError::MissingHeader);
        }
        log::debug!("Parsed {} CSV lines", rows.len());

        self.rows = Some(rows);
        Ok(())
    }

    async fn metadata(&mut self) -> Result<SourceMetadata, SourceError> {
        let rows = self.loaded()?;
        let header = rows.first().cloned().ok_or(SourceError::MissingHeader)?;

        Ok(SourceMetadata {
            column_count: header.len(),
            row_count: rows.len() - 1,
            frozen_rows: None,
            header,
        })
    }

    async fn read_rows(&mut self) -> Result<Vec<Vec<String>>, SourceError> {
        let rows = self.loaded()?;
        Ok(rows.iter().skip(1).cloned().collect())
    }

    async fn save(&mut self, update: RowUpdate<'_>) -> Result<(), SourceError> {
        let bytes = write_csv(update.header, update.rows)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| SourceError::Write {
                path: self.path.clone(),
                source,
            })?;
        log::debug!(
            "Rewrote {} after updating row #{}",
            self.path.display(),
            update.row
        );

        let mut snapshot = Vec::with_capacity(update.rows.len() + 1);
        snapshot.push(update.header.to_vec());
        snapshot.extend(update.rows.iter().cloned());
        self.rows = Some(snapshot);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_csv_ragged_rows() {
        let rows = parse_csv(b"Name,Template,File\nAda,greeting\n\"Lovelace, A\",,x\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["Ada", "greeting"]);
        assert_eq!(rows[2][0], "Lovelace, A");
    }

    #[test]
    fn test_write_csv_quotes_commas() {
        let header = vec!["Name".to_string(), "File".to_string()];
        let rows = vec![vec!["Lovelace, A".to_string(), String::new()]];
        let bytes = write_csv(&header, &rows).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "Name,File\n\"Lovelace, A\",\n");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = CsvFileSource::new(dir.path().join("missing.csv"));
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }

    #[tokio::test]
    async fn test_empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        let mut source = CsvFileSource::new(&path);
        assert!(matches!(
            source.load().await.unwrap_err(),
            SourceError::MissingHeader
        ));
    }

    #[tokio::test]
    async fn test_metadata_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "Name,File\nAda,\nGrace,done.pdf\n").unwrap();

        let mut source = CsvFileSource::new(&path);
        source.load().await.unwrap();

        let meta = source.metadata().await.unwrap();
        assert_eq!(meta.column_count, 2);
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.header, vec!["Name", "File"]);

        let rows = source.read_rows().await.unwrap();
        assert_eq!(rows[1], vec!["Grace", "done.pdf"]);
    }

    #[tokio::test]
    async fn test_save_rewrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        fs::write(&path, "Name,File\nAda,\nGrace,\n").unwrap();

        let mut source = CsvFileSource::new(&path);
        source.load().await.unwrap();

        let header = vec!["Name".to_string(), "File".to_string()];
        let rows = vec![
            vec!["Ada".to_string(), "ada.pdf".to_string()],
            vec!["Grace".to_string(), String::new()],
        ];
        source
            .save(RowUpdate {
                row: 0,
                changes: &[(1, "ada.pdf".to_string())],
                header: &header,
                rows: &rows,
            })
            .await
            .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Name,File\nAda,ada.pdf\nGrace,\n");
    }
}
