//! Google Sheets backend (Sheets API v4).

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::a1::{quote_sheet_name, row_range};
use super::{RowUpdate, SourceError, SourceMetadata, TabularSource};
use crate::google::GoogleAuth;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
    #[serde(default)]
    pub frozen_row_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    /// `GRID` for cell sheets, `OBJECT` for chart sheets.
    #[serde(default)]
    pub sheet_type: Option<String>,
    /// Absent on chart sheets.
    #[serde(default)]
    pub grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ValueUpdate {
    range: String,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: [Vec<Option<String>>; 1],
}

/// One worksheet of a spreadsheet, addressed by title.
pub struct GoogleSheetSource {
    auth: GoogleAuth,
    spreadsheet_id: String,
    worksheet: String,
    properties: Option<SheetProperties>,
    column_count: usize,
}

impl GoogleSheetSource {
    pub fn new(
        auth: GoogleAuth,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            properties: None,
            column_count: 0,
        }
    }

    fn properties(&self) -> Result<&SheetProperties, SourceError> {
        self.properties.as_ref().ok_or(SourceError::NotLoaded)
    }

    fn grid(&self) -> Result<&GridProperties, SourceError> {
        self.properties()?
            .grid_properties
            .as_ref()
            .ok_or_else(|| SourceError::NotAGrid(self.worksheet.clone()))
    }

    fn spreadsheet_url(&self) -> Result<Url, SourceError> {
        let mut url = Url::parse(SHEETS_API).map_err(|_| SourceError::InvalidUrl)?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl)?
            .pop_if_empty()
            .push(&self.spreadsheet_id);
        Ok(url)
    }

    fn values_url(&self, range: &str) -> Result<Url, SourceError> {
        let mut url = self.spreadsheet_url()?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl)?
            .push("values")
            .push(range);
        Ok(url)
    }

    /// PUT target and body for a single-row update.
    fn row_update_request(
        &self,
        row: usize,
        columns: usize,
        changes: &[(usize, String)],
    ) -> Result<(Url, ValueUpdate), SourceError> {
        let range = row_range(&self.worksheet, row, columns);
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueUpdate {
            range,
            major_dimension: "ROWS",
            values: [sparse_row(columns, changes)],
        };
        Ok((url, body))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError> {
        log::debug!("Fetching range {}", range);
        let url = self.values_url(range)?;
        let range: ValueRange = self.send(self.auth.request(Method::GET, url)).await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }
}

/// Locate a worksheet by title.
fn find_worksheet(sheets: Vec<Sheet>, title: &str) -> Option<SheetProperties> {
    sheets
        .into_iter()
        .map(|s| s.properties)
        .find(|p| p.title == title)
}

/// Range holding every data row, or `None` when the grid has no room for any.
fn data_rows_range(worksheet: &str, row_count: usize) -> Option<String> {
    (row_count >= 2).then(|| format!("{}!2:{}", quote_sheet_name(worksheet), row_count))
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the sparse row sent to the API: untouched cells stay `None` and are skipped.
fn sparse_row(columns: usize, changes: &[(usize, String)]) -> Vec<Option<String>> {
    let width = changes
        .iter()
        .map(|(column, _)| column + 1)
        .max()
        .unwrap_or(0)
        .max(columns);
    let mut row = vec![None; width];
    for (column, value) in changes {
        row[*column] = Some(value.clone());
    }
    row
}

#[async_trait]
impl TabularSource for GoogleSheetSource {
    fn kind(&self) -> &'static str {
        "google_sheet"
    }

    async fn load(&mut self) -> Result<(), SourceError> {
        log::info!("Loading spreadsheet {}", self.spreadsheet_id);
        let mut url = self.spreadsheet_url()?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let spreadsheet: Spreadsheet = self.send(self.auth.request(Method::GET, url)).await?;
        let properties = find_worksheet(spreadsheet.sheets, &self.worksheet)
            .ok_or_else(|| SourceError::WorksheetNotFound(self.worksheet.clone()))?;
        if properties.grid_properties.is_none() {
            return Err(SourceError::NotAGrid(properties.title));
        }
        log::info!(
            "Found worksheet '{}' (sheet id {})",
            properties.title,
            properties.sheet_id
        );

        self.properties = Some(properties);
        Ok(())
    }

    async fn metadata(&mut self) -> Result<SourceMetadata, SourceError> {
        let grid = self.grid()?.clone();
        let range = format!("{}!1:1", quote_sheet_name(&self.worksheet));
        let header = self
            .get_values(&range)
            .await?
            .into_iter()
            .next()
            .ok_or(SourceError::MissingHeader)?;

        self.column_count = grid.column_count.max(header.len());
        Ok(SourceMetadata {
            column_count: grid.column_count,
            row_count: grid.row_count,
            frozen_rows: grid.frozen_row_count,
            header,
        })
    }

    async fn read_rows(&mut self) -> Result<Vec<Vec<String>>, SourceError> {
        let row_count = self.grid()?.row_count;
        match data_rows_range(&self.worksheet, row_count) {
            Some(range) => self.get_values(&range).await,
            None => Ok(Vec::new()),
        }
    }

    async fn save(&mut self, update: RowUpdate<'_>) -> Result<(), SourceError> {
        let columns = self.column_count.max(update.header.len());
        let (url, body) = self.row_update_request(update.row, columns, update.changes)?;
        log::debug!("Updating range {}", body.range);
        let _: Value = self
            .send(self.auth.request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> GoogleSheetSource {
        GoogleSheetSource::new(
            GoogleAuth::from_access_token(reqwest::Client::new(), "token"),
            "sheet-123",
            "Class of 2019",
        )
    }

    #[test]
    fn test_values_url_escapes_range() {
        let url = source().values_url("'Class of 2019'!A2:C2").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Class%20of%202019'!A2:C2"
        );
    }

    #[test]
    fn test_find_worksheet_accepts_sheet_id_zero() {
        let spreadsheet: Spreadsheet = serde_json::from_str(
            r#"{"sheets":[
                {"properties":{"sheetId":0,"title":"Sheet1","gridProperties":{"rowCount":10,"columnCount":3}}},
                {"properties":{"sheetId":42,"title":"Other","gridProperties":{"rowCount":1,"columnCount":1,"frozenRowCount":1}}}
            ]}"#,
        )
        .unwrap();

        let found = find_worksheet(spreadsheet.sheets, "Sheet1").unwrap();
        assert_eq!(found.sheet_id, 0);
        let grid = found.grid_properties.unwrap();
        assert_eq!(grid.column_count, 3);
        assert_eq!(grid.frozen_row_count, None);
    }

    #[test]
    fn test_chart_sheets_do_not_break_lookup() {
        let spreadsheet: Spreadsheet = serde_json::from_str(
            r#"{"sheets":[
                {"properties":{"sheetId":0,"title":"Sheet1","sheetType":"GRID","gridProperties":{"rowCount":5,"columnCount":3}}},
                {"properties":{"sheetId":7,"title":"Chart1","sheetType":"OBJECT"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(spreadsheet.sheets.len(), 2);

        let chart = &spreadsheet.sheets[1].properties;
        assert_eq!(chart.sheet_type.as_deref(), Some("OBJECT"));
        assert!(chart.grid_properties.is_none());

        let found = find_worksheet(spreadsheet.sheets, "Sheet1").unwrap();
        assert_eq!(found.grid_properties.unwrap().row_count, 5);
    }

    #[test]
    fn test_chart_sheet_has_no_grid() {
        let mut source = source();
        source.properties = Some(SheetProperties {
            sheet_id: 7,
            title: "Class of 2019".to_string(),
            sheet_type: Some("OBJECT".to_string()),
            grid_properties: None,
        });
        assert!(matches!(source.grid(), Err(SourceError::NotAGrid(ref t)) if t == "Class of 2019"));
    }

    #[test]
    fn test_data_rows_range() {
        assert_eq!(
            data_rows_range("Class of 2019", 10).as_deref(),
            Some("'Class of 2019'!2:10")
        );
        assert_eq!(data_rows_range("Sheet1", 2).as_deref(), Some("Sheet1!2:2"));
        assert_eq!(data_rows_range("Sheet1", 1), None);
    }

    #[test]
    fn test_row_update_request() {
        let changes = [(2, "https://docs.google.com/open?id=1".to_string())];
        let (url, body) = source().row_update_request(4, 3, &changes).unwrap();

        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Class%20of%202019'!A6:C6?valueInputOption=RAW"
        );
        assert_eq!(body.range, "'Class of 2019'!A6:C6");
        let last_segment = url.path_segments().unwrap().last().unwrap();
        assert_eq!(last_segment.replace("%20", " "), body.range);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["majorDimension"], "ROWS");
        assert_eq!(
            json["values"],
            serde_json::json!([[null, null, "https://docs.google.com/open?id=1"]])
        );
    }

    #[test]
    fn test_find_worksheet_missing() {
        let spreadsheet: Spreadsheet = serde_json::from_str(r#"{"sheets":[]}"#).unwrap();
        assert!(find_worksheet(spreadsheet.sheets, "Sheet1").is_none());
    }

    #[test]
    fn test_value_range_without_values() {
        let range: ValueRange = serde_json::from_str(r#"{"range":"A2:C10"}"#).unwrap();
        assert!(range.values.is_empty());
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Value::String("Ada".into())), "Ada");
        assert_eq!(cell_to_string(&serde_json::json!(3)), "3");
        assert_eq!(cell_to_string(&Value::Null), "");
    }

    #[test]
    fn test_sparse_row_only_sets_changes() {
        let row = sparse_row(4, &[(2, "https://docs.google.com/open?id=1".to_string())]);
        assert_eq!(
            row,
            vec![
                None,
                None,
                Some("https://docs.google.com/open?id=1".to_string()),
                None
            ]
        );

        let body = serde_json::to_value(ValueUpdate {
            range: "Sheet1!A2:D2".to_string(),
            major_dimension: "ROWS",
            values: [row],
        })
        .unwrap();
        assert_eq!(body["values"][0][0], Value::Null);
    }

    #[tokio::test]
    async fn test_metadata_before_load() {
        let mut source = source();
        assert!(matches!(
            source.metadata().await.unwrap_err(),
            SourceError::NotLoaded
        ));
    }
}
