//! Where analysis results end up.
//!
//! # Submodules
//!
//! - [`sheets`]: appends rows to the remote Google Sheet
//! - [`json`]: appends the same record to a local daily JSON-lines backup
//!
//! [`record`] drives both for one analyzed URL. The sheet is written first;
//! the backup is only written once the sheet append succeeded.

pub mod json;
pub mod sheets;

use crate::error::PipelineError;
use crate::models::{AnalysisResult, BackupRecord, SheetRow};
use chrono::{DateTime, Local};
use sheets::SheetsClient;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// What [`record`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub sheet_title: String,
    /// Whether the header row had to be written first.
    pub wrote_header: bool,
    pub backup_path: PathBuf,
}

/// Append the analysis of `url` to the sheet and to the local backup.
///
/// When the worksheet has no first row the fixed header is appended before
/// the data row.
///
/// # Arguments
///
/// * `sheets` - Authenticated client bound to the target spreadsheet
/// * `backup_dir` - Directory for the daily JSON-lines backup
/// * `url` - Page URL as given on the command line
/// * `analysis` - Parsed model reply
/// * `at` - Timestamp written to the row and used to pick the backup file
///
/// # Returns
///
/// A [`RecordOutcome`] naming the worksheet, whether a header was written,
/// and the backup file path.
///
/// # Errors
///
/// * [`PipelineError::Access`] if the service account cannot edit the sheet
/// * [`PipelineError::Sheets`] for any other Sheets API failure
/// * [`PipelineError::Backup`] if the backup file cannot be written; the
///   sheet row has already been appended at that point
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn record(
    sheets: &SheetsClient,
    backup_dir: &Path,
    url: &str,
    analysis: &AnalysisResult,
    at: DateTime<Local>,
) -> Result<RecordOutcome, PipelineError> {
    let sheet_title = sheets.worksheet_title().await?;

    let wrote_header = sheets.first_row(&sheet_title).await?.is_empty();
    if wrote_header {
        info!(sheet = %sheet_title, "Sheet has no header; writing it");
        sheets.append_row(&sheet_title, &SheetRow::header()).await?;
    }

    let row = SheetRow::new(url, analysis, at);
    sheets.append_row(&sheet_title, &row.to_values()).await?;
    info!(sheet = %sheet_title, timestamp = %row.timestamp, "Appended row");

    let backup_path = json::append_backup(backup_dir, &BackupRecord::from(&row), at.date_naive()).await?;

    Ok(RecordOutcome {
        sheet_title,
        wrote_header,
        backup_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::sheets::tests::mock_client;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            topic: "Kinh tế".into(),
            summary: "Giá tăng".into(),
            conclusion: "Cần điều chỉnh".into(),
        }
    }

    async fn mount_sheet(server: &MockServer, first_row: Value, expected_appends: u64) {
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "title": "Sheet1" } }]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-123/values/[^:]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_row))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-123/values/.+:append$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updates": {} })))
            .expect(expected_appends)
            .mount(server)
            .await;
    }

    async fn appended_rows(server: &MockServer) -> Vec<Vec<String>> {
        server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path().ends_with(":append"))
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                serde_json::from_value::<Vec<Vec<String>>>(body["values"].clone())
                    .unwrap()
                    .remove(0)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_sheet_gets_header_then_row() {
        let server = MockServer::start().await;
        mount_sheet(&server, json!({ "range": "Sheet1!A1:Z1", "majorDimension": "ROWS" }), 2).await;
        let client = mock_client(&server).await;
        let tmp = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 5, 6, 9, 15, 0).unwrap();

        let outcome = record(&client, tmp.path(), "https://example.com/a", &analysis(), at)
            .await
            .unwrap();

        assert!(outcome.wrote_header);
        assert_eq!(outcome.sheet_title, "Sheet1");
        let rows = appended_rows(&server).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], SheetRow::header());
        assert_eq!(
            rows[1],
            vec![
                "https://example.com/a",
                "Kinh tế",
                "Giá tăng",
                "Cần điều chỉnh",
                "2025-05-06 09:15:00"
            ]
        );

        assert_eq!(outcome.backup_path, tmp.path().join("backup_20250506.json"));
        let backup = std::fs::read_to_string(&outcome.backup_path).unwrap();
        let line: Value = serde_json::from_str(backup.trim_end()).unwrap();
        assert_eq!(line["url"], "https://example.com/a");
        assert_eq!(line["timestamp"], "2025-05-06 09:15:00");
        assert_eq!(line["analysis"]["summary"], "Giá tăng");
    }

    #[tokio::test]
    async fn test_existing_header_is_not_rewritten() {
        let server = MockServer::start().await;
        mount_sheet(
            &server,
            json!({ "values": [["URL", "Chủ đề", "Tóm tắt", "Kết luận", "Timestamp"]] }),
            1,
        )
        .await;
        let client = mock_client(&server).await;
        let tmp = tempfile::tempdir().unwrap();

        let outcome = record(&client, tmp.path(), "https://example.com/a", &analysis(), Local::now())
            .await
            .unwrap();

        assert!(!outcome.wrote_header);
        let rows = appended_rows(&server).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "https://example.com/a");
    }

    #[tokio::test]
    async fn test_failed_append_skips_backup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "title": "Sheet1" } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v4/spreadsheets/sheet-123/values/[^:]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [["URL"]] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":append$"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "The caller does not have permission", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;
        let client = mock_client(&server).await;
        let tmp = tempfile::tempdir().unwrap();

        let err = record(&client, tmp.path(), "https://example.com/a", &analysis(), Local::now())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Access { .. }));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
