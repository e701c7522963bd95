//! Local JSON-lines backup of every appended row.
//!
//! One file per local date, one JSON object per line:
//! ```text
//! backup_dir/
//! ├── backup_20250506.json
//! └── backup_20250507.json
//! ```
//!
//! The file is only ever appended to; it is an audit trail independent of
//! the remote sheet.

use crate::error::PipelineError;
use crate::models::BackupRecord;
use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// `<dir>/backup_<YYYYMMDD>.json`
pub fn backup_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("backup_{}.json", date.format("%Y%m%d")))
}

/// Append `record` as one line to the backup file for `date`.
///
/// The file is created on first use.
///
/// # Arguments
///
/// * `dir` - Directory holding the daily backup files
/// * `record` - Row to persist
/// * `date` - Local date selecting the file name
///
/// # Returns
///
/// Path of the file that was appended to.
///
/// # Errors
///
/// Returns [`PipelineError::Backup`] if the file cannot be opened or written.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), %date))]
pub async fn append_backup(
    dir: &Path,
    record: &BackupRecord,
    date: NaiveDate,
) -> Result<PathBuf, PipelineError> {
    let path = backup_path(dir, date);
    let mut line = serde_json::to_string(record).map_err(io::Error::from)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;

    info!(path = %path.display(), "Wrote backup record");
    Ok(path)
}
