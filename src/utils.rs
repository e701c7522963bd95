//! Utility functions for URL validation, string truncation, and file system checks.

use crate::error::PipelineError;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Parse the page URL given on the command line.
///
/// Only absolute `http`/`https` URLs with a host are accepted.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidUrl`] for anything else.
pub fn parse_page_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim()).map_err(|e| PipelineError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PipelineError::InvalidUrl(format!(
                "{raw}: unsupported scheme `{other}`"
            )));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(PipelineError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// Keep at most `max` characters of `s`, never splitting a character.
///
/// Returns `None` when `s` already fits.
pub fn truncate_chars(s: &str, max: usize) -> Option<&str> {
    s.char_indices().nth(max).map(|(idx, _)| &s[..idx])
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match truncate_chars(s, max) {
        None => s.to_string(),
        Some(head) => format!("{}…(+{} bytes)", head, s.len() - head.len()),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
///
/// # Arguments
///
/// * `path` - Directory to check
///
/// # Errors
///
/// Returns [`PipelineError::Backup`] if the directory cannot be created or
/// written to.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
