//! Error taxonomy for the pipeline.
//!
//! Every stage returns [`PipelineError`]. `main` renders whichever variant
//! reaches it and turns it into a non-zero exit code; nothing is retried at
//! this level.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid credentials, ids, or config files.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Page fetch failed after every retry attempt.
    #[error("failed to fetch {url} after {attempts} attempts: {source}")]
    Network {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    /// Model endpoint failed or answered without a usable result.
    #[error("model {model} failed: {message}")]
    Upstream { model: String, message: String },

    #[error("extraction error: {0}")]
    Extraction(String),

    /// The service account cannot read or write the spreadsheet.
    #[error("service account {service_email} has no access to {spreadsheet_url}: {message}")]
    Access {
        service_email: String,
        spreadsheet_url: String,
        message: String,
    },

    /// Any other Google Sheets API failure, message kept verbatim.
    #[error("Google Sheets API error: {0}")]
    Sheets(String),

    #[error("failed to write backup log: {0}")]
    Backup(#[from] std::io::Error),
}

impl PipelineError {
    /// Steps the operator can take to fix an [`PipelineError::Access`] failure.
    pub fn remediation(&self) -> Option<String> {
        match self {
            PipelineError::Access {
                service_email,
                spreadsheet_url,
                ..
            } => Some(format!(
                "Service account e-mail: {service_email}\n\
                 To fix:\n\
                 1. Open the spreadsheet at {spreadsheet_url}\n\
                 2. Click Share in the top right corner\n\
                 3. Add the service account e-mail above with Editor access\n\
                 4. Run the program again"
            )),
            _ => None,
        }
    }
}
