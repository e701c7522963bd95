//! Command-line interface definitions.
//!
//! Everything except the page URL can come from the environment (or a `.env`
//! file loaded before parsing), so a typical run only passes the URL.

use crate::config::ModelKind;
use clap::Parser;
use std::path::PathBuf;

/// Analyze one web article with an LLM and append the result to a Google Sheet.
///
/// # Examples
///
/// ```sh
/// # Credentials and sheet id taken from the environment / .env
/// page_digest https://vnexpress.net/some-article.html
///
/// # Use OpenAI instead of OpenRouter and keep backups elsewhere
/// page_digest --model gpt3.5 --backup-dir ./backups https://example.com/post
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of the page to analyze
    pub url: String,

    /// Model used for the analysis
    #[arg(short, long, value_enum, default_value_t = ModelKind::Deepseek)]
    pub model: ModelKind,

    /// OpenRouter API key (required for `deepseek`)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Option<String>,

    /// OpenAI API key (required for `gpt3.5`)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Path to the Google service-account JSON key
    #[arg(long, env = "GOOGLE_SHEETS_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Id of the target spreadsheet
    #[arg(long, env = "GOOGLE_SHEETS_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    /// Directory for the daily JSON backup log
    #[arg(short, long, default_value = ".")]
    pub backup_dir: PathBuf,

    /// Optional YAML file overriding model settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
