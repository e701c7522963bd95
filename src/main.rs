//! # Page Digest
//!
//! Fetches one web page, extracts its readable article text, asks an LLM for
//! a topic, summary and conclusion, and appends the result as a row to a
//! Google Sheet with a local JSON-lines backup.
//!
//! ## Usage
//!
//! ```sh
//! page_digest https://vnexpress.net/some-article.html
//! ```
//!
//! ## Architecture
//!
//! One URL per run, every stage awaited in turn:
//! 1. **Fetching**: download the page, retrying transient failures
//! 2. **Extraction**: locate the article container and reduce it to text
//! 3. **Analysis**: send the text to the configured chat-completion model
//! 4. **Parsing**: recover the three labeled sections from the free-text reply
//! 5. **Output**: append the row to the sheet, then to the daily backup file
//!
//! Progress goes to stdout; structured logs go to stderr (`RUST_LOG`).

use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod parser;
mod retry;
mod scrapers;
mod utils;

use cli::Cli;
use config::AppConfig;
use error::PipelineError;
use outputs::sheets::{SHEETS_API_BASE, SheetsClient};
use retry::RetryPolicy;
use scrapers::extract::extract;
use scrapers::fetch::PageFetcher;
use utils::{ensure_writable_dir, parse_page_url, truncate_for_log};

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so RUST_LOG and the clap env fallbacks can come from it
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    match &dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file"),
        Err(e) => error!(error = %e, "Failed to load .env"),
    }

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            // usage errors go to stdout with the other messages
            print!("{e}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let start_time = std::time::Instant::now();
    info!(url = %args.url, model = %args.model, "page_digest starting up");

    match run(&args).await {
        Ok(()) => {
            info!(elapsed_ms = start_time.elapsed().as_millis(), "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, elapsed_ms = start_time.elapsed().as_millis(), "Execution failed");
            println!("\nError: {e}");
            if let Some(steps) = e.remediation() {
                println!("\n{steps}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Cli) -> Result<(), PipelineError> {
    let config = AppConfig::from_cli(args)?;
    let model = config.model(args.model)?;
    let url = parse_page_url(&args.url)?;
    let page_url = args.url.trim();

    // Early check: a run that cannot write its backup should fail before
    // spending a model call.
    ensure_writable_dir(&config.backup_dir).await?;

    // ---- Fetch & extract ----
    println!("Extracting content from {page_url}...");
    let html = PageFetcher::new(RetryPolicy::default())?.fetch(&url).await?;
    let content = extract(&html)?;
    println!("Extracted {} characters.", content.chars().count());

    // ---- Analyze ----
    println!("Analyzing content with {} ({})...", args.model, model.name);
    let reply = api::analyze(&model, &content, RetryPolicy::default()).await?;
    debug!(reply = %truncate_for_log(&reply, 300), "Raw model reply");
    println!("\nRaw model reply:\n{reply}");

    let analysis = parser::parse(&reply);
    let empty = analysis.empty_sections();
    if !empty.is_empty() {
        println!(
            "\nWarning: these sections are empty: {}",
            empty.iter().map(|s| s.key()).join(", ")
        );
    }

    // ---- Output ----
    println!("\nUpdating Google Sheet...");
    let sheets = SheetsClient::connect(&config.service_account, &config.spreadsheet_id, SHEETS_API_BASE).await?;
    let outcome = outputs::record(&sheets, &config.backup_dir, page_url, &analysis, Local::now()).await?;
    if outcome.wrote_header {
        println!("Added header row to sheet `{}`.", outcome.sheet_title);
    }
    println!("Backed up to {}", outcome.backup_path.display());

    println!("\nAnalysis result:");
    println!("Topic: {}", analysis.topic);
    println!("Summary: {}", analysis.summary);
    println!("Conclusion: {}", analysis.conclusion);
    println!(
        "\nGoogle Sheet updated: {} (sheet `{}`)",
        sheets.spreadsheet_url(),
        outcome.sheet_title
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::outputs::sheets::tests::write_service_account;
    use std::path::PathBuf;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cli(url: String, model: ModelKind, credentials_file: PathBuf, backup_dir: PathBuf) -> Cli {
        Cli {
            url,
            model,
            openrouter_api_key: Some("or-key".into()),
            openai_api_key: None,
            credentials_file: Some(credentials_file),
            spreadsheet_id: Some("sheet-123".into()),
            backup_dir,
            config: None,
        }
    }

    #[tokio::test]
    async fn test_missing_model_key_fails_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Body</p>"))
            .expect(0)
            .mount(&server)
            .await;
        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), &format!("{}/token", server.uri()));
        let args = cli(
            format!("{}/article", server.uri()),
            ModelKind::Gpt35,
            creds,
            tmp.path().to_path_buf(),
        );

        let err = run(&args).await.unwrap_err();

        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("OPENAI_API_KEY")));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), "https://oauth2.googleapis.com/token");
        let args = cli(
            "ftp://example.com/a".into(),
            ModelKind::Deepseek,
            creds,
            tmp.path().to_path_buf(),
        );

        let err = run(&args).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl(_)));
    }
}
