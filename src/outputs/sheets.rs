//! Google Sheets client authenticated with a service-account key.
//!
//! Authentication follows the OAuth 2.0 JWT-bearer flow: an RS256 assertion
//! signed with the key's private key is exchanged at the key's `token_uri`
//! for a short-lived bearer token. Only the handful of Sheets v4 calls the
//! sink needs are implemented.

use crate::error::PipelineError;
use crate::scrapers::fetch::REQUEST_TIMEOUT;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Title of the worksheet added when the spreadsheet has none.
pub const DEFAULT_SHEET_TITLE: &str = "Sheet1";

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key the client uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    /// Parse and validate a key. The private key must be a usable RSA PEM.
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let key: ServiceAccountKey = serde_json::from_str(raw)
            .map_err(|e| PipelineError::Config(format!("credentials file is not valid JSON: {e}")))?;
        if key.kind != "service_account" {
            return Err(PipelineError::Config(
                "credentials file is not a service account key".into(),
            ));
        }
        if key.client_email.trim().is_empty() {
            return Err(PipelineError::Config("credentials file has no client_email".into()));
        }
        key.encoding_key()?;
        Ok(key)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "credentials file not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read credentials file {}: {e}", path.display()))
        })?;
        let key = Self::from_json(&raw)?;
        info!(service_email = %key.client_email, "Loaded service account key");
        Ok(key)
    }

    fn encoding_key(&self) -> Result<EncodingKey, PipelineError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| PipelineError::Config(format!("credentials file has an invalid private_key: {e}")))
    }

    /// Signed JWT assertion valid for one hour from `now`.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, PipelineError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.encoding_key()?)
            .map_err(|e| PipelineError::Config(format!("failed to sign service account assertion: {e}")))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Authorized handle on one spreadsheet.
pub struct SheetsClient {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    service_email: String,
    access_token: String,
}

impl fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsClient")
            .field("base_url", &self.base_url)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("service_email", &self.service_email)
            .finish_non_exhaustive()
    }
}

impl SheetsClient {
    /// Exchange the key for an access token and bind to `spreadsheet_id`.
    ///
    /// # Arguments
    ///
    /// * `key` - Validated service-account key; its `token_uri` receives the
    ///   signed JWT assertion
    /// * `spreadsheet_id` - Id of the target spreadsheet
    /// * `base_url` - Sheets API root, [`SHEETS_API_BASE`] outside of tests
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the assertion cannot be signed
    /// or the token endpoint rejects it, and [`PipelineError::Sheets`] when
    /// the endpoint is unreachable.
    #[instrument(level = "info", skip_all, fields(%spreadsheet_id, service_email = %key.client_email))]
    pub async fn connect(
        key: &ServiceAccountKey,
        spreadsheet_id: &str,
        base_url: &str,
    ) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        let assertion = key.assertion(Utc::now())?;
        let resp = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::Sheets(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Token exchange rejected");
            return Err(PipelineError::Config(format!(
                "service account token exchange failed ({status}): {}",
                body.trim()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Sheets(format!("malformed token response: {e}")))?;
        info!("Authorized with Google Sheets API");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            service_email: key.client_email.clone(),
            access_token: token.access_token,
        })
    }

    /// Browser URL of the spreadsheet.
    pub fn spreadsheet_url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.spreadsheet_id)
    }

    fn api_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id)
        )
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.api_url(), urlencoding::encode(range))
    }

    /// Title of the first worksheet, adding [`DEFAULT_SHEET_TITLE`] when
    /// the spreadsheet has none.
    #[instrument(level = "info", skip_all)]
    pub async fn worksheet_title(&self) -> Result<String, PipelineError> {
        let req = self
            .http
            .get(self.api_url())
            .query(&[("fields", "sheets.properties.title")]);
        let meta: SpreadsheetMeta = self.send(req).await?.json().await.map_err(malformed)?;

        match meta.sheets.into_iter().next() {
            Some(sheet) => {
                debug!(title = %sheet.properties.title, "Using first worksheet");
                Ok(sheet.properties.title)
            }
            None => {
                self.add_sheet(DEFAULT_SHEET_TITLE).await?;
                Ok(DEFAULT_SHEET_TITLE.to_string())
            }
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn add_sheet(&self, title: &str) -> Result<(), PipelineError> {
        let body = json!({ "requests": [{ "addSheet": { "properties": { "title": title } } }] });
        let req = self
            .http
            .post(format!("{}:batchUpdate", self.api_url()))
            .json(&body);
        self.send(req).await?;
        info!("Added worksheet");
        Ok(())
    }

    /// Values of row 1; empty when the sheet has no first row.
    #[instrument(level = "info", skip(self))]
    pub async fn first_row(&self, sheet: &str) -> Result<Vec<String>, PipelineError> {
        let range = format!("{}!1:1", quote_sheet(sheet));
        let req = self.http.get(self.values_url(&range));
        let values: ValueRange = self.send(req).await?.json().await.map_err(malformed)?;
        Ok(values.values.into_iter().next().unwrap_or_default())
    }

    /// Append one row after the last non-empty row of `sheet`.
    #[instrument(level = "info", skip(self, values), fields(cells = values.len()))]
    pub async fn append_row(&self, sheet: &str, values: &[String]) -> Result<(), PipelineError> {
        let url = format!("{}:append", self.values_url(&quote_sheet(sheet)));
        let req = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [values] }));
        self.send(req).await?;
        debug!("Appended row");
        Ok(())
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, PipelineError> {
        let resp = req
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PipelineError::Sheets(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(self.api_error(status, &body))
    }

    /// Split permission problems, which the operator can fix, from the rest.
    fn api_error(&self, status: StatusCode, body: &str) -> PipelineError {
        let (message, api_status) = match serde_json::from_str::<ApiErrorEnvelope>(body) {
            Ok(env) => (env.error.message, env.error.status),
            Err(_) => (body.trim().to_string(), String::new()),
        };
        let lower = message.to_lowercase();
        if status == StatusCode::FORBIDDEN
            || api_status == "PERMISSION_DENIED"
            || lower.contains("permission")
            || lower.contains("access")
        {
            warn!(%status, %message, "Spreadsheet access denied");
            return PipelineError::Access {
                service_email: self.service_email.clone(),
                spreadsheet_url: self.spreadsheet_url(),
                message,
            };
        }
        warn!(%status, %message, "Sheets API error");
        PipelineError::Sheets(format!("HTTP {status}: {message}"))
    }
}

fn malformed(e: reqwest::Error) -> PipelineError {
    PipelineError::Sheets(format!("malformed API response: {e}"))
}

/// A1-notation sheet name, quoted so spaces and punctuation are safe.
fn quote_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}
