//! Startup configuration and the model table.
//!
//! [`AppConfig`] is built once from the parsed [`Cli`] and validated before
//! any network call. It is then passed by reference to the stages that need
//! it. Model settings come from a built-in table, optionally overridden per
//! model by a YAML file:
//!
//! ```yaml
//! models:
//!   deepseek:
//!     name: deepseek/deepseek-chat
//!     max_tokens: 1500
//!   gpt3.5:
//!     temperature: 0.2
//! ```

use crate::cli::Cli;
use crate::error::PipelineError;
use crate::outputs::sheets::ServiceAccountKey;
use clap::ValueEnum;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Models the pipeline knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
pub enum ModelKind {
    /// DeepSeek R1 through OpenRouter
    #[value(name = "deepseek")]
    #[serde(rename = "deepseek")]
    Deepseek,
    /// GPT-3.5 Turbo through OpenAI
    #[value(name = "gpt3.5")]
    #[serde(rename = "gpt3.5")]
    Gpt35,
}

impl ModelKind {
    /// Environment variable holding this model's provider key.
    pub fn key_var(self) -> &'static str {
        match self {
            ModelKind::Deepseek => "OPENROUTER_API_KEY",
            ModelKind::Gpt35 => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Deepseek => f.write_str("deepseek"),
            ModelKind::Gpt35 => f.write_str("gpt3.5"),
        }
    }
}

/// Everything needed to call one chat-completion endpoint.
#[derive(Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    pub endpoint: String,
    /// Extra request headers, `Authorization` included.
    pub headers: Vec<(String, String)>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/// Per-model fields a config file may override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub models: HashMap<ModelKind, ModelOverride>,
}

impl ConfigFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(format!("invalid config file: {e}")))
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }
}

/// Validated process-wide configuration.
pub struct AppConfig {
    openrouter_api_key: Option<String>,
    openai_api_key: Option<String>,
    pub service_account: ServiceAccountKey,
    pub spreadsheet_id: String,
    pub backup_dir: PathBuf,
    overrides: HashMap<ModelKind, ModelOverride>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("openrouter_api_key", &self.openrouter_api_key.as_ref().map(|_| "<set>"))
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("service_account", &self.service_account)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("backup_dir", &self.backup_dir)
            .field("overrides", &self.overrides)
            .finish()
    }
}

impl AppConfig {
    /// Build and validate the configuration.
    ///
    /// Fails with [`PipelineError::Config`] when no provider key is set, when
    /// the credentials file is missing or not a service-account key, or when
    /// the spreadsheet id is absent.
    #[instrument(level = "info", skip_all)]
    pub fn from_cli(cli: &Cli) -> Result<Self, PipelineError> {
        let openrouter_api_key = non_empty(cli.openrouter_api_key.as_deref());
        let openai_api_key = non_empty(cli.openai_api_key.as_deref());
        if openrouter_api_key.is_none() && openai_api_key.is_none() {
            return Err(PipelineError::Config(
                "at least one API key (OPENROUTER_API_KEY or OPENAI_API_KEY) is required".into(),
            ));
        }

        let credentials_file = cli.credentials_file.as_deref().ok_or_else(|| {
            PipelineError::Config("GOOGLE_SHEETS_CREDENTIALS_FILE is not set".into())
        })?;
        let service_account = ServiceAccountKey::from_file(credentials_file)?;

        let spreadsheet_id = non_empty(cli.spreadsheet_id.as_deref()).ok_or_else(|| {
            PipelineError::Config("GOOGLE_SHEETS_SPREADSHEET_ID is not set".into())
        })?;

        let overrides = match &cli.config {
            Some(path) => ConfigFile::load(path)?.models,
            None => HashMap::new(),
        };

        info!(
            service_email = %service_account.client_email,
            %spreadsheet_id,
            openrouter = openrouter_api_key.is_some(),
            openai = openai_api_key.is_some(),
            "Configuration loaded"
        );

        Ok(Self {
            openrouter_api_key,
            openai_api_key,
            service_account,
            spreadsheet_id,
            backup_dir: cli.backup_dir.clone(),
            overrides,
        })
    }

    /// Resolve the settings for `kind`, failing if its provider key is absent.
    pub fn model(&self, kind: ModelKind) -> Result<ModelConfig, PipelineError> {
        let key = match kind {
            ModelKind::Deepseek => self.openrouter_api_key.as_deref(),
            ModelKind::Gpt35 => self.openai_api_key.as_deref(),
        }
        .ok_or_else(|| {
            PipelineError::Config(format!("{} is not set; required for model {kind}", kind.key_var()))
        })?;

        let mut model = builtin_model(kind, key);
        if let Some(o) = self.overrides.get(&kind) {
            if let Some(name) = &o.name {
                model.name = name.clone();
            }
            if let Some(endpoint) = &o.endpoint {
                model.endpoint = endpoint.clone();
            }
            if let Some(max_tokens) = o.max_tokens {
                model.max_tokens = max_tokens;
            }
            if let Some(temperature) = o.temperature {
                model.temperature = temperature;
            }
        }
        Ok(model)
    }
}

fn builtin_model(kind: ModelKind, key: &str) -> ModelConfig {
    let mut headers = vec![("Authorization".to_string(), format!("Bearer {key}"))];
    match kind {
        ModelKind::Deepseek => {
            headers.push(("HTTP-Referer".to_string(), env!("CARGO_PKG_REPOSITORY").to_string()));
            headers.push(("X-Title".to_string(), env!("CARGO_PKG_NAME").to_string()));
            ModelConfig {
                name: "deepseek/deepseek-r1:free".into(),
                endpoint: OPENROUTER_API_URL.into(),
                headers,
                max_tokens: 1000,
                temperature: 0.3,
            }
        }
        ModelKind::Gpt35 => ModelConfig {
            name: "gpt-3.5-turbo".into(),
            endpoint: OPENAI_API_URL.into(),
            headers,
            max_tokens: 1000,
            temperature: 0.3,
        },
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::sheets::tests::write_service_account;

    fn cli_with(
        openrouter: Option<&str>,
        openai: Option<&str>,
        credentials_file: Option<PathBuf>,
        spreadsheet_id: Option<&str>,
    ) -> Cli {
        Cli {
            url: "https://example.com/a".into(),
            model: ModelKind::Deepseek,
            openrouter_api_key: openrouter.map(str::to_string),
            openai_api_key: openai.map(str::to_string),
            credentials_file,
            spreadsheet_id: spreadsheet_id.map(str::to_string),
            backup_dir: PathBuf::from("."),
            config: None,
        }
    }

    #[test]
    fn test_requires_one_provider_key() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), "https://oauth2.googleapis.com/token");
        let cli = cli_with(None, Some("  "), Some(creds), Some("sheet"));
        let err = AppConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("OPENROUTER_API_KEY")));
    }

    #[test]
    fn test_requires_credentials_and_sheet_id() {
        let cli = cli_with(Some("or-key"), None, None, Some("sheet"));
        let err = AppConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("GOOGLE_SHEETS_CREDENTIALS_FILE")));

        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), "https://oauth2.googleapis.com/token");
        let cli = cli_with(Some("or-key"), None, Some(creds), None);
        let err = AppConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("GOOGLE_SHEETS_SPREADSHEET_ID")));
    }

    #[test]
    fn test_missing_credentials_file() {
        let cli = cli_with(Some("or-key"), None, Some(PathBuf::from("/nonexistent/key.json")), Some("sheet"));
        assert!(matches!(AppConfig::from_cli(&cli), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_model_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), "https://oauth2.googleapis.com/token");
        let config = AppConfig::from_cli(&cli_with(Some("or-key"), None, Some(creds), Some("sheet"))).unwrap();

        let deepseek = config.model(ModelKind::Deepseek).unwrap();
        assert_eq!(deepseek.name, "deepseek/deepseek-r1:free");
        assert_eq!(deepseek.endpoint, OPENROUTER_API_URL);
        assert_eq!(deepseek.max_tokens, 1000);
        assert!(deepseek
            .headers
            .contains(&("Authorization".to_string(), "Bearer or-key".to_string())));
        assert!(deepseek
            .headers
            .contains(&("HTTP-Referer".to_string(), env!("CARGO_PKG_REPOSITORY").to_string())));
        assert!(deepseek
            .headers
            .contains(&("X-Title".to_string(), "page_digest".to_string())));

        let err = config.model(ModelKind::Gpt35).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn test_debug_hides_keys() {
        let model = builtin_model(ModelKind::Gpt35, "sk-secret");
        assert!(!format!("{model:?}").contains("sk-secret"));
    }

    #[test]
    fn test_yaml_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = write_service_account(tmp.path(), "https://oauth2.googleapis.com/token");
        let yaml_path = tmp.path().join("config.yaml");
        std::fs::write(
            &yaml_path,
            "models:\n  gpt3.5:\n    name: gpt-4o-mini\n    temperature: 0.1\n",
        )
        .unwrap();

        let mut cli = cli_with(None, Some("sk-key"), Some(creds), Some("sheet"));
        cli.config = Some(yaml_path);
        let config = AppConfig::from_cli(&cli).unwrap();

        let model = config.model(ModelKind::Gpt35).unwrap();
        assert_eq!(model.name, "gpt-4o-mini");
        assert_eq!(model.temperature, 0.1);
        assert_eq!(model.max_tokens, 1000);
        assert_eq!(model.endpoint, OPENAI_API_URL);
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        assert!(ConfigFile::from_yaml("models:\n  deepseek:\n    nme: typo\n").is_err());
        assert!(ConfigFile::from_yaml("models:\n  llama: {}\n").is_err());
        assert!(ConfigFile::from_yaml("{}").unwrap().models.is_empty());
    }
}
