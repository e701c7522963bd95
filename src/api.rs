//! Chat-completion client with fixed-interval retries.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait for sending text to a model
//! - [`ChatClient`]: posts an OpenAI-style chat-completion request to the
//!   endpoint in a [`ModelConfig`]
//! - [`RetryAsk`]: decorator that retries any [`AskAsync`] under a
//!   [`RetryPolicy`]
//!
//! Only the HTTP exchange is retried. A reply that arrives but carries no
//! usable text is an [`PipelineError::Upstream`] error straight away.

use crate::config::ModelConfig;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::scrapers::fetch::REQUEST_TIMEOUT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

const SYSTEM_PROMPT: &str =
    "Bạn là một trợ lý AI chuyên phân tích nội dung. Hãy trả về kết quả theo đúng định dạng được yêu cầu.";

/// Trait for async model interaction.
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    /// Send text to the model and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, PipelineError>;
}

/// Retries the wrapped [`AskAsync`] with a fixed delay between attempts.
pub struct RetryAsk<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.policy.max_attempts)
            .field("delay", &self.policy.delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, PipelineError> {
        let inner = &self.inner;
        self.policy
            .run("ask", move |_| inner.ask(text))
            .await
            .map_err(|e| match e {
                PipelineError::Upstream { model, message } => PipelineError::Upstream {
                    model,
                    message: format!("{message} (after {} attempts)", self.policy.max_attempts),
                },
                other => other,
            })
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// OpenRouter reports some failures in a 200 body.
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

impl ChatCompletionResponse {
    /// Text of `choices[0].message.content`, if there is any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Instruction sent as the user message. The section labels it asks for are
/// the ones [`crate::parser::parse`] looks for.
pub fn build_prompt(content: &str) -> String {
    format!(
        "Hãy phân tích nội dung sau và trả về kết quả theo định dạng chính xác:\n\
         \n\
         Chủ đề: [chủ đề chính]\n\
         Tóm tắt: [tóm tắt ngắn gọn]\n\
         Kết luận: [kết luận chính]\n\
         \n\
         Nội dung cần phân tích:\n\
         {content}\n\
         \n\
         Lưu ý: Phải trả về đúng định dạng với các từ khóa 'Chủ đề:', 'Tóm tắt:', 'Kết luận:' ở đầu mỗi phần."
    )
}

/// One chat-completion endpoint.
pub struct ChatClient {
    http: Client,
    model: ModelConfig,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient").field("model", &self.model).finish()
    }
}

impl ChatClient {
    pub fn new(model: ModelConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, model })
    }

    fn upstream(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Upstream {
            model: self.model.name.clone(),
            message: message.into(),
        }
    }
}

impl AskAsync for ChatClient {
    type Response = ChatCompletionResponse;

    #[instrument(level = "info", skip_all, fields(model = %self.model.name))]
    async fn ask(&self, text: &str) -> Result<Self::Response, PipelineError> {
        let t0 = Instant::now();
        let prompt = build_prompt(text);
        let body = ChatCompletionRequest {
            model: &self.model.name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        };

        let mut req = self.http.post(&self.model.endpoint).json(&body);
        for (name, value) in &self.model.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let res = async {
            req.send()
                .await?
                .error_for_status()?
                .json::<ChatCompletionResponse>()
                .await
        }
        .await;

        match res {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!(elapsed_ms = t0.elapsed().as_millis(), error = %e, "API call failed");
                Err(self.upstream(e.to_string()))
            }
        }
    }
}

/// Send `content` to `model` and return the reply text.
///
/// The HTTP exchange is retried under `policy`; a well-formed response
/// without usable content is not.
///
/// # Arguments
///
/// * `model` - Resolved model settings (endpoint, headers, sampling)
/// * `content` - Extracted article text to embed in the prompt
/// * `policy` - Attempt count and delay for the HTTP exchange
///
/// # Returns
///
/// The raw text of `choices[0].message.content`.
///
/// # Errors
///
/// * [`PipelineError::Extraction`] if `content` is blank
/// * [`PipelineError::Upstream`] when every attempt fails, or when the
///   response has no `choices[0].message.content`
#[instrument(level = "info", skip_all, fields(model = %model.name))]
pub async fn analyze(
    model: &ModelConfig,
    content: &str,
    policy: RetryPolicy,
) -> Result<String, PipelineError> {
    if content.trim().is_empty() {
        return Err(PipelineError::Extraction("nothing to analyze".into()));
    }

    let t0 = Instant::now();
    let api = RetryAsk::new(ChatClient::new(model.clone())?, policy);
    let resp = api.ask(content).await.inspect_err(|e| {
        error!(elapsed_ms_total = t0.elapsed().as_millis(), error = %e, "analyze failed");
    })?;

    let reply = match resp.first_content().map(str::to_string) {
        Some(text) => text,
        None => {
            let message = match resp.error {
                Some(err) if !err.message.is_empty() => format!("response has no usable result: {}", err.message),
                _ => "response has no usable result".to_string(),
            };
            error!(%message, "analyze failed");
            return Err(PipelineError::Upstream {
                model: model.name.clone(),
                message,
            });
        }
    };

    info!(
        elapsed_ms_total = t0.elapsed().as_millis(),
        reply_chars = reply.chars().count(),
        "analyze succeeded"
    );
    Ok(reply)
}
