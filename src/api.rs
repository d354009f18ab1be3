//! # API Module
//!
//! Talks to an OpenAI-compatible chat-completion endpoint (LM Studio, llama.cpp
//! server, Ollama's `/v1` shim, or a hosted API) and turns its answer into
//! [`CategorizedTerm`]s.
//!
//! One call to [`VocabularyClient::analyze`] sends exactly one `POST`:
//!
//! ```text
//! { "model": ..., "temperature": ..., "max_tokens": ...,
//!   "messages": [ {"role": "system", ...}, {"role": "user", "content": "TEXT:\n..."} ] }
//! ```
//!
//! There is no retry or backoff. Transport failures and non-2xx statuses become
//! [`VocabularyError::LlmRequest`]; anything wrong with the body becomes
//! [`VocabularyError::LlmResponseFormat`]. The whole response is parsed before
//! anything is returned, so callers never see half a result.
//!
//! # Example
//!
//! ```no_run
//! use text_to_vocabulary::api::VocabularyClient;
//! use text_to_vocabulary::config::load_settings;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = load_settings("settings.json")?;
//! let client = VocabularyClient::new(&settings)?;
//! for pair in client.analyze("The cat quickly ran away.").await? {
//!     println!("{} -> {}", pair.term, pair.category);
//! }
//! # Ok(()) }
//! ```

use std::time::Duration;

use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::VocabularySettings,
    error::{Result, VocabularyError},
    token_budget::{TokenBudget, calculate_max_tokens},
    vocabulary::CategorizedTerm,
};

/// Model name sent when the settings leave it blank.
pub const FALLBACK_MODEL: &str = "local-model";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Request body of `POST .../chat/completions`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Normalize a configured endpoint to a full chat-completions URL.
///
/// | configured | used |
/// |------------|------|
/// | `http://host:1234` | `http://host:1234/v1/chat/completions` |
/// | `http://host:1234/v1` | `http://host:1234/v1/chat/completions` |
/// | `http://host:1234/v1/chat/completions/` | `http://host:1234/v1/chat/completions` |
pub fn normalize_endpoint(endpoint: &str) -> String {
    let cleaned = endpoint.trim().trim_end_matches('/');
    if cleaned.ends_with("/chat/completions") {
        cleaned.to_string()
    } else if cleaned.ends_with("/v1") {
        format!("{cleaned}/chat/completions")
    } else {
        format!("{cleaned}/v1/chat/completions")
    }
}

/// Client for one configured endpoint.
///
/// Holds a `reqwest::Client` built once with the configured timeout, and copies of
/// the settings that shape every request.
#[derive(Debug, Clone)]
pub struct VocabularyClient {
    http: Client,
    url: String,
    model: String,
    temperature: f32,
    system_prompt: String,
    api_key: Option<String>,
    budget: TokenBudget,
}

impl VocabularyClient {
    /// Creates a new client from settings.
    ///
    /// # Errors
    /// - [`VocabularyError::Configuration`] if the endpoint is blank or the HTTP
    ///   client cannot be built.
    pub fn new(settings: &VocabularySettings) -> Result<Self> {
        if settings.endpoint.trim().is_empty() {
            return Err(VocabularyError::Configuration("endpoint is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|err| VocabularyError::Configuration(format!("HTTP client: {err}")))?;

        let model = match settings.model.trim() {
            "" => FALLBACK_MODEL.to_string(),
            model => model.to_string(),
        };

        let url = normalize_endpoint(&settings.endpoint);
        debug!("Client created for {} (model {})", url, model);

        Ok(Self {
            http,
            url,
            model,
            temperature: settings.temperature,
            system_prompt: settings.system_prompt.clone(),
            api_key: settings.api_key.clone(),
            budget: TokenBudget::from(settings),
        })
    }

    /// Build the request body for `text`, including the `max_tokens` budget.
    ///
    /// # Errors
    /// [`VocabularyError::InputTooLarge`] if the text leaves no room for an answer.
    pub fn build_request(&self, text: &str) -> Result<ChatCompletionRequest> {
        let user_content = format!("TEXT:\n{text}");
        let max_tokens = calculate_max_tokens(
            &[("system", &self.system_prompt), ("user", &user_content)],
            self.budget,
        )?;

        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::new("system", self.system_prompt.clone()),
                ChatMessage::new("user", user_content),
            ],
            temperature: self.temperature,
            max_tokens,
        })
    }

    /// Send `text` to the model and return the categorized terms in response order.
    ///
    /// Duplicates are passed through untouched; the store deduplicates on upsert.
    pub async fn analyze(&self, text: &str) -> Result<Vec<CategorizedTerm>> {
        let request = self.build_request(text)?;
        debug!("Sending request: {:?}", request);

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
        }

        let response = builder.send().await.map_err(|err| VocabularyError::LlmRequest {
            status: err.status().map(|status| status.as_u16()),
            detail: err.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| VocabularyError::LlmRequest {
            status: Some(status.as_u16()),
            detail: format!("failed to read response body: {err}"),
        })?;

        if !status.is_success() {
            let detail = match body.trim() {
                "" => status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string(),
                text => text.to_string(),
            };
            return Err(VocabularyError::LlmRequest {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let terms = parse_completion(&body)?;
        info!("Model returned {} categorized terms", terms.len());
        Ok(terms)
    }
}

/// Parse a raw chat-completion body into categorized terms.
pub fn parse_completion(body: &str) -> Result<Vec<CategorizedTerm>> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| VocabularyError::LlmResponseFormat(format!("invalid body: {err}")))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            VocabularyError::LlmResponseFormat("response has no message content".to_string())
        })?;

    let value = extract_json(&content)?;
    parse_terms(&value)
}

/// Pull the JSON payload out of the model's message content.
///
/// Models often wrap the object in prose or code fences, so if the content is not
/// JSON as a whole, the first `{` or `[` from which a complete value decodes is used.
pub fn extract_json(content: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        return Ok(value);
    }

    for (index, ch) in content.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&content[index..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Ok(value);
        }
    }

    Err(VocabularyError::LlmResponseFormat(
        "no JSON object found in model response".to_string(),
    ))
}

/// Turn the decoded payload into pairs.
///
/// Accepted shapes:
/// - `{"noun": ["cat", "dog"], "verb": ["run"]}`; non-array values are ignored
/// - `[["run", "verb"], ["quickly", "adverb"]]`
/// - `[{"term": "run", "category": "verb"}]`
pub fn parse_terms(value: &Value) -> Result<Vec<CategorizedTerm>> {
    match value {
        Value::Object(map) => {
            let mut terms = Vec::new();
            for (category, words) in map {
                let Value::Array(words) = words else {
                    debug!("Ignoring non-list key in response: {}", category);
                    continue;
                };
                terms.extend(
                    words
                        .iter()
                        .filter_map(scalar_text)
                        .filter_map(|word| CategorizedTerm::new(&word, category)),
                );
            }
            Ok(terms)
        }
        Value::Array(items) => {
            let mut terms = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let (term, category) = pair_from_item(item).ok_or_else(|| {
                    VocabularyError::LlmResponseFormat(format!(
                        "entry {index} is not a (term, category) pair: {item}"
                    ))
                })?;
                terms.extend(CategorizedTerm::new(&term, &category));
            }
            Ok(terms)
        }
        other => Err(VocabularyError::LlmResponseFormat(format!(
            "expected a JSON object or array, got: {other}"
        ))),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn pair_from_item(item: &Value) -> Option<(String, String)> {
    match item {
        Value::Array(pair) if pair.len() == 2 => {
            Some((scalar_text(&pair[0])?, scalar_text(&pair[1])?))
        }
        Value::Object(fields) => Some((
            scalar_text(fields.get("term")?)?,
            scalar_text(fields.get("category")?)?,
        )),
        _ => None,
    }
}
