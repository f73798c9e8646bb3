// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Vision-model client for e-waste classification
//!
//! Talks to an OpenAI-style chat-completion endpoint (OpenRouter by default).
//! Only reading the image can fail with an error; everything that goes wrong
//! after that is reported as [`Classification::Failed`] so the HTTP layer can
//! hand it straight back to the browser.

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::normalize::{normalize, Fields};
use crate::Result;

/// Outcome of a classification request
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Normalized item fields
    Item(Fields),
    /// Human-readable failure, serialized as `{"error": ...}`
    Failed(String),
}

impl Classification {
    pub fn is_failed(&self) -> bool {
        matches!(self, Classification::Failed(_))
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Classification::Item(fields) => fields.serialize(serializer),
            Classification::Failed(message) => json!({ "error": message }).serialize(serializer),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat-completion client for image classification
pub struct ClassifierClient {
    client: Client,
    config: ClassifierConfig,
}

impl ClassifierClient {
    /// Create a new classifier client
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.api_key.is_empty() {
            warn!("No classifier API key configured; requests will likely be rejected");
        }

        Ok(Self { client, config })
    }

    /// Model used for classification
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Classify the image stored at `image_path`
    pub async fn classify(&self, image_path: &Path) -> Result<Classification> {
        let data = std::fs::read(image_path)?;
        let image_base64 = general_purpose::STANDARD.encode(&data);
        Ok(self.classify_base64(&image_base64).await)
    }

    async fn classify_base64(&self, image_base64: &str) -> Classification {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: &self.config.prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", image_base64),
                        },
                    },
                ],
            }],
        };

        debug!("Sending vision request: model={}", self.config.model);

        let response = match self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Classification request failed: {}", e);
                return Classification::Failed(e.to_string());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Classification::Failed(e.to_string()),
            Err(_) => "Unknown error".to_string(),
        };

        if !status.is_success() {
            warn!("Classifier returned status {}", status);
            return Classification::Failed(format!("API Error {}: {}", status.as_u16(), body));
        }

        match parse_completion(&body) {
            Ok(fields) => Classification::Item(normalize(fields)),
            Err(detail) => Classification::Failed(format!("Failed to parse API response: {}", detail)),
        }
    }
}

/// Pull the item object out of a raw chat-completion response body
fn parse_completion(body: &str) -> std::result::Result<Fields, String> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "list index out of range: no choices returned".to_string())?;

    match extract_json(&choice.message.content).map_err(|e| e.to_string())? {
        Value::Object(fields) => Ok(fields),
        other => Err(format!("expected a JSON object, got {}", json_kind(&other))),
    }
}

/// Parse the JSON embedded in free-form model text
///
/// Takes the span from the first `{` to the last `}` and parses it; with no
/// such span the whole text is parsed. Braces in the surrounding prose can
/// widen the span and break the parse.
pub fn extract_json(text: &str) -> std::result::Result<Value, serde_json::Error> {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };
    serde_json::from_str(span)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
