//! Text-generation transport: one request, one response, no retries.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// Transport errors. Every variant counts as a failed attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse failed: {0}")]
    Decode(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A generative text endpoint.
///
/// `Ok(None)` means the service answered successfully without any text.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, prompt: &str, system_instruction: &str)
        -> TransportResult<Option<String>>;
}

/// Header carrying the API key. The key never appears in the URL, so
/// transport errors that print the URL cannot leak it.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Path of the answer text in a `generateContent` response.
const TEXT_POINTER: &str = "/candidates/0/content/parts/0/text";

/// First candidate's text, if the response carries one.
pub fn extract_text(response: &Value) -> Option<String> {
    response
        .pointer(TEXT_POINTER)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Gemini `generateContent` over HTTPS.
#[derive(Clone)]
pub struct GeminiTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> TransportResult<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            api_key: api_key.into(),
        })
    }

    /// Endpoint URL without the key.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for GeminiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTransport")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TextGeneration for GeminiTransport {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> TransportResult<Option<String>> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
        });

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|err| TransportError::Http(err.without_url()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(TransportError::Status { status, body });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.without_url().to_string()))?;
        Ok(extract_text(&value))
    }
}
