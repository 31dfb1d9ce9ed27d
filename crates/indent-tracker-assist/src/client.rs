//! Assist client: prompt in, display text out, never undefined.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::prompts::{
    make_notify_prompt, make_workload_prompt, EMPTY_REPLY, NOTIFY_FALLBACK, SYSTEM_INSTRUCTION,
    WORKLOAD_FALLBACK,
};
use crate::retry::{Exhausted, RetryPolicy};
use crate::transport::{GeminiTransport, TextGeneration, TransportError};

/// Public Gemini API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Assist errors.
#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Transport setup failed: {0}")]
    Setup(#[from] TransportError),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },
}

impl From<Exhausted<TransportError>> for AssistError {
    fn from(e: Exhausted<TransportError>) -> Self {
        AssistError::Exhausted {
            attempts: e.attempts,
            last: e.last,
        }
    }
}

pub type AssistResult<T> = Result<T, AssistError>;

/// Everything needed to talk to the text service.
#[derive(Clone)]
pub struct AssistConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub system_instruction: String,
    /// Per-attempt HTTP timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl AssistConfig {
    /// Defaults for the public Gemini API with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for AssistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// The two things the assist client is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    ReadyNotification,
    WorkloadSummary,
}

impl PromptKind {
    /// Fixed text shown when generation fails.
    pub fn fallback(&self) -> &'static str {
        match self {
            PromptKind::ReadyNotification => NOTIFY_FALLBACK,
            PromptKind::WorkloadSummary => WORKLOAD_FALLBACK,
        }
    }
}

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Generated,
    /// The service answered without text
    Empty,
    /// Every attempt failed; the text is the fixed fallback
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistReply {
    pub kind: PromptKind,
    pub text: String,
    pub outcome: ReplyOutcome,
}

impl AssistReply {
    /// Text to show; an empty reply reads as [`EMPTY_REPLY`].
    pub fn display_text(&self) -> &str {
        if self.text.is_empty() {
            EMPTY_REPLY
        } else {
            &self.text
        }
    }
}

/// Retrying client for the two assist prompts.
#[derive(Clone)]
pub struct AssistClient {
    transport: Arc<dyn TextGeneration>,
    system_instruction: String,
    retry: RetryPolicy,
}

impl AssistClient {
    /// Client for the configured Gemini endpoint.
    pub fn new(config: &AssistConfig) -> AssistResult<Self> {
        let transport = GeminiTransport::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
            config.request_timeout,
        )?;
        tracing::debug!(url = transport.url(), "assist client ready");
        Ok(Self::with_transport(
            Arc::new(transport),
            config.system_instruction.clone(),
            config.retry,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn TextGeneration>,
        system_instruction: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            system_instruction: system_instruction.into(),
            retry,
        }
    }

    /// Send one prompt with retries. `Ok(None)` when the answer had no text.
    pub async fn generate(&self, prompt: &str) -> AssistResult<Option<String>> {
        let text = self
            .retry
            .run(|attempt| {
                tracing::debug!(attempt, "assist request");
                self.transport.generate(prompt, &self.system_instruction)
            })
            .await?;
        Ok(text)
    }

    /// Draft a message telling the ward its indent is ready.
    pub async fn draft_ready_notification(
        &self,
        ward: &str,
        category: &str,
        unit: &str,
    ) -> AssistReply {
        let prompt = make_notify_prompt(ward, category, unit);
        self.reply(PromptKind::ReadyNotification, &prompt).await
    }

    /// Summarize the workload from per-unit indent counts.
    pub async fn summarize_workload(&self, counts: &BTreeMap<String, usize>) -> AssistReply {
        let prompt = make_workload_prompt(counts);
        self.reply(PromptKind::WorkloadSummary, &prompt).await
    }

    async fn reply(&self, kind: PromptKind, prompt: &str) -> AssistReply {
        let (text, outcome) = match self.generate(prompt).await {
            Ok(Some(text)) if !text.is_empty() => (text, ReplyOutcome::Generated),
            Ok(_) => (String::new(), ReplyOutcome::Empty),
            Err(e) => {
                tracing::warn!(?kind, error = %e, "assist failed, using fallback");
                (kind.fallback().to_string(), ReplyOutcome::Fallback)
            }
        };
        AssistReply {
            kind,
            text,
            outcome,
        }
    }
}
