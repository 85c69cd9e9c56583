//! Language model seam
//!
//! The assistant only ever needs "prompt in, text out", optionally with a
//! JSON schema constraining the output. Gemini is the production backend;
//! `ScriptedModel` replays canned replies for tests and offline demos.

use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    /// Response schema; when set the model must answer with JSON
    pub schema: Option<Value>,
    pub api_key: String,
}

impl ModelRequest {
    pub fn text(prompt: String, api_key: String) -> Self {
        Self {
            prompt,
            schema: None,
            api_key,
        }
    }

    pub fn json(prompt: String, schema: Value, api_key: String) -> Self {
        Self {
            prompt,
            schema: Some(schema),
            api_key,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion and return the raw text of the first candidate
    async fn generate(&self, request: ModelRequest) -> Result<String>;

    /// Tells whether a key is accepted by the backend
    async fn verify_key(&self, api_key: &str) -> Result<bool>;
}

enum ScriptedReply {
    Text(String),
    Failure(String),
}

/// Replays queued replies in order and records every request it receives
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(ScriptedReply::Text(reply.into()));
        }
    }

    pub fn push_json(&self, reply: &Value) {
        self.push_reply(reply.to_string());
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(ScriptedReply::Failure(message.into()));
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: ModelRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| AssistantError::LlmError("scripted model poisoned".to_string()))?
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(AssistantError::LlmError(message)),
            None => Err(AssistantError::LlmError(
                "scripted model has no reply queued".to_string(),
            )),
        }
    }

    async fn verify_key(&self, api_key: &str) -> Result<bool> {
        Ok(!api_key.trim().is_empty())
    }
}
