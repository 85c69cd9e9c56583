//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling. Keys travel
//! per request because every user brings their own.

use crate::config::AppConfig;
use crate::error::AssistantError;
use crate::llm::{LanguageModel, ModelRequest};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}:generateContent",
                config.gemini_base_url, config.gemini_model
            ),
        })
    }

    async fn post(&self, api_key: &str, body: &GeminiRequest) -> Result<reqwest::Response> {
        if api_key.trim().is_empty() {
            return Err(AssistantError::MissingApiKey);
        }

        self.client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::LlmError(format!("Gemini API error: {}", e))
            })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: ModelRequest) -> Result<String> {
        let body = GeminiRequest::new(request.prompt, request.schema);

        debug!(json_mode = body.generation_config.is_some(), "Calling Gemini API");

        let response = self.post(&request.api_key, &body).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(AssistantError::LlmError(format!(
                "API request failed: {} {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::LlmError("No response from Gemini API".to_string()))?;

        let text = candidate
            .content
            .and_then(|content| content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| AssistantError::LlmError("Empty response from Gemini".to_string()))?;

        info!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            chars = text.len(),
            "Gemini response received"
        );

        Ok(text)
    }

    async fn verify_key(&self, api_key: &str) -> Result<bool> {
        let hello = GeminiRequest::new("Hello".to_string(), None);
        match self.post(api_key, &hello).await {
            Ok(response) => Ok(response.status().is_success()),
            Err(AssistantError::MissingApiKey) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GeminiRequest {
    fn new(prompt: String, schema: Option<Value>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: schema.map(|response_schema| GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_request_has_no_generation_config() {
        let request = GeminiRequest::new("Analyze my spending".to_string(), None);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Analyze my spending");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_schema_request_asks_for_json() {
        let schema = json!({"type": "ARRAY", "items": {"type": "STRING"}});
        let request = GeminiRequest::new("Questions please".to_string(), Some(schema.clone()));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"], schema);
    }

    #[test]
    fn test_response_parsing() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"intent\":\"general_chat\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10}
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_before_any_request() {
        let client = GeminiClient::new(&AppConfig::default()).unwrap();
        let result = client
            .generate(ModelRequest::text("hi".to_string(), "  ".to_string()))
            .await;
        assert!(matches!(result, Err(AssistantError::MissingApiKey)));
        assert!(!client.verify_key("").await.unwrap());
    }
}
