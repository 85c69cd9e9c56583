//! Runtime configuration
//!
//! Read from the process environment (a `.env` file is loaded by the
//! binaries before this runs). Every value has a default so the service
//! starts with nothing configured.

use crate::error::AssistantError;
use crate::Result;
use std::env;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server-wide Gemini key, used when a user has not stored their own
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub port: u16,
    pub database_url: Option<String>,
    /// Conversation entries replayed into each prompt
    pub history_window: usize,
    /// Undo batches kept per session
    pub undo_depth: usize,
    /// Recent transactions listed in each prompt
    pub recent_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            port: 8080,
            database_url: None,
            history_window: 5,
            undo_depth: 50,
            recent_limit: 20,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && key != "your_gemini_api_key_here");

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_number("PORT", &raw)?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            port,
            database_url: env::var("DATABASE_URL")
                .or_else(|_| env::var("POSTGRES_URL"))
                .ok(),
            history_window: env_number("ASSISTANT_HISTORY_WINDOW", defaults.history_window)?,
            undo_depth: env_number("ASSISTANT_UNDO_DEPTH", defaults.undo_depth)?,
            recent_limit: env_number("ASSISTANT_RECENT_LIMIT", defaults.recent_limit)?,
        })
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse_number(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AssistantError::ConfigError(format!("{} must be a number, got {:?}", name, raw)))
}
