//! Error types for the finance assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Please add your API key in settings to use AI features.")]
    MissingApiKey,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Invalid model reply: {0}")]
    InvalidModelReply(String),

    #[error("A confirmation is pending. Confirm or cancel it first.")]
    ConfirmationPending,

    #[error("There is no operation waiting for confirmation")]
    NoPendingConfirmation,

    #[error("Confirmation {0} does not match the pending operation")]
    StaleConfirmation(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("No plan is active: {0}")]
    PlanNotActive(String),

    // =============================
    // Record Errors
    // =============================

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}
