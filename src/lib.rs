//! Hisab finance assistant
//!
//! A personal income/expense tracker with a conversational assistant:
//! - Records transactions, a monthly budget and saving goals per user
//! - Turns free text into staged add/update/delete batches
//! - Never writes a record without explicit confirmation
//! - Keeps an undo log of every confirmed batch
//! - Generates saving and budget plans from a short questionnaire
//!
//! PIPELINE:
//! MESSAGE → CLASSIFY → ANALYSE → RESOLVE → STAGE → CONFIRM → EXECUTE → UNDO?

pub mod api;
pub mod assistant;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod context;
pub mod currency;
pub mod error;
pub mod executor;
pub mod insights;
pub mod llm;
pub mod models;
pub mod planning;
pub mod resolver;
pub mod session;
pub mod store;
pub mod undo;

pub use error::{AssistantError, Result};

// Re-export common types
pub use assistant::{Assistant, AssistantTurn, ConfirmationDecision, TurnKind};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use llm::{GeminiClient, LanguageModel, ScriptedModel};
pub use models::*;
pub use planning::PlanKind;
pub use store::{build_store, InMemoryRecordStore, PostgresRecordStore, RecordStore};
