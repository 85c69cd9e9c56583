//! Per-user assistant sessions
//!
//! Everything the conversation remembers between messages: mode, recent
//! turns, the staged batch waiting for confirmation, an add waiting for
//! its amount, the last touched record and the undo log.

use crate::models::{AssistantReply, Operation, Transaction};
use crate::planning::{GeneratedPlan, PlanKind};
use crate::undo::UndoLog;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    #[default]
    Analysis,
    Chat,
    SavingPlan,
    BudgetPlan,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    pub role: Role,
    pub message: String,
}

impl ConversationEntry {
    pub fn new(role: Role, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
        }
    }
}

/// One operation of a staged batch, with what the user is shown
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StagedOperation {
    pub index: usize,
    pub operation: Operation,
    pub preview: String,
    /// Existing records the operation would touch; the user may narrow them
    pub candidates: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub id: Uuid,
    /// Hex SHA-256 of the serialised operations and their candidate records
    pub fingerprint: String,
    pub operations: Vec<StagedOperation>,
    pub reply: AssistantReply,
}

impl PendingConfirmation {
    pub fn new(operations: Vec<StagedOperation>, reply: AssistantReply) -> Result<Self> {
        let fingerprint = batch_fingerprint(&operations)?;
        Ok(Self {
            id: Uuid::new_v4(),
            fingerprint,
            operations,
            reply,
        })
    }
}

/// What the user was shown: each operation with the records it touches
pub fn batch_fingerprint(operations: &[StagedOperation]) -> Result<String> {
    let shown: Vec<(&Operation, &[Transaction])> = operations
        .iter()
        .map(|s| (&s.operation, s.candidates.as_slice()))
        .collect();
    fingerprint(&shown)
}

pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// An add the model understood without an amount
#[derive(Debug, Clone)]
pub struct AwaitingAmount {
    pub reply: AssistantReply,
}

#[derive(Debug, Clone)]
pub struct PlanSession {
    pub kind: PlanKind,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub generated: Option<GeneratedPlan>,
}

impl PlanSession {
    pub fn new(kind: PlanKind, questions: Vec<String>) -> Self {
        Self {
            kind,
            questions,
            answers: Vec::new(),
            generated: None,
        }
    }

    /// Next unanswered question
    pub fn current_question(&self) -> Option<&str> {
        self.questions.get(self.answers.len()).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() >= self.questions.len()
    }

    /// `Q: ...\nA: ...` for every question, blank answers as "No answer"
    pub fn transcript(&self) -> String {
        self.questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let answer = self
                    .answers
                    .get(i)
                    .map(String::as_str)
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or("No answer");
                format!("Q: {}\nA: {}", q, answer)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug)]
pub struct AssistantSession {
    pub mode: AssistantMode,
    pub conversation: Vec<ConversationEntry>,
    pub pending: Option<PendingConfirmation>,
    pub awaiting_amount: Option<AwaitingAmount>,
    pub last_touched: Option<Uuid>,
    pub undo: UndoLog,
    pub plan: Option<PlanSession>,
}

impl AssistantSession {
    pub fn new(undo_depth: usize) -> Self {
        Self {
            mode: AssistantMode::default(),
            conversation: Vec::new(),
            pending: None,
            awaiting_amount: None,
            last_touched: None,
            undo: UndoLog::new(undo_depth),
            plan: None,
        }
    }

    pub fn push_entry(&mut self, role: Role, message: impl Into<String>) {
        self.conversation.push(ConversationEntry::new(role, message));
    }

    pub fn recent_history(&self, window: usize) -> &[ConversationEntry] {
        let start = self.conversation.len().saturating_sub(window);
        &self.conversation[start..]
    }
}

/// Sessions keyed by user id; each one is locked for a whole turn
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<AssistantSession>>>>,
    undo_depth: usize,
}

impl SessionRegistry {
    pub fn new(undo_depth: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            undo_depth,
        }
    }

    pub async fn session(&self, user_id: Uuid) -> Arc<Mutex<AssistantSession>> {
        if let Some(session) = self.sessions.read().await.get(&user_id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(AssistantSession::new(self.undo_depth)))),
        )
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intent, OperationAction};

    fn reply() -> AssistantReply {
        serde_json::from_str(r#"{"intent": "transaction_ops", "response_html": ""}"#).unwrap()
    }

    fn staged(amount: f64) -> StagedOperation {
        StagedOperation {
            index: 0,
            operation: Operation {
                action: OperationAction::Add,
                amount: Some(amount),
                ..Default::default()
            },
            preview: String::new(),
            candidates: Vec::new(),
        }
    }

    #[test]
    fn test_fingerprint_tracks_operations() {
        let a = PendingConfirmation::new(vec![staged(10.0)], reply()).unwrap();
        let b = PendingConfirmation::new(vec![staged(10.0)], reply()).unwrap();
        let c = PendingConfirmation::new(vec![staged(11.0)], reply()).unwrap();

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint.len(), 64);
        assert_eq!(a.reply.intent, Intent::TransactionOps);
    }

    #[test]
    fn test_fingerprint_tracks_candidates() {
        let mut with_candidate = staged(10.0);
        with_candidate.candidates.push(Transaction {
            id: Uuid::new_v4(),
            kind: crate::models::TransactionKind::Expense,
            description: "Lunch".to_string(),
            amount: 300.0,
            category: "Food".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            created_at: chrono::Utc::now(),
        });

        let bare = batch_fingerprint(&[staged(10.0)]).unwrap();
        let shown = batch_fingerprint(&[with_candidate.clone()]).unwrap();
        assert_ne!(bare, shown);

        with_candidate.candidates[0].amount = 350.0;
        assert_ne!(batch_fingerprint(&[with_candidate]).unwrap(), shown);
    }

    #[test]
    fn test_history_window() {
        let mut session = AssistantSession::new(5);
        for i in 0..7 {
            session.push_entry(Role::User, format!("msg {}", i));
        }
        let recent = session.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].message, "msg 2");
        assert_eq!(session.recent_history(50).len(), 7);
    }

    #[test]
    fn test_plan_transcript() {
        let mut plan = PlanSession::new(
            PlanKind::Saving,
            vec!["Goal?".to_string(), "Budget?".to_string()],
        );
        assert_eq!(plan.current_question(), Some("Goal?"));
        plan.answers.push("A car".to_string());
        assert_eq!(plan.current_question(), Some("Budget?"));
        assert!(!plan.is_complete());
        assert_eq!(plan.transcript(), "Q: Goal?\nA: A car\n\nQ: Budget?\nA: No answer");
    }

    #[tokio::test]
    async fn test_registry_returns_the_same_session() {
        let registry = SessionRegistry::new(3);
        let user = Uuid::new_v4();

        registry.session(user).await.lock().await.last_touched = Some(user);
        assert_eq!(registry.session(user).await.lock().await.last_touched, Some(user));
        registry.session(Uuid::new_v4()).await;
        assert_eq!(registry.len().await, 2);
    }
}
