//! Conversational pipeline
//!
//! Free text → local fast paths → model intent analysis → reference
//! resolution → staged batch → explicit confirmation → execution → undo log.
//! Nothing reaches the record store without a matching `confirm` call.

use crate::classifier::{InputClassifier, LocalIntent};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::context::{
    self, intent_prompt, intent_schema, strip_code_fences, system_prompt, FinancialContext,
};
use crate::currency::format_currency;
use crate::error::AssistantError;
use crate::executor::{describe_patch, new_transaction_from, patch_from_operation, OperationExecutor, OperationOutcome};
use crate::llm::{LanguageModel, ModelRequest};
use crate::models::{AssistantReply, Intent, Operation, OperationAction, Transaction, UserProfile};
use crate::planning::PlanSummary;
use crate::resolver;
use crate::session::{
    batch_fingerprint, AssistantMode, AssistantSession, AwaitingAmount, PendingConfirmation, Role,
    SessionRegistry, StagedOperation,
};
use crate::store::RecordStore;
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_CONFIRMATION: &str = "Please confirm this operation:";
const AMOUNT_CONFIRMATION: &str = "Great! Now please confirm this operation:";
const PREVIEW_NAME_LIMIT: usize = 5;

const FALLBACK_SUGGESTIONS: &[&str] = &[
    "spent 500 on food",
    "got salary 50000",
    "sorry 450",
    "delete all shopping",
    "show this month's expenses",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Greeting,
    Reply,
    NeedsAmount,
    ConfirmationRequired,
    Executed,
    Cancelled,
    Undone,
    Fallback,
    PlanQuestion,
    PlanReady,
    Analysis,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfirmationPrompt {
    pub id: Uuid,
    pub message: String,
    pub operations: Vec<StagedOperation>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionProgress {
    pub number: usize,
    pub total: usize,
    pub question: String,
}

/// What the assistant says back after each call
#[derive(Debug, Clone, Serialize)]
pub struct AssistantTurn {
    pub kind: TurnKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<OperationOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Batches that can still be undone
    pub undo_available: usize,
}

impl AssistantTurn {
    pub fn new(kind: TurnKind, message: impl Into<String>, undo_available: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            confirmation: None,
            outcomes: None,
            question: None,
            plan: None,
            suggestions: Vec::new(),
            undo_available,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationDecision {
    pub confirmation_id: Uuid,
    pub confirmed: bool,
    /// Staged operation index → records the user picked among its candidates
    #[serde(default)]
    pub selections: HashMap<usize, Vec<Uuid>>,
}

pub struct Assistant {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) model: Arc<dyn LanguageModel>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: AppConfig,
    pub(crate) sessions: SessionRegistry,
}

impl Assistant {
    pub fn new(
        store: Arc<dyn RecordStore>,
        model: Arc<dyn LanguageModel>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        let sessions = SessionRegistry::new(config.undo_depth);
        Self {
            store,
            model,
            clock,
            config,
            sessions,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // =============================
    // Shared helpers
    // =============================

    /// Key from the user's profile, else the server default
    pub(crate) fn api_key(&self, profile: &UserProfile) -> Result<String> {
        profile
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.config.gemini_api_key.clone())
            .ok_or(AssistantError::MissingApiKey)
    }

    pub(crate) async fn load_context(
        &self,
        user_id: Uuid,
        last_touched: Option<Uuid>,
    ) -> Result<(UserProfile, Vec<Transaction>, FinancialContext)> {
        let profile = self.store.load_profile(user_id).await?;
        let transactions = self.store.list_transactions(user_id).await?;
        let ctx = FinancialContext::build(
            &profile,
            &transactions,
            last_touched,
            self.clock.now(),
            self.clock.today(),
            self.config.recent_limit,
        );
        Ok((profile, transactions, ctx))
    }

    // =============================
    // Chat
    // =============================

    pub async fn start_chat(&self, user_id: Uuid) -> Result<AssistantTurn> {
        let profile = self.store.load_profile(user_id).await?;
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;

        session.mode = AssistantMode::Chat;
        session.conversation.clear();
        session.pending = None;
        session.awaiting_amount = None;
        session.plan = None;

        let name = if profile.name.trim().is_empty() {
            "there"
        } else {
            profile.name.as_str()
        };

        let mut message = format!(
            "Hello {}! I'm your smart AI financial assistant.\n\
             I can help you with:\n\
             - Add: \"spent 500 on food\" / \"got salary\"\n\
             - Update: \"sorry 450\" / \"change to electronics\"\n\
             - Delete: \"delete all food\" / \"remove last 3\"\n\
             - Show: \"show expenses\" / \"food total?\"\n\
             I'll always confirm before making changes. Say \"undo\" to revert the last action. \
             I understand Hindi/English mix too!",
            name
        );
        if !session.undo.is_empty() {
            message.push_str(&format!(
                "\nYou can undo {} recent action(s)",
                session.undo.len()
            ));
        }

        info!(user_id = %user_id, "Chat started");
        Ok(AssistantTurn::new(TurnKind::Greeting, message, session.undo.len()))
    }

    pub async fn handle_message(&self, user_id: Uuid, text: &str) -> Result<AssistantTurn> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::InvalidInput("message is empty".to_string()));
        }

        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;

        if session.pending.is_some() {
            return Err(AssistantError::ConfirmationPending);
        }

        if matches!(session.mode, AssistantMode::SavingPlan | AssistantMode::BudgetPlan) {
            let interviewing = session.plan.as_ref().map_or(false, |plan| !plan.is_complete());
            if interviewing {
                return self.answer_plan_in(&mut session, user_id, text).await;
            }
            // a finished plan stays available to save while the chat goes on
            session.mode = AssistantMode::Chat;
        }

        // -------------------------------------------------
        // Local fast paths
        // -------------------------------------------------
        match InputClassifier::classify(text, session.awaiting_amount.is_some()) {
            LocalIntent::AmountReply(amount) if amount <= 0.0 => {
                return Ok(AssistantTurn::new(
                    TurnKind::NeedsAmount,
                    "The amount must be greater than zero. How much is it?",
                    session.undo.len(),
                ));
            }
            LocalIntent::AmountReply(amount) => {
                if let Some(AwaitingAmount { mut reply }) = session.awaiting_amount.take() {
                    debug!(user_id = %user_id, amount, "Amount supplied for pending add");
                    for op in reply.operations.iter_mut().filter(|op| op.is_missing_amount()) {
                        op.amount = Some(amount);
                    }
                    session.push_entry(Role::User, text);
                    let records = self.store.list_transactions(user_id).await?;
                    return self.stage(&mut session, &records, reply, Some(AMOUNT_CONFIRMATION));
                }
            }
            LocalIntent::Undo => {
                session.awaiting_amount = None;
                return self.undo_from_chat(&mut session, user_id).await;
            }
            LocalIntent::Delegate => {
                session.awaiting_amount = None;
            }
        }

        session.mode = AssistantMode::Chat;

        // -------------------------------------------------
        // Model intent analysis
        // -------------------------------------------------
        let (profile, records, ctx) = self.load_context(user_id, session.last_touched).await?;
        let api_key = self.api_key(&profile)?;

        let prompt = system_prompt(
            &ctx,
            session.recent_history(self.config.history_window),
            &intent_prompt(text),
            None,
        );
        session.push_entry(Role::User, text);

        let raw = self
            .model
            .generate(ModelRequest::json(prompt, intent_schema(), api_key))
            .await?;

        let reply: AssistantReply = match serde_json::from_str(&strip_code_fences(&raw)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Unparseable model reply");
                let mut turn = AssistantTurn::new(
                    TurnKind::Fallback,
                    "I couldn't understand that. Could you please rephrase? Try one of these:",
                    session.undo.len(),
                );
                turn.suggestions = FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
                return Ok(turn);
            }
        };

        if !reply.response_html.trim().is_empty() {
            session.push_entry(Role::Assistant, reply.response_html.clone());
        }

        info!(
            user_id = %user_id,
            intent = ?reply.intent,
            operations = reply.operations.len(),
            "Intent analysed"
        );

        match reply.intent {
            Intent::Undo => self.undo_from_chat(&mut session, user_id).await,
            Intent::TransactionOps if !reply.operations.is_empty() => {
                if let Some(op) = reply.operations.iter().find(|op| op.is_missing_amount()) {
                    let what = op
                        .description
                        .clone()
                        .or_else(|| op.category.clone())
                        .unwrap_or_else(|| "this transaction".to_string());
                    let kind = op
                        .kind
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "a transaction".to_string());
                    let message = format!(
                        "I understood you want to add \"{}\" as {}. How much is the amount?",
                        what, kind
                    );
                    session.awaiting_amount = Some(AwaitingAmount { reply });
                    return Ok(AssistantTurn::new(TurnKind::NeedsAmount, message, session.undo.len()));
                }
                self.stage(&mut session, &records, reply, None)
            }
            _ => {
                let message = if reply.response_html.trim().is_empty() {
                    "I'm here to help with your finances. What would you like to know?".to_string()
                } else {
                    reply.response_html
                };
                Ok(AssistantTurn::new(TurnKind::Reply, message, session.undo.len()))
            }
        }
    }

    /// Put the reply's operations behind a confirmation. Confirmation is
    /// required whatever the model's `requiresConfirmation` says.
    fn stage(
        &self,
        session: &mut AssistantSession,
        records: &[Transaction],
        reply: AssistantReply,
        message_override: Option<&str>,
    ) -> Result<AssistantTurn> {
        let today = self.clock.today();
        let staged: Vec<StagedOperation> = reply
            .operations
            .iter()
            .enumerate()
            .map(|(index, op)| {
                let candidates = candidates_for(records, op, session.last_touched, today);
                StagedOperation {
                    index,
                    operation: op.clone(),
                    preview: preview(op, &candidates, today),
                    candidates,
                }
            })
            .collect();

        let message = message_override
            .map(str::to_string)
            .or_else(|| {
                reply
                    .confirmation_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_CONFIRMATION.to_string());

        let pending = PendingConfirmation::new(staged, reply)?;
        let prompt = ConfirmationPrompt {
            id: pending.id,
            message: message.clone(),
            operations: pending.operations.clone(),
        };

        debug!(confirmation_id = %pending.id, operations = prompt.operations.len(), "Batch staged");
        session.pending = Some(pending);

        let mut turn = AssistantTurn::new(TurnKind::ConfirmationRequired, message, session.undo.len());
        turn.confirmation = Some(prompt);
        Ok(turn)
    }

    pub async fn confirm(&self, user_id: Uuid, decision: ConfirmationDecision) -> Result<AssistantTurn> {
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;

        let pending = match session.pending.take() {
            Some(p) if p.id == decision.confirmation_id => p,
            Some(p) => {
                session.pending = Some(p);
                return Err(AssistantError::StaleConfirmation(
                    decision.confirmation_id.to_string(),
                ));
            }
            None => return Err(AssistantError::NoPendingConfirmation),
        };

        if !decision.confirmed {
            info!(user_id = %user_id, confirmation_id = %pending.id, "Batch cancelled");
            session.push_entry(Role::Assistant, "Operation cancelled");
            return Ok(AssistantTurn::new(
                TurnKind::Cancelled,
                "Operation cancelled",
                session.undo.len(),
            ));
        }

        let operations = match pending
            .operations
            .iter()
            .map(|staged| apply_selection(staged, decision.selections.get(&staged.index)))
            .collect::<Result<Vec<Operation>>>()
        {
            Ok(operations) => operations,
            Err(e) => {
                session.pending = Some(pending);
                return Err(e);
            }
        };

        // the records behind every preview must still be exactly what was shown
        let today = self.clock.today();
        let records = self.store.list_transactions(user_id).await?;
        let current: Vec<StagedOperation> = pending
            .operations
            .iter()
            .map(|staged| StagedOperation {
                candidates: candidates_for(&records, &staged.operation, session.last_touched, today),
                ..staged.clone()
            })
            .collect();
        if batch_fingerprint(&current)? != pending.fingerprint {
            warn!(user_id = %user_id, confirmation_id = %pending.id, "Records changed since staging");
            return Err(AssistantError::StaleConfirmation(pending.id.to_string()));
        }

        let report = OperationExecutor::execute(
            self.store.as_ref(),
            user_id,
            &operations,
            session.last_touched,
            self.clock.today(),
            self.clock.now(),
        )
        .await?;

        session.last_touched = report.last_touched;
        if let Some(batch) = report.undo_batch.clone() {
            session.undo.push(batch);
        }

        let message = report
            .outcomes
            .iter()
            .map(|o| o.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        session.push_entry(Role::Assistant, message.clone());

        let mut turn = AssistantTurn::new(TurnKind::Executed, message, session.undo.len());
        turn.outcomes = Some(report.outcomes);
        Ok(turn)
    }

    // =============================
    // Undo
    // =============================

    pub async fn undo(&self, user_id: Uuid) -> Result<AssistantTurn> {
        let handle = self.sessions.session(user_id).await;
        let mut session = handle.lock().await;
        self.undo_in(&mut session, user_id).await
    }

    async fn undo_in(&self, session: &mut AssistantSession, user_id: Uuid) -> Result<AssistantTurn> {
        session.awaiting_amount = None;
        let report = session.undo.undo_last(self.store.as_ref(), user_id).await?;

        let mut lines = report.messages.clone();
        lines.extend(report.failures.iter().cloned());
        lines.push(if report.messages.is_empty() {
            "The last action could not be undone".to_string()
        } else {
            "Last action has been undone".to_string()
        });
        let message = lines.join("\n");
        session.push_entry(Role::Assistant, message.clone());

        Ok(AssistantTurn::new(TurnKind::Undone, message, session.undo.len()))
    }

    /// Typed "undo" with nothing to undo is an answer, not an error
    async fn undo_from_chat(&self, session: &mut AssistantSession, user_id: Uuid) -> Result<AssistantTurn> {
        match self.undo_in(session, user_id).await {
            Err(AssistantError::NothingToUndo) => Ok(AssistantTurn::new(
                TurnKind::Reply,
                "There is nothing to undo right now.",
                0,
            )),
            other => other,
        }
    }

    pub async fn undo_available(&self, user_id: Uuid) -> usize {
        self.sessions.session(user_id).await.lock().await.undo.len()
    }

    // =============================
    // Expense analysis
    // =============================

    pub async fn analysis(&self, user_id: Uuid) -> Result<AssistantTurn> {
        let (profile, _, ctx) = self.load_context(user_id, None).await?;
        let undo_available = self.undo_available(user_id).await;

        let message = match profile.expense_analysis_report {
            Some(report) if !report.trim().is_empty() => report,
            _ => default_analysis(&ctx),
        };
        Ok(AssistantTurn::new(TurnKind::Analysis, message, undo_available))
    }

    pub async fn generate_analysis(&self, user_id: Uuid) -> Result<AssistantTurn> {
        let (mut profile, _, ctx) = self.load_context(user_id, None).await?;
        let api_key = self.api_key(&profile)?;

        let prompt = system_prompt(
            &ctx,
            &[],
            context::analysis_prompt(),
            Some(context::analysis_instructions()),
        );
        let raw = self.model.generate(ModelRequest::text(prompt, api_key)).await?;
        let report = strip_code_fences(&raw);
        if report.is_empty() {
            return Err(AssistantError::InvalidModelReply(
                "empty expense analysis".to_string(),
            ));
        }

        profile.expense_analysis_report = Some(report.clone());
        profile.initial_analysis_generated = true;
        self.store.save_profile(&profile).await?;

        info!(user_id = %user_id, chars = report.len(), "Expense analysis saved");
        let undo_available = self.undo_available(user_id).await;
        Ok(AssistantTurn::new(TurnKind::Analysis, report, undo_available))
    }
}

fn default_analysis(ctx: &FinancialContext) -> String {
    if ctx.transaction_count == 0 {
        return "Your expense analysis will appear here once you have some transactions.\n\
                Add some transactions and request an expense analysis to get personalized insights."
            .to_string();
    }

    let mut lines = vec!["Here's a quick look at your spending:".to_string()];
    for (i, (category, amount)) in ctx.top_categories.iter().enumerate() {
        lines.push(format!(
            "\n{}. **{}**\nYou've spent {} on {}. Consider tracking this category more closely to optimize your spending.",
            i + 1,
            category,
            format_currency(*amount, true),
            category
        ));
    }
    lines.join("\n")
}

/// Records an update or delete would touch, as shown to the user
fn candidates_for(
    records: &[Transaction],
    op: &Operation,
    last_touched: Option<Uuid>,
    today: NaiveDate,
) -> Vec<Transaction> {
    match op.action {
        OperationAction::Update => match resolver::usable_criteria(op, today) {
            Some(criteria) if op.transaction_id.is_none() => {
                let matches = resolver::find_matches(records, criteria, today);
                if matches.is_empty() {
                    resolver::resolve_update_target(records, op, last_touched, today)
                        .into_iter()
                        .cloned()
                        .collect()
                } else {
                    matches.into_iter().cloned().collect()
                }
            }
            _ => resolver::resolve_update_target(records, op, last_touched, today)
                .into_iter()
                .cloned()
                .collect(),
        },
        OperationAction::Delete => resolver::resolve_delete_targets(records, op, today)
            .into_iter()
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

fn preview(op: &Operation, candidates: &[Transaction], today: NaiveDate) -> String {
    match op.action {
        OperationAction::Add => match new_transaction_from(op, today) {
            Ok(new) => format!(
                "Add {}: {} - {} ({})",
                new.kind,
                new.description,
                format_currency(new.amount, true),
                new.category
            ),
            Err(reason) => format!("Add: incomplete ({})", reason),
        },
        OperationAction::Update => {
            let changes = describe_patch(&patch_from_operation(op));
            let changes = if changes.is_empty() {
                "no changes given".to_string()
            } else {
                changes
            };
            match candidates.first() {
                Some(tx) if candidates.len() == 1 => {
                    format!("Update \"{}\": {}", tx.description, changes)
                }
                Some(tx) => format!(
                    "Update \"{}\" ({} matches): {}",
                    tx.description,
                    candidates.len(),
                    changes
                ),
                None => format!("Update (no matching transaction found): {}", changes),
            }
        }
        OperationAction::Delete => {
            if candidates.is_empty() {
                return "Delete: no matching transactions found".to_string();
            }
            let more = candidates.len().saturating_sub(PREVIEW_NAME_LIMIT);
            let more_label = format!("and {} more", more);
            let mut names: Vec<&str> = candidates
                .iter()
                .take(PREVIEW_NAME_LIMIT)
                .map(|tx| tx.description.as_str())
                .collect();
            if more > 0 {
                names.push(more_label.as_str());
            }
            let total: f64 = candidates.iter().map(|tx| tx.amount).sum();
            format!(
                "Delete {} transaction(s): {} (Total: {})",
                candidates.len(),
                names.join(", "),
                format_currency(total, true)
            )
        }
        OperationAction::Unknown => "Unknown action".to_string(),
    }
}

/// Pin an update or delete to the records the user saw, narrowed to the
/// ones they picked. Picks outside the candidates are rejected.
fn apply_selection(staged: &StagedOperation, selected: Option<&Vec<Uuid>>) -> Result<Operation> {
    let mut op = staged.operation.clone();
    if !matches!(op.action, OperationAction::Update | OperationAction::Delete) {
        return Ok(op);
    }

    let targets: Vec<Uuid> = match selected {
        Some(selected) if selected.is_empty() => {
            return Err(AssistantError::InvalidInput(format!(
                "no transaction selected for operation {}",
                staged.index + 1
            )));
        }
        Some(selected) => {
            if let Some(unknown) = selected
                .iter()
                .find(|id| !staged.candidates.iter().any(|tx| tx.id == **id))
            {
                return Err(AssistantError::InvalidInput(format!(
                    "transaction {} was not offered for operation {}",
                    unknown,
                    staged.index + 1
                )));
            }
            selected.clone()
        }
        None => staged.candidates.iter().map(|tx| tx.id).collect(),
    };

    match op.action {
        OperationAction::Update => {
            if let Some(first) = targets.first() {
                op.transaction_id = Some(first.to_string());
            }
        }
        _ => {
            op.transaction_ids = Some(targets.iter().map(Uuid::to_string).collect());
        }
    }
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentifyBy, TransactionKind};
    use chrono::Utc;

    fn tx(description: &str, category: &str, amount: f64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Expense,
            description: description.to_string(),
            amount,
            category: category.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 14).unwrap()
    }

    #[test]
    fn test_previews() {
        let add = Operation {
            action: OperationAction::Add,
            kind: Some(TransactionKind::Expense),
            description: Some("Coffee".to_string()),
            amount: Some(2500.0),
            category: Some("Food".to_string()),
            ..Default::default()
        };
        assert_eq!(preview(&add, &[], today()), "Add expense: Coffee - ₹2.5K (Food)");

        let records = vec![tx("Phone", "Electronics", 4000.0)];
        let update = Operation {
            action: OperationAction::Update,
            amount: Some(5000.0),
            ..Default::default()
        };
        assert_eq!(
            preview(&update, &records, today()),
            "Update \"Phone\": amount to ₹5.0K"
        );

        let delete = Operation {
            action: OperationAction::Delete,
            ..Default::default()
        };
        assert_eq!(preview(&delete, &[], today()), "Delete: no matching transactions found");
    }

    #[test]
    fn test_delete_preview_truncates_names() {
        let records: Vec<Transaction> = (0..7).map(|i| tx(&format!("t{}", i), "Food", 100.0)).collect();
        let delete = Operation {
            action: OperationAction::Delete,
            ..Default::default()
        };
        assert_eq!(
            preview(&delete, &records, today()),
            "Delete 7 transaction(s): t0, t1, t2, t3, t4, and 2 more (Total: ₹700)"
        );
    }

    #[test]
    fn test_update_candidates_list_every_match() {
        let records = vec![tx("Lunch", "Food", 300.0), tx("Dinner", "Food", 700.0), tx("Cab", "Travel", 250.0)];
        let op = Operation {
            action: OperationAction::Update,
            amount: Some(10.0),
            identify_by: Some(IdentifyBy {
                category: Some("food".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(candidates_for(&records, &op, None, today()).len(), 2);

        let by_context = Operation {
            action: OperationAction::Update,
            amount: Some(10.0),
            ..Default::default()
        };
        let cab = records[2].id;
        let picked = candidates_for(&records, &by_context, Some(cab), today());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, cab);
    }

    #[test]
    fn test_selection_pins_targets_to_candidates() {
        let lunch = tx("Lunch", "Food", 300.0);
        let dinner = tx("Dinner", "Food", 700.0);
        let staged = StagedOperation {
            index: 0,
            operation: Operation {
                action: OperationAction::Delete,
                identify_by: Some(IdentifyBy {
                    category: Some("Food".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            preview: String::new(),
            candidates: vec![lunch.clone(), dinner.clone()],
        };

        let picked = apply_selection(&staged, Some(&vec![dinner.id])).unwrap();
        assert_eq!(picked.transaction_ids, Some(vec![dinner.id.to_string()]));

        let everything = apply_selection(&staged, None).unwrap();
        assert_eq!(
            everything.transaction_ids,
            Some(vec![lunch.id.to_string(), dinner.id.to_string()])
        );

        assert!(matches!(
            apply_selection(&staged, Some(&vec![Uuid::new_v4()])),
            Err(AssistantError::InvalidInput(_))
        ));
        assert!(matches!(
            apply_selection(&staged, Some(&Vec::new())),
            Err(AssistantError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_update_selection_uses_the_picked_record() {
        let lunch = tx("Lunch", "Food", 300.0);
        let dinner = tx("Dinner", "Food", 700.0);
        let staged = StagedOperation {
            index: 0,
            operation: Operation {
                action: OperationAction::Update,
                amount: Some(10.0),
                ..Default::default()
            },
            preview: String::new(),
            candidates: vec![lunch.clone(), dinner.clone()],
        };

        let op = apply_selection(&staged, Some(&vec![dinner.id])).unwrap();
        assert_eq!(op.transaction_id, Some(dinner.id.to_string()));
        let op = apply_selection(&staged, None).unwrap();
        assert_eq!(op.transaction_id, Some(lunch.id.to_string()));
    }
}
