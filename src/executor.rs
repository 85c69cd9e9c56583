//! Operation executor
//!
//! Applies a confirmed batch to the record store one operation at a time.
//! A failing operation is reported and skipped; the rest still run. The
//! model is never consulted here.

use crate::currency::format_currency;
use crate::models::{NewTransaction, Operation, OperationAction, Transaction, TransactionPatch};
use crate::resolver::{self, parse_date};
use crate::store::{newest_first, RecordStore};
use crate::undo::{UndoBatch, UndoStep};
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationOutcome {
    pub index: usize,
    pub action: OperationAction,
    pub success: bool,
    pub message: String,
    /// Records created, changed or removed by this operation
    pub transaction_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcomes: Vec<OperationOutcome>,
    /// `None` when nothing succeeded
    pub undo_batch: Option<UndoBatch>,
    pub last_touched: Option<Uuid>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Fields an update operation carries, as a patch
pub fn patch_from_operation(op: &Operation) -> TransactionPatch {
    TransactionPatch {
        kind: op.kind,
        description: op
            .description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        amount: op.amount,
        category: op
            .category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        date: op.date.as_deref().and_then(parse_date),
    }
}

/// `amount to ₹5.0K, category to "Food"`
pub fn describe_patch(patch: &TransactionPatch) -> String {
    let mut parts = Vec::new();
    if let Some(amount) = patch.amount {
        parts.push(format!("amount to {}", format_currency(amount, true)));
    }
    if let Some(description) = &patch.description {
        parts.push(format!("description to \"{}\"", description));
    }
    if let Some(category) = &patch.category {
        parts.push(format!("category to \"{}\"", category));
    }
    if let Some(kind) = patch.kind {
        parts.push(format!("type to {}", kind));
    }
    if let Some(date) = patch.date {
        parts.push(format!("date to {}", date));
    }
    parts.join(", ")
}

/// Build the record an add operation describes, filling defaults
pub fn new_transaction_from(op: &Operation, today: NaiveDate) -> std::result::Result<NewTransaction, String> {
    let kind = op
        .kind
        .ok_or_else(|| "Transaction type (income or expense) is required".to_string())?;

    let amount = match op.amount {
        Some(a) if a.is_finite() && a > 0.0 => a,
        _ => return Err("A positive amount is required".to_string()),
    };

    let category = op
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    let description = op
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| category.clone());

    Ok(NewTransaction {
        kind,
        description,
        amount,
        category,
        date: op.date.as_deref().and_then(parse_date).unwrap_or(today),
    })
}

pub struct OperationExecutor;

impl OperationExecutor {
    pub async fn execute(
        store: &dyn RecordStore,
        user_id: Uuid,
        operations: &[Operation],
        last_touched: Option<Uuid>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ExecutionReport> {
        let mut records = store.list_transactions(user_id).await?;
        let mut batch = UndoBatch::new(now);
        let mut last_touched = last_touched;
        let mut outcomes = Vec::with_capacity(operations.len());

        debug!(user_id = %user_id, operations = operations.len(), "Starting batch execution");

        for (index, op) in operations.iter().enumerate() {
            let outcome = match op.action {
                OperationAction::Add => {
                    Self::apply_add(store, user_id, op, today, &mut records, &mut batch, &mut last_touched)
                        .await
                }
                OperationAction::Update => {
                    Self::apply_update(store, user_id, op, today, &mut records, &mut batch, &mut last_touched)
                        .await
                }
                OperationAction::Delete => {
                    Self::apply_delete(store, user_id, op, today, &mut records, &mut batch, &mut last_touched)
                        .await
                }
                OperationAction::Unknown => Err("Unknown action".to_string()),
            };

            let outcome = match outcome {
                Ok((message, transaction_ids)) => OperationOutcome {
                    index,
                    action: op.action,
                    success: true,
                    message,
                    transaction_ids,
                },
                Err(message) => {
                    warn!(user_id = %user_id, index, action = %op.action, %message, "Operation failed");
                    OperationOutcome {
                        index,
                        action: op.action,
                        success: false,
                        message,
                        transaction_ids: Vec::new(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = ExecutionReport {
            outcomes,
            undo_batch: if batch.is_empty() { None } else { Some(batch) },
            last_touched,
        };

        info!(
            user_id = %user_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch executed"
        );

        Ok(report)
    }

    async fn apply_add(
        store: &dyn RecordStore,
        user_id: Uuid,
        op: &Operation,
        today: NaiveDate,
        records: &mut Vec<Transaction>,
        batch: &mut UndoBatch,
        last_touched: &mut Option<Uuid>,
    ) -> std::result::Result<(String, Vec<Uuid>), String> {
        let new = new_transaction_from(op, today)?;
        let tx = store
            .insert_transaction(user_id, new)
            .await
            .map_err(|e| format!("Failed to add transaction: {}", e))?;

        let message = format!(
            "Added {}: {} - {}",
            tx.kind,
            tx.description,
            format_currency(tx.amount, true)
        );

        *last_touched = Some(tx.id);
        batch.push(UndoStep::RemoveAdded(tx.clone()));
        records.push(tx.clone());
        records.sort_by(newest_first);

        Ok((message, vec![tx.id]))
    }

    async fn apply_update(
        store: &dyn RecordStore,
        user_id: Uuid,
        op: &Operation,
        today: NaiveDate,
        records: &mut [Transaction],
        batch: &mut UndoBatch,
        last_touched: &mut Option<Uuid>,
    ) -> std::result::Result<(String, Vec<Uuid>), String> {
        let original = resolver::resolve_update_target(records, op, *last_touched, today)
            .cloned()
            .ok_or_else(|| "Could not find the transaction to update. Please be more specific.".to_string())?;

        let patch = patch_from_operation(op);
        if patch.is_empty() {
            return Err(format!("Nothing to change on \"{}\"", original.description));
        }

        let updated = store
            .update_transaction(user_id, original.id, &patch)
            .await
            .map_err(|e| format!("Failed to update \"{}\": {}", original.description, e))?;

        let message = format!(
            "Updated \"{}\" - {}",
            original.description,
            describe_patch(&patch)
        );

        if let Some(slot) = records.iter_mut().find(|tx| tx.id == updated.id) {
            *slot = updated.clone();
        }
        records.sort_by(newest_first);
        *last_touched = Some(updated.id);
        batch.push(UndoStep::RevertUpdate(original));

        Ok((message, vec![updated.id]))
    }

    async fn apply_delete(
        store: &dyn RecordStore,
        user_id: Uuid,
        op: &Operation,
        today: NaiveDate,
        records: &mut Vec<Transaction>,
        batch: &mut UndoBatch,
        last_touched: &mut Option<Uuid>,
    ) -> std::result::Result<(String, Vec<Uuid>), String> {
        let targets: Vec<Transaction> = resolver::resolve_delete_targets(records, op, today)
            .into_iter()
            .cloned()
            .collect();

        let mut deleted = Vec::with_capacity(targets.len());
        for tx in targets {
            match store.delete_transaction(user_id, tx.id).await {
                Ok(true) => deleted.push(tx),
                Ok(false) => debug!(transaction_id = %tx.id, "Already gone"),
                Err(e) => warn!(transaction_id = %tx.id, error = %e, "Delete failed"),
            }
        }

        if deleted.is_empty() {
            return Err("No transactions found matching the criteria".to_string());
        }

        let ids: Vec<Uuid> = deleted.iter().map(|tx| tx.id).collect();
        let total: f64 = deleted.iter().map(|tx| tx.amount).sum();
        let names: Vec<&str> = deleted.iter().map(|tx| tx.description.as_str()).collect();

        let message = format!(
            "Deleted {} transaction(s): {} (Total: {})",
            deleted.len(),
            names.join(", "),
            format_currency(total, true)
        );

        records.retain(|tx| !ids.contains(&tx.id));
        if last_touched.map_or(false, |id| ids.contains(&id)) {
            *last_touched = None;
        }
        batch.push(UndoStep::RestoreDeleted(deleted));

        Ok((message, ids))
    }
}
