//! Undo log
//!
//! One entry per confirmed batch. Undoing pops the newest entry and
//! reverses its steps in reverse order of application.

use crate::error::AssistantError;
use crate::models::Transaction;
use crate::store::RecordStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum UndoStep {
    RemoveAdded(Transaction),
    RestoreDeleted(Vec<Transaction>),
    /// Holds the record as it was before the update
    RevertUpdate(Transaction),
}

#[derive(Debug, Clone)]
pub struct UndoBatch {
    pub id: Uuid,
    pub steps: Vec<UndoStep>,
    pub created_at: DateTime<Utc>,
}

impl UndoBatch {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            steps: Vec::new(),
            created_at,
        }
    }

    pub fn push(&mut self, step: UndoStep) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UndoReport {
    pub batch_id: Uuid,
    pub messages: Vec<String>,
    pub failures: Vec<String>,
}

/// Bounded stack; the oldest batch is dropped once full
#[derive(Debug, Clone)]
pub struct UndoLog {
    entries: VecDeque<UndoBatch>,
    capacity: usize,
}

impl UndoLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, batch: UndoBatch) {
        if self.capacity == 0 || batch.is_empty() {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(batch);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pop(&mut self) -> Option<UndoBatch> {
        self.entries.pop_back()
    }

    /// Reverse the newest batch. The batch leaves the log even when some
    /// of its steps cannot be reversed; those show up in `failures`.
    pub async fn undo_last(&mut self, store: &dyn RecordStore, user_id: Uuid) -> Result<UndoReport> {
        let batch = self.pop().ok_or(AssistantError::NothingToUndo)?;

        let mut messages = Vec::new();
        let mut failures = Vec::new();

        for step in batch.steps.iter().rev() {
            match step {
                UndoStep::RemoveAdded(tx) => match store.delete_transaction(user_id, tx.id).await {
                    Ok(true) => messages.push("Transaction addition undone".to_string()),
                    Ok(false) => failures.push(format!(
                        "Added transaction \"{}\" no longer exists",
                        tx.description
                    )),
                    Err(e) => failures.push(format!("Could not remove \"{}\": {}", tx.description, e)),
                },
                UndoStep::RestoreDeleted(records) => {
                    let mut restored = 0;
                    for tx in records {
                        match store.restore_transaction(user_id, tx).await {
                            Ok(()) => restored += 1,
                            Err(e) => failures.push(format!(
                                "Could not restore \"{}\": {}",
                                tx.description, e
                            )),
                        }
                    }
                    if restored > 0 {
                        messages.push(format!("Restored {} transaction(s)", restored));
                    }
                }
                UndoStep::RevertUpdate(original) => {
                    match store.replace_transaction(user_id, original).await {
                        Ok(()) => messages.push("Transaction update undone".to_string()),
                        Err(e) => failures.push(format!(
                            "Could not revert \"{}\": {}",
                            original.description, e
                        )),
                    }
                }
            }
        }

        if failures.is_empty() {
            info!(user_id = %user_id, batch_id = %batch.id, steps = batch.steps.len(), "Undo applied");
        } else {
            warn!(
                user_id = %user_id,
                batch_id = %batch.id,
                failures = failures.len(),
                "Undo applied with failures"
            );
        }

        Ok(UndoReport {
            batch_id: batch.id,
            messages,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransaction, TransactionKind, TransactionPatch};
    use crate::store::InMemoryRecordStore;
    use chrono::NaiveDate;

    fn new_tx(description: &str, amount: f64) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            description: description.to_string(),
            amount,
            category: "Food".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        }
    }

    fn batch_with(steps: Vec<UndoStep>) -> UndoBatch {
        let mut batch = UndoBatch::new(Utc::now());
        for step in steps {
            batch.push(step);
        }
        batch
    }

    #[test]
    fn test_log_is_bounded_and_lifo() {
        let mut log = UndoLog::new(2);
        let tx = new_tx("a", 1.0).into_transaction(Uuid::new_v4(), Utc::now());

        let first = batch_with(vec![UndoStep::RemoveAdded(tx.clone())]);
        let second = batch_with(vec![UndoStep::RemoveAdded(tx.clone())]);
        let third = batch_with(vec![UndoStep::RemoveAdded(tx)]);
        let (first_id, third_id) = (first.id, third.id);

        log.push(first);
        log.push(second);
        log.push(third);
        log.push(UndoBatch::new(Utc::now()));

        assert_eq!(log.len(), 2);
        assert_eq!(log.pop().unwrap().id, third_id);
        assert_ne!(log.pop().unwrap().id, first_id);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_undo_reverses_a_mixed_batch() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();

        let phone = store.insert_transaction(user, new_tx("Phone", 4000.0)).await.unwrap();
        let snack = store.insert_transaction(user, new_tx("Snack", 50.0)).await.unwrap();

        // batch: add coffee, update phone, delete snack
        let coffee = store.insert_transaction(user, new_tx("Coffee", 120.0)).await.unwrap();
        let patch = TransactionPatch {
            amount: Some(5000.0),
            ..Default::default()
        };
        store.update_transaction(user, phone.id, &patch).await.unwrap();
        store.delete_transaction(user, snack.id).await.unwrap();

        let mut log = UndoLog::new(10);
        log.push(batch_with(vec![
            UndoStep::RemoveAdded(coffee.clone()),
            UndoStep::RevertUpdate(phone.clone()),
            UndoStep::RestoreDeleted(vec![snack.clone()]),
        ]));

        let report = log.undo_last(&store, user).await.unwrap();
        assert_eq!(
            report.messages,
            vec![
                "Restored 1 transaction(s)",
                "Transaction update undone",
                "Transaction addition undone"
            ]
        );
        assert!(report.failures.is_empty());

        let remaining = store.list_transactions(user).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&phone));
        assert!(remaining.contains(&snack));
        assert!(store.get_transaction(user, coffee.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undo_reports_missing_records_and_still_pops() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();
        let ghost = new_tx("Ghost", 10.0).into_transaction(Uuid::new_v4(), Utc::now());

        let mut log = UndoLog::new(10);
        log.push(batch_with(vec![UndoStep::RemoveAdded(ghost)]));

        let report = log.undo_last(&store, user).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(log.is_empty());
        assert!(matches!(
            log.undo_last(&store, user).await,
            Err(AssistantError::NothingToUndo)
        ));
    }
}
