//! Record store
//!
//! Per-user documents: transactions, the profile, the budget plan and the
//! saving goals. In-memory for development and tests, Postgres when a
//! database URL is configured.

use crate::config::AppConfig;
use crate::error::AssistantError;
use crate::models::{BudgetItem, NewTransaction, SavingGoal, Transaction, TransactionPatch, UserProfile};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

pub mod postgres;
pub use postgres::PostgresRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Newest first: date descending, then creation time descending
    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>>;
    async fn get_transaction(&self, user_id: Uuid, id: Uuid) -> Result<Option<Transaction>>;
    async fn insert_transaction(&self, user_id: Uuid, new: NewTransaction) -> Result<Transaction>;
    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: &TransactionPatch,
    ) -> Result<Transaction>;
    /// Overwrite a stored record with the given version
    async fn replace_transaction(&self, user_id: Uuid, tx: &Transaction) -> Result<()>;
    /// Returns false when the record did not exist
    async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<bool>;
    /// Re-insert a previously deleted record keeping its id
    async fn restore_transaction(&self, user_id: Uuid, tx: &Transaction) -> Result<()>;

    async fn load_profile(&self, user_id: Uuid) -> Result<UserProfile>;
    async fn save_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn load_budget(&self, user_id: Uuid) -> Result<Vec<BudgetItem>>;
    async fn save_budget(&self, user_id: Uuid, items: &[BudgetItem]) -> Result<()>;

    async fn load_saving_goals(&self, user_id: Uuid) -> Result<Vec<SavingGoal>>;
    async fn save_saving_goals(&self, user_id: Uuid, goals: &[SavingGoal]) -> Result<()>;
}

pub(crate) fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.date.cmp(&a.date).then_with(|| b.created_at.cmp(&a.created_at))
}

#[derive(Default)]
struct UserRecords {
    transactions: HashMap<Uuid, Transaction>,
    profile: Option<UserProfile>,
    budget: Vec<BudgetItem>,
    goals: Vec<SavingGoal>,
}

/// In-memory record store for development
pub struct InMemoryRecordStore {
    users: Arc<RwLock<HashMap<Uuid, UserRecords>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(id: Uuid) -> AssistantError {
    AssistantError::NotFound(format!("transaction {}", id))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let users = self.users.read().await;
        let mut records: Vec<Transaction> = users
            .get(&user_id)
            .map(|u| u.transactions.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(newest_first);
        Ok(records)
    }

    async fn get_transaction(&self, user_id: Uuid, id: Uuid) -> Result<Option<Transaction>> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .and_then(|u| u.transactions.get(&id))
            .cloned())
    }

    async fn insert_transaction(&self, user_id: Uuid, new: NewTransaction) -> Result<Transaction> {
        let tx = new.into_transaction(Uuid::new_v4(), Utc::now());
        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_default()
            .transactions
            .insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: &TransactionPatch,
    ) -> Result<Transaction> {
        let mut users = self.users.write().await;
        let tx = users
            .get_mut(&user_id)
            .and_then(|u| u.transactions.get_mut(&id))
            .ok_or_else(|| missing(id))?;
        patch.apply(tx);
        Ok(tx.clone())
    }

    async fn replace_transaction(&self, user_id: Uuid, tx: &Transaction) -> Result<()> {
        let mut users = self.users.write().await;
        let slot = users
            .get_mut(&user_id)
            .and_then(|u| u.transactions.get_mut(&tx.id))
            .ok_or_else(|| missing(tx.id))?;
        *slot = tx.clone();
        Ok(())
    }

    async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(&user_id)
            .and_then(|u| u.transactions.remove(&id))
            .is_some())
    }

    async fn restore_transaction(&self, user_id: Uuid, tx: &Transaction) -> Result<()> {
        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_default()
            .transactions
            .insert(tx.id, tx.clone());
        Ok(())
    }

    async fn load_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .and_then(|u| u.profile.clone())
            .unwrap_or_else(|| UserProfile::new(user_id)))
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut users = self.users.write().await;
        users.entry(profile.user_id).or_default().profile = Some(profile.clone());
        Ok(())
    }

    async fn load_budget(&self, user_id: Uuid) -> Result<Vec<BudgetItem>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).map(|u| u.budget.clone()).unwrap_or_default())
    }

    async fn save_budget(&self, user_id: Uuid, items: &[BudgetItem]) -> Result<()> {
        let mut users = self.users.write().await;
        users.entry(user_id).or_default().budget = items.to_vec();
        Ok(())
    }

    async fn load_saving_goals(&self, user_id: Uuid) -> Result<Vec<SavingGoal>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).map(|u| u.goals.clone()).unwrap_or_default())
    }

    async fn save_saving_goals(&self, user_id: Uuid, goals: &[SavingGoal]) -> Result<()> {
        let mut users = self.users.write().await;
        users.entry(user_id).or_default().goals = goals.to_vec();
        Ok(())
    }
}

/// Postgres when a database URL is configured, in-memory otherwise
pub fn build_store(config: &AppConfig) -> Arc<dyn RecordStore> {
    if let Some(url) = &config.database_url {
        match PostgresRecordStore::connect_lazy(url) {
            Ok(store) => {
                info!("Record store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres record store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Record store backend: in-memory");
    Arc::new(InMemoryRecordStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;
    use chrono::NaiveDate;

    fn new_tx(description: &str, amount: f64, date: &str) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Expense,
            description: description.to_string(),
            amount,
            category: "Food".to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_per_user() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();

        store.insert_transaction(user, new_tx("old", 10.0, "2025-06-01")).await.unwrap();
        store.insert_transaction(user, new_tx("new", 20.0, "2025-07-01")).await.unwrap();
        store.insert_transaction(user, new_tx("newer same day", 30.0, "2025-07-01")).await.unwrap();
        store
            .insert_transaction(Uuid::new_v4(), new_tx("someone else", 5.0, "2025-07-02"))
            .await
            .unwrap();

        let listed: Vec<String> = store
            .list_transactions(user)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.description)
            .collect();
        assert_eq!(listed, vec!["newer same day", "new", "old"]);
    }

    #[tokio::test]
    async fn test_update_delete_restore() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();
        let tx = store.insert_transaction(user, new_tx("Phone", 4000.0, "2025-07-01")).await.unwrap();

        let patch = TransactionPatch {
            amount: Some(5000.0),
            ..Default::default()
        };
        let updated = store.update_transaction(user, tx.id, &patch).await.unwrap();
        assert_eq!(updated.amount, 5000.0);

        store.replace_transaction(user, &tx).await.unwrap();
        assert_eq!(store.get_transaction(user, tx.id).await.unwrap().unwrap().amount, 4000.0);

        assert!(store.delete_transaction(user, tx.id).await.unwrap());
        assert!(!store.delete_transaction(user, tx.id).await.unwrap());
        assert!(matches!(
            store.update_transaction(user, tx.id, &patch).await,
            Err(AssistantError::NotFound(_))
        ));

        store.restore_transaction(user, &tx).await.unwrap();
        assert_eq!(store.get_transaction(user, tx.id).await.unwrap(), Some(tx));
    }

    #[tokio::test]
    async fn test_profile_defaults_and_documents() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();

        let profile = store.load_profile(user).await.unwrap();
        assert_eq!(profile.user_id, user);
        assert!(!profile.initial_analysis_generated);

        let items = vec![BudgetItem {
            category: "Food".to_string(),
            budgeted_amount: 5000.0,
            current_spending: None,
            suggestion: String::new(),
        }];
        store.save_budget(user, &items).await.unwrap();
        assert_eq!(store.load_budget(user).await.unwrap(), items);
        assert!(store.load_saving_goals(user).await.unwrap().is_empty());
    }

    #[test]
    fn test_build_store_without_url_is_in_memory() {
        let store = build_store(&AppConfig::default());
        let listed = tokio_test::block_on(store.list_transactions(Uuid::new_v4())).unwrap();
        assert!(listed.is_empty());
    }
}
