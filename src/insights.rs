//! Dashboard figures, budget tracking and saving goal progress

use crate::error::AssistantError;
use crate::models::{BudgetItem, Contribution, NewTransaction, SavingGoal, Transaction, TransactionKind};
use crate::store::RecordStore;
use crate::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyTotals {
    /// `YYYY-MM`
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: usize,
    pub expense_by_category: Vec<CategoryTotal>,
    pub monthly: Vec<MonthlyTotals>,
}

impl DashboardSummary {
    pub fn compute(transactions: &[Transaction]) -> Self {
        let mut total_income = 0.0;
        let mut total_expenses = 0.0;
        let mut by_category: HashMap<&str, f64> = HashMap::new();
        let mut by_month: BTreeMap<String, (f64, f64)> = BTreeMap::new();

        for tx in transactions {
            let month = by_month
                .entry(tx.date.format("%Y-%m").to_string())
                .or_insert((0.0, 0.0));
            match tx.kind {
                TransactionKind::Income => {
                    total_income += tx.amount;
                    month.0 += tx.amount;
                }
                TransactionKind::Expense => {
                    total_expenses += tx.amount;
                    month.1 += tx.amount;
                    *by_category.entry(tx.category.as_str()).or_insert(0.0) += tx.amount;
                }
            }
        }

        let mut expense_by_category: Vec<CategoryTotal> = by_category
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category: category.to_string(),
                total,
            })
            .collect();
        expense_by_category.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
        });

        Self {
            total_income,
            total_expenses,
            balance: total_income - total_expenses,
            transaction_count: transactions.len(),
            expense_by_category,
            monthly: by_month
                .into_iter()
                .map(|(month, (income, expenses))| MonthlyTotals {
                    month,
                    income,
                    expenses,
                })
                .collect(),
        }
    }
}

//
// ================= Budget =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    OnTrack,
    Watch,
    Near,
    Over,
}

impl BudgetStatus {
    pub fn from_percent(percent: f64) -> Self {
        if percent <= 50.0 {
            BudgetStatus::OnTrack
        } else if percent <= 80.0 {
            BudgetStatus::Watch
        } else if percent <= 100.0 {
            BudgetStatus::Near
        } else {
            BudgetStatus::Over
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetLine {
    pub category: String,
    pub budgeted: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percent: f64,
    pub status: BudgetStatus,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetReport {
    /// `YYYY-MM` of the month being tracked
    pub month: String,
    pub lines: Vec<BudgetLine>,
    pub total_budget: f64,
    pub total_spent: f64,
}

impl BudgetReport {
    /// Spending is this month's expenses in each budgeted category
    pub fn compute(items: &[BudgetItem], transactions: &[Transaction], today: NaiveDate) -> Self {
        let mut spent_by_category: HashMap<String, f64> = HashMap::new();
        for tx in transactions.iter().filter(|tx| {
            tx.kind == TransactionKind::Expense
                && tx.date.year() == today.year()
                && tx.date.month() == today.month()
        }) {
            *spent_by_category.entry(tx.category.to_lowercase()).or_insert(0.0) += tx.amount;
        }

        let lines: Vec<BudgetLine> = items
            .iter()
            .map(|item| {
                let spent = spent_by_category
                    .get(&item.category.to_lowercase())
                    .copied()
                    .unwrap_or(0.0);
                let percent = if item.budgeted_amount > 0.0 {
                    spent / item.budgeted_amount * 100.0
                } else {
                    0.0
                };
                BudgetLine {
                    category: item.category.clone(),
                    budgeted: item.budgeted_amount,
                    spent,
                    remaining: item.budgeted_amount - spent,
                    percent,
                    status: BudgetStatus::from_percent(percent),
                    suggestion: item.suggestion.clone(),
                }
            })
            .collect();

        Self {
            month: today.format("%Y-%m").to_string(),
            total_budget: lines.iter().map(|l| l.budgeted).sum(),
            total_spent: lines.iter().map(|l| l.spent).sum(),
            lines,
        }
    }
}

//
// ================= Goals =================
//

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoalProgress {
    pub index: usize,
    pub goal_title: String,
    pub target_amount: f64,
    pub saved_amount: f64,
    pub monthly_contribution: f64,
    /// Capped at 100
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoalsReport {
    pub goals: Vec<GoalProgress>,
    pub total_target: f64,
    pub total_saved: f64,
    pub total_monthly: f64,
}

impl GoalsReport {
    pub fn compute(goals: &[SavingGoal]) -> Self {
        let progress: Vec<GoalProgress> = goals
            .iter()
            .enumerate()
            .map(|(index, goal)| GoalProgress {
                index,
                goal_title: goal.goal_title.clone(),
                target_amount: goal.target_amount,
                saved_amount: goal.saved_amount,
                monthly_contribution: goal.monthly_contribution,
                percent: if goal.target_amount > 0.0 {
                    (goal.saved_amount / goal.target_amount * 100.0).min(100.0)
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            total_target: goals.iter().map(|g| g.target_amount).sum(),
            total_saved: goals.iter().map(|g| g.saved_amount).sum(),
            total_monthly: goals.iter().map(|g| g.monthly_contribution).sum(),
            goals: progress,
        }
    }
}

/// Add money to a goal and record it as a savings income transaction
pub async fn contribute(
    store: &dyn RecordStore,
    user_id: Uuid,
    goal_index: usize,
    amount: f64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<SavingGoal> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AssistantError::InvalidInput(
            "contribution must be a positive amount".to_string(),
        ));
    }

    let mut goals = store.load_saving_goals(user_id).await?;
    let goal = goals
        .get_mut(goal_index)
        .ok_or_else(|| AssistantError::NotFound(format!("saving goal {}", goal_index)))?;

    goal.saved_amount += amount;
    goal.contributions.push(Contribution {
        id: Uuid::new_v4(),
        amount,
        date: now,
    });
    let updated = goal.clone();

    store.save_saving_goals(user_id, &goals).await?;
    store
        .insert_transaction(
            user_id,
            NewTransaction {
                kind: TransactionKind::Income,
                description: format!("Savings contribution: {}", updated.goal_title),
                amount,
                category: "Savings".to_string(),
                date: today,
            },
        )
        .await?;

    info!(user_id = %user_id, goal_index, amount, "Saving goal contribution recorded");
    Ok(updated)
}

//
// ================= Transaction filtering =================
//

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// Anything but `income` or `expense` (e.g. `all`) means no type filter
    #[serde(rename = "type", default, deserialize_with = "crate::models::lenient_kind")]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub category: Option<String>,
}

pub fn filter_transactions(records: &[Transaction], query: &TransactionQuery) -> Vec<Transaction> {
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let category = query.category.as_deref().filter(|c| !c.is_empty() && *c != "all");

    records
        .iter()
        .filter(|tx| {
            search.as_ref().map_or(true, |needle| {
                tx.description.to_lowercase().contains(needle)
                    || tx.category.to_lowercase().contains(needle)
            })
        })
        .filter(|tx| query.kind.map_or(true, |kind| tx.kind == kind))
        .filter(|tx| category.map_or(true, |c| tx.category == c))
        .cloned()
        .collect()
}

pub fn distinct_categories(records: &[Transaction]) -> Vec<String> {
    records
        .iter()
        .map(|tx| tx.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
