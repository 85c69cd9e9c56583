//! Core data models: stored records and the structured replies the
//! language model sends back

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for TransactionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
}

impl NewTransaction {
    pub fn into_transaction(self, id: Uuid, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            description: self.description,
            amount: self.amount,
            category: self.category,
            date: self.date,
            created_at,
        }
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.date.is_none()
    }

    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(kind) = self.kind {
            tx.kind = kind;
        }
        if let Some(description) = &self.description {
            tx.description = description.clone();
        }
        if let Some(amount) = self.amount {
            tx.amount = amount;
        }
        if let Some(category) = &self.category {
            tx.category = category.clone();
        }
        if let Some(date) = self.date {
            tx.date = date;
        }
    }
}

//
// ================= Budget & Goals =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub category: String,
    #[serde(default)]
    pub budgeted_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_spending: Option<f64>,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavingGoal {
    pub goal_title: String,
    #[serde(default)]
    pub target_amount: f64,
    #[serde(default)]
    pub monthly_contribution: f64,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub saved_amount: f64,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contribution {
    pub id: Uuid,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

//
// ================= User Profile =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub expected_salary: Option<f64>,
    /// Never echoed back over the API
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub expense_analysis_report: Option<String>,
    #[serde(default)]
    pub initial_analysis_generated: bool,
}

impl UserProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            name: String::new(),
            email: String::new(),
            occupation: None,
            expected_salary: None,
            api_key: None,
            expense_analysis_report: None,
            initial_analysis_generated: false,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "User"
        } else {
            &self.name
        }
    }
}

//
// ================= Model Reply =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TransactionOps,
    ShowData,
    GeneralChat,
    ComplexQuery,
    Undo,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Add,
    Update,
    Delete,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OperationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationAction::Add => "add",
            OperationAction::Update => "update",
            OperationAction::Delete => "delete",
            OperationAction::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Criteria used to find existing transactions by their properties
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<TransactionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,
}

/// Batch-delete filter; every field left out widens the match
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<TransactionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub action: OperationAction,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_kind",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<TransactionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identify_by: Option<IdentifyBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DeleteFilter>,
}

impl Operation {
    /// An add is incomplete until it carries a non-zero amount
    pub fn is_missing_amount(&self) -> bool {
        self.action == OperationAction::Add && self.amount.map_or(true, |a| a == 0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

/// Structured reply to the intent-analysis prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub intent: Intent,
    #[serde(default)]
    pub sub_intent: Option<String>,
    #[serde(default)]
    pub requires_confirmation: Option<bool>,
    #[serde(default)]
    pub confirmation_message: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub query_params: Option<QueryParams>,
    #[serde(rename = "response_html", default, deserialize_with = "null_as_default")]
    pub response_html: String,
    #[serde(default)]
    pub requires_data: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Unknown or malformed transaction types become `None` rather than
/// failing the whole reply
pub(crate) fn lenient_kind<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<TransactionKind>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_parses_model_json() {
        let raw = r#"{
            "intent": "transaction_ops",
            "subIntent": "add_expense",
            "requiresConfirmation": true,
            "confirmationMessage": "Add this expense?",
            "operations": [
                {"action": "add", "type": "Expense", "description": "Coffee", "amount": 120, "category": "Food"}
            ],
            "response_html": "<p>Adding coffee</p>"
        }"#;

        let reply: AssistantReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.intent, Intent::TransactionOps);
        assert_eq!(reply.operations.len(), 1);
        assert_eq!(reply.operations[0].action, OperationAction::Add);
        assert_eq!(reply.operations[0].kind, Some(TransactionKind::Expense));
        assert_eq!(reply.operations[0].amount, Some(120.0));
    }

    #[test]
    fn test_reply_tolerates_nulls_and_unknowns() {
        let raw = r#"{
            "intent": "something_new",
            "operations": null,
            "response_html": null
        }"#;
        let reply: AssistantReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.intent, Intent::Other);
        assert!(reply.operations.is_empty());
        assert!(reply.response_html.is_empty());

        let op: Operation =
            serde_json::from_str(r#"{"action": "merge", "type": "transfer"}"#).unwrap();
        assert_eq!(op.action, OperationAction::Unknown);
        assert_eq!(op.kind, None);
    }

    #[test]
    fn test_missing_amount_detection() {
        let mut op = Operation {
            action: OperationAction::Add,
            description: Some("Salary".to_string()),
            ..Default::default()
        };
        assert!(op.is_missing_amount());

        op.amount = Some(0.0);
        assert!(op.is_missing_amount());

        op.amount = Some(50_000.0);
        assert!(!op.is_missing_amount());

        op.action = OperationAction::Delete;
        op.amount = None;
        assert!(!op.is_missing_amount());
    }

    #[test]
    fn test_patch_apply_and_fields() {
        let mut tx = NewTransaction {
            kind: TransactionKind::Expense,
            description: "Phone".to_string(),
            amount: 4000.0,
            category: "Electronics".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        }
        .into_transaction(Uuid::new_v4(), Utc::now());

        let patch = TransactionPatch {
            amount: Some(5000.0),
            category: Some("Gadgets".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());

        patch.apply(&mut tx);
        assert_eq!(tx.amount, 5000.0);
        assert_eq!(tx.category, "Gadgets");
        assert_eq!(tx.description, "Phone");
        assert!(TransactionPatch::default().is_empty());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut profile = UserProfile::new(Uuid::new_v4());
        profile.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("secret"));
        assert_eq!(UserProfile::new(Uuid::nil()).display_name(), "User");
    }
}
