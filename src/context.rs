//! Prompt and schema builder
//!
//! Serialises the user's financial position into the instruction sent with
//! every model call, and owns the JSON schemas the model must answer with.

use crate::currency::{format_currency, format_currency_detailed};
use crate::models::{Transaction, TransactionKind, UserProfile};
use crate::session::ConversationEntry;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

const TOP_CATEGORY_COUNT: usize = 5;
const SALARY_SAMPLE: usize = 3;

/// Snapshot of everything the model is told about the user
#[derive(Debug, Clone)]
pub struct FinancialContext {
    pub user_name: String,
    pub occupation: String,
    pub expected_salary: Option<f64>,
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: usize,
    /// Expense totals per category, largest first
    pub top_categories: Vec<(String, f64)>,
    pub categories: Vec<String>,
    pub recent: Vec<Transaction>,
    pub last_transaction: Option<Transaction>,
    pub salary_transactions: Vec<Transaction>,
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl FinancialContext {
    /// `transactions` must be ordered most recent first
    pub fn build(
        profile: &UserProfile,
        transactions: &[Transaction],
        last_touched: Option<Uuid>,
        now: DateTime<Utc>,
        today: NaiveDate,
        recent_limit: usize,
    ) -> Self {
        let mut total_income = 0.0;
        let mut total_expenses = 0.0;
        let mut by_category: HashMap<&str, f64> = HashMap::new();

        for tx in transactions {
            match tx.kind {
                TransactionKind::Income => total_income += tx.amount,
                TransactionKind::Expense => {
                    total_expenses += tx.amount;
                    *by_category.entry(tx.category.as_str()).or_insert(0.0) += tx.amount;
                }
            }
        }

        let mut top_categories: Vec<(String, f64)> = by_category
            .into_iter()
            .map(|(category, total)| (category.to_string(), total))
            .collect();
        top_categories.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_categories.truncate(TOP_CATEGORY_COUNT);

        let categories: Vec<String> = transactions
            .iter()
            .map(|tx| tx.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let last_transaction = last_touched
            .and_then(|id| transactions.iter().find(|tx| tx.id == id))
            .or_else(|| transactions.first())
            .cloned();

        let salary_transactions = transactions
            .iter()
            .filter(|tx| is_salary(tx))
            .take(SALARY_SAMPLE)
            .cloned()
            .collect();

        Self {
            user_name: profile.display_name().to_string(),
            occupation: profile
                .occupation
                .clone()
                .filter(|o| !o.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            expected_salary: profile.expected_salary,
            total_income,
            total_expenses,
            balance: total_income - total_expenses,
            transaction_count: transactions.len(),
            top_categories,
            categories,
            recent: transactions.iter().take(recent_limit).cloned().collect(),
            last_transaction,
            salary_transactions,
            now,
            today,
        }
    }

    pub fn last_salary_amount(&self) -> Option<f64> {
        self.salary_transactions.first().map(|tx| tx.amount)
    }
}

fn is_salary(tx: &Transaction) -> bool {
    if tx.kind != TransactionKind::Income {
        return false;
    }
    let description = tx.description.to_lowercase();
    description.contains("salary") || description.contains("income") || tx.category == "Salary"
}

fn both_formats(amount: f64) -> String {
    format!(
        "{} ({})",
        format_currency(amount, true),
        format_currency_detailed(amount)
    )
}

fn optional_amount(amount: Option<f64>, missing: &str) -> String {
    amount
        .map(|a| format_currency(a, true))
        .unwrap_or_else(|| missing.to_string())
}

fn lines_or_none(lines: Vec<String>) -> String {
    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

/// One line per recent transaction, ids in brackets so the model can quote them
pub fn transaction_line(tx: &Transaction) -> String {
    format!(
        "- [{}] {}: {} - {} ({}) [{}]",
        tx.id,
        tx.kind,
        tx.description,
        format_currency(tx.amount, true),
        tx.category,
        tx.date
    )
}

/// Full instruction: context preamble, the request, then any extra instructions
pub fn system_prompt(
    ctx: &FinancialContext,
    history: &[ConversationEntry],
    request: &str,
    extra_instructions: Option<&str>,
) -> String {
    let last_transaction = match &ctx.last_transaction {
        Some(tx) => format!(
            "- ID: {}\n- Type: {}\n- Description: {}\n- Amount: {}\n- Category: {}\n- Date: {}",
            tx.id,
            tx.kind,
            tx.description,
            both_formats(tx.amount),
            tx.category,
            tx.date
        ),
        None => "None".to_string(),
    };

    let top_categories = lines_or_none(
        ctx.top_categories
            .iter()
            .map(|(category, amount)| format!("- {}: {}", category, both_formats(*amount)))
            .collect(),
    );

    let recent = lines_or_none(ctx.recent.iter().map(transaction_line).collect());

    let salaries = lines_or_none(
        ctx.salary_transactions
            .iter()
            .map(|tx| format!("- {}: {}", tx.date, format_currency(tx.amount, true)))
            .collect(),
    );

    let conversation = history
        .iter()
        .map(|entry| format!("{}: {}", entry.role, entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an intelligent financial assistant for {name}.

CURRENT CONTEXT:
- Current Date/Time: {datetime} (UTC - YYYY-MM-DD HH:MM:SS)
- User: {name}
- Occupation: {occupation}
- Expected Salary: {expected_salary}
- Last Salary Amount: {last_salary}

FINANCIAL DATA:
- Total Income: {income}
- Total Expenses: {expenses}
- Current Balance: {balance}
- Total Transactions: {count}
- Available Categories: {categories}

LAST TRANSACTION (for updates):
{last_transaction}

TOP SPENDING CATEGORIES:
{top_categories}

RECENT TRANSACTIONS (Last {recent_count}):
{recent}

RECENT SALARY TRANSACTIONS:
{salaries}

CONVERSATION HISTORY:
{conversation}

INSTRUCTIONS:
- Understand context deeply and infer what the user refers to
- When the user mentions salary or income without an amount:
  * Check the expected salary and recent salary transactions first
  * If no amount is known, DO NOT use 0; leave the amount out so it can be asked for
- ALWAYS ask for confirmation before executing transactions (set requiresConfirmation: true)
- Support multiple languages including Hindi/English mix
- Understand phrasings like "delete all food", "remove electronics", "clear shopping"
- For batch operations use filters (category, date range, amount range)
- Always use the correct user name: {name}
- Use compact currency format (L/CR/K) in responses
- For corrections or updates without a specific ID, use the last transaction
- Current date for new transactions: {today}

USER REQUEST: {request}

{extra}"#,
        name = ctx.user_name,
        datetime = ctx.now.format("%Y-%m-%d %H:%M:%S"),
        occupation = ctx.occupation,
        expected_salary = optional_amount(ctx.expected_salary, "Not specified"),
        last_salary = optional_amount(ctx.last_salary_amount(), "None recorded"),
        income = both_formats(ctx.total_income),
        expenses = both_formats(ctx.total_expenses),
        balance = both_formats(ctx.balance),
        count = ctx.transaction_count,
        categories = ctx.categories.join(", "),
        last_transaction = last_transaction,
        top_categories = top_categories,
        recent_count = ctx.recent.len(),
        recent = recent,
        salaries = salaries,
        conversation = conversation,
        today = ctx.today.format("%Y-%m-%d"),
        request = request,
        extra = extra_instructions.unwrap_or_default(),
    )
    .trim_end()
    .to_string()
}

pub fn intent_prompt(user_message: &str) -> String {
    format!(
        r#"Analyze this user input: "{}"

Understand the user's intent. They might want:

1. TRANSACTION OPERATIONS:
   - ADD: "spent X on Y", "paid", "received", "got salary", "maine kharcha kiya", "income hua"
   - UPDATE: "sorry X", "galti se", "actually", "change to", corrections with just numbers
     * By description: "update phone purchase to 5000"
     * By category: "change food expense to 300"
     * By amount: "change 1000 transaction to 1500"
   - DELETE: "delete", "remove", "clear", "hatao", "saaf karo", specific or batch
     * By description: "delete phone purchase"
     * By category: "delete all food"
     * By amount: "delete 500 rupees transaction"
     * By date: "delete yesterday's", "remove last week's"
     * All: "delete all", "clear everything"
   - UNDO: "undo", "revert", "cancel last", "galti ho gayi"

2. QUERIES/ANALYSIS:
   - Balance/Summary: "balance", "total", "kitna hai", "how much"
   - Category analysis: "show food expenses", "electronics ka total"
   - Time-based: "today's spending", "this month's income"
   - Comparisons and insights: "compare food vs shopping", "where am I spending most"

3. GENERAL CONVERSATION:
   - Greetings, questions, financial advice, budget discussions

IMPORTANT RULES:
- For ALL transaction operations set requiresConfirmation: true
- A correction right after adding a transaction is an UPDATE
- A number on its own after a transaction is an amount correction
- "Delete all X" deletes every transaction in category X
- Relative dates like "yesterday", "last week", "this month" go in identifyBy.dateRange

When identifying transactions for update/delete:
- Quote the [id] from RECENT TRANSACTIONS in transactionId / transactionIds when certain
- Otherwise describe them in identifyBy (description, category, amount, type, dateRange)
- Use filter for batch deletes (category, type, dateFrom, dateTo, amountMin, amountMax)

Return the analysis with a confirmationMessage when an operation needs confirmation."#,
        user_message
    )
}

pub fn analysis_prompt() -> &'static str {
    r#"Analyze my spending patterns and provide deep insights for each major category. Look for:
- Spending trends and patterns
- Unusual or concerning expenses
- Opportunities to save money
- Category comparisons
- Time-based patterns (if data permits)

Be specific, actionable, and use data to support your insights. Use compact currency format (L/CR/K)."#
}

pub fn analysis_instructions() -> &'static str {
    r#"Return the analysis as Markdown. Start with a personalized greeting using the user's name.
Number each insight as "1. **Category or insight type**" followed by the detailed analysis.
Include an overall spending summary, a category-wise breakdown, saving opportunities and budget recommendations.
Use compact currency format throughout."#
}

/// Strip a surrounding ```lang fence the model sometimes adds
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            rest.strip_suffix("```").unwrap_or(rest)
        }
        None => trimmed,
    };
    body.trim().to_string()
}

//
// ================= Schemas =================
//

pub fn intent_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "intent": {
                "type": "STRING",
                "enum": ["transaction_ops", "show_data", "general_chat", "complex_query", "undo"]
            },
            "subIntent": {
                "type": "STRING",
                "description": "Specific sub-intent like 'add_expense', 'delete_batch', 'show_category_total'"
            },
            "requiresConfirmation": { "type": "BOOLEAN" },
            "confirmationMessage": { "type": "STRING" },
            "operations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "action": { "type": "STRING", "enum": ["add", "update", "delete"] },
                        "type": { "type": "STRING", "enum": ["income", "expense"] },
                        "description": { "type": "STRING" },
                        "amount": { "type": "NUMBER" },
                        "category": { "type": "STRING" },
                        "date": { "type": "STRING" },
                        "transactionId": { "type": "STRING" },
                        "transactionIds": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "identifyBy": {
                            "type": "OBJECT",
                            "properties": {
                                "description": { "type": "STRING" },
                                "category": { "type": "STRING" },
                                "amount": { "type": "NUMBER" },
                                "type": { "type": "STRING" },
                                "dateRange": { "type": "STRING" }
                            }
                        },
                        "filter": {
                            "type": "OBJECT",
                            "properties": {
                                "category": { "type": "STRING" },
                                "type": { "type": "STRING" },
                                "dateFrom": { "type": "STRING" },
                                "dateTo": { "type": "STRING" },
                                "amountMin": { "type": "NUMBER" },
                                "amountMax": { "type": "NUMBER" }
                            }
                        }
                    }
                }
            },
            "queryParams": {
                "type": "OBJECT",
                "properties": {
                    "type": { "type": "STRING" },
                    "categories": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "dateRange": { "type": "STRING" },
                    "sortBy": { "type": "STRING" },
                    "groupBy": { "type": "STRING" }
                }
            },
            "response_html": { "type": "STRING" },
            "requiresData": { "type": "BOOLEAN" },
            "confidence": { "type": "NUMBER" }
        },
        "required": ["intent", "response_html"]
    })
}

pub fn question_list_schema() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

pub fn saving_plan_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "goalTitle": { "type": "STRING" },
                "targetAmount": { "type": "NUMBER" },
                "monthlyContribution": { "type": "NUMBER" },
                "timeline": { "type": "STRING" },
                "description": { "type": "STRING" },
                "steps": { "type": "ARRAY", "items": { "type": "STRING" } }
            }
        }
    })
}

pub fn budget_plan_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "category": { "type": "STRING" },
                "budgetedAmount": { "type": "NUMBER" },
                "currentSpending": { "type": "NUMBER" },
                "suggestion": { "type": "STRING" }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use chrono::TimeZone;

    fn tx(description: &str, category: &str, amount: f64, kind: TransactionKind, date: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            kind,
            description: description.to_string(),
            amount,
            category: category.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            created_at: Utc::now(),
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("Coffee", "Food", 200.0, TransactionKind::Expense, "2025-07-14"),
            tx("Salary July", "Salary", 80000.0, TransactionKind::Income, "2025-07-01"),
            tx("Rent", "Housing", 20000.0, TransactionKind::Expense, "2025-07-01"),
            tx("Groceries", "Food", 3000.0, TransactionKind::Expense, "2025-06-30"),
            tx("Freelance income", "Work", 5000.0, TransactionKind::Income, "2025-06-20"),
        ]
    }

    fn build(records: &[Transaction], last_touched: Option<Uuid>) -> FinancialContext {
        let mut profile = UserProfile::new(Uuid::nil());
        profile.name = "Asha".to_string();
        let now = Utc.with_ymd_and_hms(2025, 7, 14, 9, 30, 0).unwrap();
        FinancialContext::build(&profile, records, last_touched, now, now.date_naive(), 3)
    }

    #[test]
    fn test_context_totals_and_categories() {
        let records = sample();
        let ctx = build(&records, None);

        assert_eq!(ctx.total_income, 85000.0);
        assert_eq!(ctx.total_expenses, 23200.0);
        assert_eq!(ctx.balance, 61800.0);
        assert_eq!(ctx.top_categories[0], ("Housing".to_string(), 20000.0));
        assert_eq!(ctx.top_categories[1], ("Food".to_string(), 3200.0));
        assert_eq!(ctx.categories, vec!["Food", "Housing", "Salary", "Work"]);
        assert_eq!(ctx.recent.len(), 3);
        assert_eq!(ctx.salary_transactions.len(), 2);
        assert_eq!(ctx.last_salary_amount(), Some(80000.0));
        assert_eq!(ctx.occupation, "Unknown");
    }

    #[test]
    fn test_last_transaction_prefers_touched_record() {
        let records = sample();
        assert_eq!(build(&records, None).last_transaction.unwrap().description, "Coffee");

        let rent = records[2].id;
        assert_eq!(build(&records, Some(rent)).last_transaction.unwrap().description, "Rent");

        // a touched record that was since removed falls back to the newest
        let gone = Uuid::new_v4();
        assert_eq!(build(&records, Some(gone)).last_transaction.unwrap().description, "Coffee");
    }

    #[test]
    fn test_system_prompt_sections() {
        let records = sample();
        let ctx = build(&records, None);
        let history = vec![
            ConversationEntry::new(Role::User, "spent 200 on coffee"),
            ConversationEntry::new(Role::Assistant, "Adding coffee"),
        ];
        let prompt = system_prompt(&ctx, &history, "how am I doing?", Some("Answer briefly."));

        assert!(prompt.starts_with("You are an intelligent financial assistant for Asha."));
        assert!(prompt.contains("- Current Date/Time: 2025-07-14 09:30:00"));
        assert!(prompt.contains("- Total Income: ₹85.0K (₹85,000.00)"));
        assert!(prompt.contains(&format!("- [{}] expense: Coffee - ₹200 (Food) [2025-07-14]", records[0].id)));
        assert!(prompt.contains("user: spent 200 on coffee\nassistant: Adding coffee"));
        assert!(prompt.contains("ALWAYS ask for confirmation"));
        assert!(prompt.contains("Current date for new transactions: 2025-07-14"));
        assert!(prompt.contains("USER REQUEST: how am I doing?"));
        assert!(prompt.ends_with("Answer briefly."));
    }

    #[test]
    fn test_empty_context_renders_none() {
        let ctx = build(&[], None);
        let prompt = system_prompt(&ctx, &[], "hi", None);
        assert!(prompt.contains("LAST TRANSACTION (for updates):\nNone"));
        assert!(prompt.contains("RECENT SALARY TRANSACTIONS:\nNone"));
        assert!(prompt.ends_with("USER REQUEST: hi"));
    }

    #[test]
    fn test_intent_schema_shape() {
        let schema = intent_schema();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"], json!(["intent", "response_html"]));
        assert_eq!(
            schema["properties"]["operations"]["items"]["properties"]["identifyBy"]["type"],
            "OBJECT"
        );
        assert_eq!(question_list_schema()["items"]["type"], "STRING");
        assert!(saving_plan_schema()["items"]["properties"].get("goalTitle").is_some());
        assert!(budget_plan_schema()["items"]["properties"].get("budgetedAmount").is_some());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fences("  no fences "), "no fences");
    }
}
