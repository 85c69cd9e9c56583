//! Reference resolution
//!
//! Turns the model's loose descriptions of "which transaction" into concrete
//! records: explicit ids first, then property matches, then whatever the
//! user touched last. Records are expected most-recent first, so the first
//! match is the newest one.

use crate::models::{DeleteFilter, IdentifyBy, Operation, Transaction};
use chrono::{Datelike, Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

const AMOUNT_TOLERANCE: f64 = 0.01;

lazy_static! {
    static ref LAST_N_DAYS: Regex =
        Regex::new(r"^(?:last|past)\s+(\d{1,3})\s+days?$").expect("valid regex");
    static ref EXPLICIT_RANGE: Regex =
        Regex::new(r"^(\d{4}-\d{2}-\d{2})\s*(?:\.\.|to|-)\s*(\d{4}-\d{2}-\d{2})$")
            .expect("valid regex");
}

/// Inclusive calendar range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Understands relative phrases ("yesterday", "last week", "this month",
    /// "last 7 days") and explicit ISO dates or ranges.
    pub fn parse(text: &str, today: NaiveDate) -> Option<Self> {
        let lowered = text.trim().to_lowercase();

        let single = |d: NaiveDate| Some(Self { start: d, end: d });

        match lowered.as_str() {
            "" => return None,
            "today" => return single(today),
            "yesterday" => return single(today - Duration::days(1)),
            "this week" => {
                let start = week_start(today);
                return Some(Self { start, end: start + Duration::days(6) });
            }
            "last week" => {
                let start = week_start(today) - Duration::days(7);
                return Some(Self { start, end: start + Duration::days(6) });
            }
            "this month" => return month_range(today.year(), today.month()),
            "last month" => {
                let (year, month) = if today.month() == 1 {
                    (today.year() - 1, 12)
                } else {
                    (today.year(), today.month() - 1)
                };
                return month_range(year, month);
            }
            "this year" => {
                return Some(Self {
                    start: NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                    end: NaiveDate::from_ymd_opt(today.year(), 12, 31)?,
                })
            }
            _ => {}
        }

        if let Some(caps) = LAST_N_DAYS.captures(&lowered) {
            let days: i64 = caps[1].parse().ok()?;
            if days == 0 {
                return None;
            }
            return Some(Self {
                start: today - Duration::days(days - 1),
                end: today,
            });
        }

        if let Some(caps) = EXPLICIT_RANGE.captures(&lowered) {
            let start = parse_date(&caps[1])?;
            let end = parse_date(&caps[2])?;
            return if start <= end {
                Some(Self { start, end })
            } else {
                Some(Self { start: end, end: start })
            };
        }

        parse_date(&lowered).and_then(single)
    }
}

fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange {
        start,
        end: next - Duration::days(1),
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Model-supplied ids sometimes keep the `[...]` they were listed with
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim().trim_start_matches('[').trim_end_matches(']')).ok()
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl IdentifyBy {
    /// No usable criterion: identification falls through to the next strategy
    pub fn is_empty(&self, today: NaiveDate) -> bool {
        non_blank(&self.description).is_none()
            && non_blank(&self.category).is_none()
            && self.amount.is_none()
            && self.kind.is_none()
            && self.date_range(today).is_none()
    }

    fn date_range(&self, today: NaiveDate) -> Option<DateRange> {
        non_blank(&self.date_range).and_then(|raw| DateRange::parse(raw, today))
    }

    pub fn matches(&self, tx: &Transaction, today: NaiveDate) -> bool {
        if let Some(description) = non_blank(&self.description) {
            if !tx.description.to_lowercase().contains(&description.to_lowercase()) {
                return false;
            }
        }
        if let Some(category) = non_blank(&self.category) {
            if !eq_ignore_case(&tx.category, category) {
                return false;
            }
        }
        if let Some(amount) = self.amount {
            if (tx.amount - amount).abs() >= AMOUNT_TOLERANCE {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if tx.kind != kind {
                return false;
            }
        }
        if let Some(range) = self.date_range(today) {
            if !range.contains(tx.date) {
                return false;
            }
        }
        true
    }
}

/// Compare a record date against a bound; bounds that are not ISO dates
/// fall back to comparing the ISO text
fn date_at_least(date: NaiveDate, bound: &str) -> bool {
    match parse_date(bound) {
        Some(bound) => date >= bound,
        None => date.format("%Y-%m-%d").to_string().as_str() >= bound.trim(),
    }
}

fn date_at_most(date: NaiveDate, bound: &str) -> bool {
    match parse_date(bound) {
        Some(bound) => date <= bound,
        None => date.format("%Y-%m-%d").to_string().as_str() <= bound.trim(),
    }
}

impl DeleteFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(category) = non_blank(&self.category) {
            if !eq_ignore_case(&tx.category, category) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if tx.kind != kind {
                return false;
            }
        }
        if let Some(from) = non_blank(&self.date_from) {
            if !date_at_least(tx.date, from) {
                return false;
            }
        }
        if let Some(to) = non_blank(&self.date_to) {
            if !date_at_most(tx.date, to) {
                return false;
            }
        }
        if let Some(min) = self.amount_min {
            if tx.amount < min {
                return false;
            }
        }
        if let Some(max) = self.amount_max {
            if tx.amount > max {
                return false;
            }
        }
        true
    }
}

/// The identification criteria of an operation, if it has any usable ones
pub fn usable_criteria(op: &Operation, today: NaiveDate) -> Option<&IdentifyBy> {
    op.identify_by.as_ref().filter(|c| !c.is_empty(today))
}

pub fn find_matches<'a>(
    records: &'a [Transaction],
    criteria: &IdentifyBy,
    today: NaiveDate,
) -> Vec<&'a Transaction> {
    records.iter().filter(|tx| criteria.matches(tx, today)).collect()
}

/// Pick the record an update refers to:
/// explicit id → newest property match → last touched record.
/// A well-formed id that is no longer stored resolves to nothing.
pub fn resolve_update_target<'a>(
    records: &'a [Transaction],
    op: &Operation,
    last_touched: Option<Uuid>,
    today: NaiveDate,
) -> Option<&'a Transaction> {
    if let Some(id) = op.transaction_id.as_deref().and_then(parse_id) {
        return records.iter().find(|tx| tx.id == id);
    }

    if let Some(criteria) = usable_criteria(op, today) {
        if let Some(tx) = records.iter().find(|tx| criteria.matches(tx, today)) {
            return Some(tx);
        }
    }

    last_touched.and_then(|id| records.iter().find(|tx| tx.id == id))
}

/// Collect the records a delete refers to:
/// explicit ids → property matches → batch filter
pub fn resolve_delete_targets<'a>(
    records: &'a [Transaction],
    op: &Operation,
    today: NaiveDate,
) -> Vec<&'a Transaction> {
    if let Some(ids) = &op.transaction_ids {
        let wanted: Vec<Uuid> = ids.iter().filter_map(|raw| parse_id(raw)).collect();
        return records.iter().filter(|tx| wanted.contains(&tx.id)).collect();
    }

    if let Some(criteria) = usable_criteria(op, today) {
        return find_matches(records, criteria, today);
    }

    if let Some(filter) = &op.filter {
        return records.iter().filter(|tx| filter.matches(tx)).collect();
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationAction, TransactionKind};
    use chrono::Utc;

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn tx(description: &str, category: &str, amount: f64, kind: TransactionKind, date: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            kind,
            description: description.to_string(),
            amount,
            category: category.to_string(),
            date: day(date),
            created_at: Utc::now(),
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("Coffee at Blue Tokai", "Food", 250.0, TransactionKind::Expense, "2025-07-14"),
            tx("Phone purchase", "Electronics", 4000.0, TransactionKind::Expense, "2025-07-12"),
            tx("Salary July", "Salary", 80000.0, TransactionKind::Income, "2025-07-01"),
            tx("Dinner", "food", 900.0, TransactionKind::Expense, "2025-06-28"),
        ]
    }

    #[test]
    fn test_relative_ranges() {
        // 2025-07-14 is a Monday
        let today = day("2025-07-14");
        assert_eq!(DateRange::parse("yesterday", today).unwrap().start, day("2025-07-13"));

        let week = DateRange::parse("this week", today).unwrap();
        assert_eq!((week.start, week.end), (day("2025-07-14"), day("2025-07-20")));

        let last_week = DateRange::parse("Last Week", today).unwrap();
        assert_eq!((last_week.start, last_week.end), (day("2025-07-07"), day("2025-07-13")));

        let last_month = DateRange::parse("last month", today).unwrap();
        assert_eq!((last_month.start, last_month.end), (day("2025-06-01"), day("2025-06-30")));

        let jan = DateRange::parse("last month", day("2025-01-10")).unwrap();
        assert_eq!(jan.start, day("2024-12-01"));

        let recent = DateRange::parse("last 7 days", today).unwrap();
        assert_eq!(recent.start, day("2025-07-08"));

        let explicit = DateRange::parse("2025-07-10 to 2025-07-01", today).unwrap();
        assert_eq!((explicit.start, explicit.end), (day("2025-07-01"), day("2025-07-10")));

        assert!(DateRange::parse("sometime soon", today).is_none());
    }

    #[test]
    fn test_identify_by_matching() {
        let records = sample();
        let today = day("2025-07-14");

        let by_category = IdentifyBy {
            category: Some("FOOD".to_string()),
            ..Default::default()
        };
        assert_eq!(find_matches(&records, &by_category, today).len(), 2);

        let by_partial = IdentifyBy {
            description: Some("phone".to_string()),
            ..Default::default()
        };
        let matches = find_matches(&records, &by_partial, today);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].category, "Electronics");

        let by_amount = IdentifyBy {
            amount: Some(4000.004),
            kind: Some(TransactionKind::Expense),
            ..Default::default()
        };
        assert_eq!(find_matches(&records, &by_amount, today).len(), 1);

        let by_range = IdentifyBy {
            category: Some("food".to_string()),
            date_range: Some("this month".to_string()),
            ..Default::default()
        };
        assert_eq!(find_matches(&records, &by_range, today).len(), 1);
    }

    #[test]
    fn test_blank_criteria_count_as_absent() {
        let today = day("2025-07-14");
        let blank = IdentifyBy {
            description: Some("  ".to_string()),
            date_range: Some("whenever".to_string()),
            ..Default::default()
        };
        assert!(blank.is_empty(today));
    }

    #[test]
    fn test_update_target_resolution_order() {
        let records = sample();
        let today = day("2025-07-14");
        let phone = records[1].id;
        let salary = records[2].id;

        let by_id = Operation {
            action: OperationAction::Update,
            transaction_id: Some(format!("[{}]", phone)),
            ..Default::default()
        };
        assert_eq!(resolve_update_target(&records, &by_id, None, today).unwrap().id, phone);

        let by_criteria = Operation {
            action: OperationAction::Update,
            transaction_id: Some("not-an-id".to_string()),
            identify_by: Some(IdentifyBy {
                category: Some("food".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        // newest food record wins
        assert_eq!(
            resolve_update_target(&records, &by_criteria, Some(salary), today).unwrap().id,
            records[0].id
        );

        let by_context = Operation {
            action: OperationAction::Update,
            amount: Some(450.0),
            ..Default::default()
        };
        assert_eq!(
            resolve_update_target(&records, &by_context, Some(salary), today).unwrap().id,
            salary
        );
        assert!(resolve_update_target(&records, &by_context, Some(Uuid::new_v4()), today).is_none());

        let gone = Operation {
            action: OperationAction::Update,
            transaction_id: Some(Uuid::new_v4().to_string()),
            identify_by: Some(IdentifyBy {
                category: Some("food".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(resolve_update_target(&records, &gone, Some(salary), today).is_none());
    }

    #[test]
    fn test_delete_target_strategies() {
        let records = sample();
        let today = day("2025-07-14");

        let by_ids = Operation {
            action: OperationAction::Delete,
            transaction_ids: Some(vec![records[0].id.to_string(), Uuid::new_v4().to_string()]),
            ..Default::default()
        };
        assert_eq!(resolve_delete_targets(&records, &by_ids, today).len(), 1);

        let by_filter = Operation {
            action: OperationAction::Delete,
            filter: Some(DeleteFilter {
                kind: Some(TransactionKind::Expense),
                date_from: Some("2025-07-01".to_string()),
                amount_max: Some(1000.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let targets = resolve_delete_targets(&records, &by_filter, today);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].description, "Coffee at Blue Tokai");

        let delete_all = Operation {
            action: OperationAction::Delete,
            filter: Some(DeleteFilter::default()),
            ..Default::default()
        };
        assert_eq!(resolve_delete_targets(&records, &delete_all, today).len(), 4);

        let no_criteria = Operation {
            action: OperationAction::Delete,
            ..Default::default()
        };
        assert!(resolve_delete_targets(&records, &no_criteria, today).is_empty());
    }
}
