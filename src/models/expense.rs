use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseCategory {
    Travel,
    Food,
    Supplies,
    Software,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    FinanceApproved,
    Paid,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "DRAFT",
            ExpenseStatus::Submitted => "SUBMITTED",
            ExpenseStatus::Approved => "APPROVED",
            ExpenseStatus::Rejected => "REJECTED",
            ExpenseStatus::FinanceApproved => "FINANCE_APPROVED",
            ExpenseStatus::Paid => "PAID",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExpenseStatus::Paid | ExpenseStatus::Rejected)
    }

    /// Edges of the claim lifecycle. Nothing else is a legal move.
    pub fn can_advance_to(&self, next: ExpenseStatus) -> bool {
        use ExpenseStatus::*;
        matches!(
            (*self, next),
            (Draft, Submitted)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Approved, FinanceApproved)
                | (FinanceApproved, Paid)
        )
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Expense {
    pub id: Uuid,
    pub title: String,
    pub amount: Decimal,
    pub category: ExpenseCategory,
    pub description: String,
    pub status: ExpenseStatus,
    pub submitted_by: Uuid,
    pub current_approver: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub manager_comment: String,
    pub finance_comment: String,
    pub paid_by: Option<Uuid>,
    pub payment_reference: String,
    #[serde(skip_serializing)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn new_draft(owner: Uuid, input: ExpenseInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            amount: input.amount,
            category: input.category,
            description: input.description,
            status: ExpenseStatus::Draft,
            submitted_by: owner,
            current_approver: None,
            approved_by: None,
            manager_comment: String::new(),
            finance_comment: String::new(),
            paid_by: None,
            payment_reference: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the first broken structural rule, if any.
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.current_approver.is_some() != (self.status == ExpenseStatus::Submitted) {
            return Some("current approver must be set exactly while the claim is submitted");
        }
        let owner = Some(self.submitted_by);
        if self.current_approver == owner || self.approved_by == owner || self.paid_by == owner {
            return Some("the submitter cannot act as an approver of their own claim");
        }
        if self.amount.is_sign_negative() {
            return Some("amount cannot be negative");
        }
        None
    }
}

/// Editable fields of a claim, as sent by the owner.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    pub title: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: ExpenseCategory,
    #[serde(default)]
    pub description: String,
}

impl ExpenseInput {
    /// Checks the input and normalises the amount to two fractional digits.
    pub fn validate(mut self) -> Result<Self, String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("title is required".to_string());
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(format!("title must be at most {} characters", MAX_TITLE_CHARS));
        }
        if self.amount <= Decimal::ZERO {
            return Err("amount must be greater than zero".to_string());
        }
        if self.amount.normalize().scale() > 2 {
            return Err("amount must have at most two decimal places".to_string());
        }
        // NUMERIC(12, 2)
        if self.amount >= Decimal::new(10_000_000_000, 0) {
            return Err("amount is too large".to_string());
        }
        self.amount.rescale(2);
        self.title = title.to_string();
        Ok(self)
    }
}
