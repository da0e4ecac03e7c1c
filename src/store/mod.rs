//! Storage seams for the claim workflow.
//!
//! `ClaimStore` owns expenses, their audit trail and their receipt rows.
//! `Directory` is the read-only view of the identity provider.

pub mod files;
#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    ApprovalEvent, Credentials, Expense, ExpenseStatus, NewApprovalEvent, Principal, Receipt,
};
use crate::workflow::scope::{ClaimScope, ReceiptScope};

pub use files::{LocalReceiptFiles, ReceiptFiles};
pub use postgres::PgStore;

/// Durable store for claims.
///
/// ## Compare-and-swap
///
/// Every write of an existing claim is conditional on `version =
/// expected_version`. When zero rows match, the write is abandoned and
/// `StoreError::Conflict` is returned. Callers pass the claim with its
/// `version` already advanced.
///
/// ## Atomicity
///
/// `commit_transition` writes the claim and appends its audit event as one
/// unit: both land or neither does.
#[async_trait]
pub trait ClaimStore: Send + Sync + 'static {
    // ── Claims ───────────────────────────────────────────────────────────────

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError>;

    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, StoreError>;

    /// Claims matching a role scope, newest first.
    async fn list_expenses(&self, scope: &ClaimScope) -> Result<Vec<Expense>, StoreError>;

    /// Overwrite a claim without touching its audit trail (draft edits).
    async fn update_expense(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Apply a status transition and record its event atomically.
    async fn commit_transition(
        &self,
        expense: &Expense,
        expected_version: i64,
        event: NewApprovalEvent,
    ) -> Result<ApprovalEvent, StoreError>;

    // ── Audit log ────────────────────────────────────────────────────────────

    /// A claim's events ordered by timestamp ascending, insertion order breaking ties.
    async fn history(&self, expense_id: Uuid) -> Result<Vec<ApprovalEvent>, StoreError>;

    // ── Receipts ─────────────────────────────────────────────────────────────

    /// Make `receipt` the claim's current receipt, returning the one it replaced.
    ///
    /// The claim's status is read under the same lock as the write; outside
    /// `allowed` the receipt is left alone and `StoreError::StatusChanged` is
    /// returned.
    async fn replace_receipt(
        &self,
        receipt: &Receipt,
        allowed: &[ExpenseStatus],
    ) -> Result<Option<Receipt>, StoreError>;

    async fn find_receipt(&self, expense_id: Uuid) -> Result<Option<Receipt>, StoreError>;

    /// Persist the OCR columns of a receipt. A receipt replaced in the
    /// meantime is left alone.
    async fn record_ocr_outcome(&self, receipt: &Receipt) -> Result<(), StoreError>;

    async fn list_receipts(&self, scope: &ReceiptScope) -> Result<Vec<Receipt>, StoreError>;
}

/// Identity provider lookups. Returns only active users with a known role.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, StoreError>;

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError>;
}
