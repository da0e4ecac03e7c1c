use async_trait::async_trait;
use uuid::Uuid;

use super::{ClaimStore, Directory};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{
    ApprovalEvent, Credentials, Expense, ExpenseStatus, NewApprovalEvent, Principal, Receipt,
    UserRow,
};
use crate::workflow::scope::{ClaimScope, ReceiptScope};

const UPDATE_EXPENSE: &str = "UPDATE expenses SET title = $1, amount = $2, category = $3, description = $4, \
     status = $5, current_approver = $6, approved_by = $7, manager_comment = $8, finance_comment = $9, \
     paid_by = $10, payment_reference = $11, version = $12, updated_at = $13 \
     WHERE id = $14 AND version = $15";

const SELECT_USER: &str =
    "SELECT id, username, password_hash, role, reports_to, is_active FROM users";

/// Postgres-backed claim store and user directory.
#[derive(Clone)]
pub struct PgStore {
    pool: Database,
}

impl PgStore {
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }

    fn update_query<'q>(
        expense: &'q Expense,
        expected_version: i64,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        sqlx::query(UPDATE_EXPENSE)
            .bind(&expense.title)
            .bind(expense.amount)
            .bind(expense.category)
            .bind(&expense.description)
            .bind(expense.status)
            .bind(expense.current_approver)
            .bind(expense.approved_by)
            .bind(&expense.manager_comment)
            .bind(&expense.finance_comment)
            .bind(expense.paid_by)
            .bind(&expense.payment_reference)
            .bind(expense.version)
            .bind(expense.updated_at)
            .bind(expense.id)
            .bind(expected_version)
    }

    /// A zero-row update is either a lost race or a missing claim.
    async fn missed_update(&self, expense: &Expense, expected_version: i64) -> StoreError {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM expenses WHERE id = $1")
            .bind(expense.id)
            .fetch_one(&self.pool)
            .await;
        match exists {
            Ok(0) => StoreError::NotFound(format!("expense {}", expense.id)),
            Ok(_) => StoreError::Conflict {
                expense_id: expense.id,
                expected_version,
            },
            Err(e) => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl ClaimStore for PgStore {
    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO expenses (id, title, amount, category, description, status, submitted_by, \
             current_approver, approved_by, manager_comment, finance_comment, paid_by, payment_reference, \
             version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(expense.id)
        .bind(&expense.title)
        .bind(expense.amount)
        .bind(expense.category)
        .bind(&expense.description)
        .bind(expense.status)
        .bind(expense.submitted_by)
        .bind(expense.current_approver)
        .bind(expense.approved_by)
        .bind(&expense.manager_comment)
        .bind(&expense.finance_comment)
        .bind(expense.paid_by)
        .bind(&expense.payment_reference)
        .bind(expense.version)
        .bind(expense.created_at)
        .bind(expense.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    async fn list_expenses(&self, scope: &ClaimScope) -> Result<Vec<Expense>, StoreError> {
        let query = match scope {
            ClaimScope::SubmittedBy(owner) => sqlx::query_as::<_, Expense>(
                "SELECT * FROM expenses WHERE submitted_by = $1 ORDER BY created_at DESC",
            )
            .bind(*owner),
            ClaimScope::AwaitingApprover(approver) => sqlx::query_as::<_, Expense>(
                "SELECT * FROM expenses WHERE status = 'SUBMITTED' AND current_approver = $1 \
                 ORDER BY created_at DESC",
            )
            .bind(*approver),
            ClaimScope::AwaitingFinance => sqlx::query_as::<_, Expense>(
                "SELECT * FROM expenses WHERE status = 'APPROVED' ORDER BY created_at DESC",
            ),
        };
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn update_expense(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let result = Self::update_query(expense, expected_version)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.missed_update(expense, expected_version).await);
        }
        Ok(())
    }

    async fn commit_transition(
        &self,
        expense: &Expense,
        expected_version: i64,
        event: NewApprovalEvent,
    ) -> Result<ApprovalEvent, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = Self::update_query(expense, expected_version)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.missed_update(expense, expected_version).await);
        }

        let recorded = sqlx::query_as::<_, ApprovalEvent>(
            "INSERT INTO approval_events (expense_id, actor, action, remarks, timestamp) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(event.expense_id)
        .bind(event.actor)
        .bind(event.action)
        .bind(&event.remarks)
        .bind(event.timestamp)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(recorded)
    }

    async fn history(&self, expense_id: Uuid) -> Result<Vec<ApprovalEvent>, StoreError> {
        let events = sqlx::query_as::<_, ApprovalEvent>(
            "SELECT * FROM approval_events WHERE expense_id = $1 ORDER BY timestamp ASC, id ASC",
        )
        .bind(expense_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn replace_receipt(
        &self,
        receipt: &Receipt,
        allowed: &[ExpenseStatus],
    ) -> Result<Option<Receipt>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Holds off transitions until the swap commits.
        let status = sqlx::query_scalar::<_, ExpenseStatus>(
            "SELECT status FROM expenses WHERE id = $1 FOR SHARE",
        )
        .bind(receipt.expense_id)
        .fetch_optional(&mut *tx)
        .await?;
        match status {
            Some(status) if allowed.contains(&status) => {}
            Some(status) => {
                tx.rollback().await?;
                return Err(StoreError::StatusChanged {
                    expense_id: receipt.expense_id,
                    status,
                });
            }
            None => {
                tx.rollback().await?;
                return Err(StoreError::NotFound(format!("expense {}", receipt.expense_id)));
            }
        }

        let previous = sqlx::query_as::<_, Receipt>(
            "SELECT * FROM receipts WHERE expense_id = $1 FOR UPDATE",
        )
        .bind(receipt.expense_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM receipts WHERE expense_id = $1")
            .bind(receipt.expense_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO receipts (id, expense_id, file_name, content_type, storage_key, ocr_status, \
             ocr_confidence, ocr_result, ocr_error, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(receipt.id)
        .bind(receipt.expense_id)
        .bind(&receipt.file_name)
        .bind(&receipt.content_type)
        .bind(&receipt.storage_key)
        .bind(receipt.ocr_status)
        .bind(receipt.ocr_confidence)
        .bind(&receipt.ocr_result)
        .bind(&receipt.ocr_error)
        .bind(receipt.created_at)
        .bind(receipt.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn find_receipt(&self, expense_id: Uuid) -> Result<Option<Receipt>, StoreError> {
        let receipt = sqlx::query_as::<_, Receipt>("SELECT * FROM receipts WHERE expense_id = $1")
            .bind(expense_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(receipt)
    }

    async fn record_ocr_outcome(&self, receipt: &Receipt) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE receipts SET ocr_status = $1, ocr_confidence = $2, ocr_result = $3, ocr_error = $4, \
             updated_at = $5 WHERE id = $6",
        )
        .bind(receipt.ocr_status)
        .bind(receipt.ocr_confidence)
        .bind(&receipt.ocr_result)
        .bind(&receipt.ocr_error)
        .bind(receipt.updated_at)
        .bind(receipt.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_receipts(&self, scope: &ReceiptScope) -> Result<Vec<Receipt>, StoreError> {
        let statuses: Vec<String> = scope.statuses.iter().map(|s| s.as_str().to_string()).collect();
        let receipts = sqlx::query_as::<_, Receipt>(
            "SELECT r.* FROM receipts r JOIN expenses e ON e.id = r.expense_id \
             WHERE e.submitted_by = $1 OR e.status = ANY($2) \
             ORDER BY r.created_at DESC",
        )
        .bind(scope.owner)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;
        Ok(receipts)
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(UserRow::into_principal))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let password_hash = row.password_hash.clone();
        Ok(row.into_principal().map(|principal| Credentials {
            principal,
            password_hash,
        }))
    }
}
