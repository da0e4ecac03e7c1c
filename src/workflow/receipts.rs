use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{StoreError, WorkflowError};
use crate::models::receipt::{extension_for, is_supported_content_type};
use crate::models::{Expense, ExpenseStatus, OcrOutcome, OcrStatus, Principal, Receipt};
use crate::ocr::{OcrError, OcrService};
use crate::store::{ClaimStore, ReceiptFiles};

use super::scope::{can_view_claim, can_view_receipt, ReceiptScope};

/// Claim statuses that still accept a receipt.
const ATTACHABLE: &[ExpenseStatus] = &[ExpenseStatus::Draft, ExpenseStatus::Submitted];

/// A receipt file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Upload {
    fn validate(&self) -> Result<(), WorkflowError> {
        if self.data.is_empty() {
            return Err(WorkflowError::Validation("receipt file is empty".to_string()));
        }
        if !is_supported_content_type(&self.content_type) {
            return Err(WorkflowError::Validation(format!(
                "unsupported receipt type '{}'",
                self.content_type
            )));
        }
        Ok(())
    }
}

/// Receipt attachment, retrieval and background OCR. Never writes claim rows.
pub struct ReceiptService {
    store: Arc<dyn ClaimStore>,
    files: Arc<dyn ReceiptFiles>,
    ocr: Arc<dyn OcrService>,
    ocr_timeout: Duration,
}

impl ReceiptService {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        files: Arc<dyn ReceiptFiles>,
        ocr: Arc<dyn OcrService>,
        ocr_timeout: Duration,
    ) -> Self {
        Self {
            store,
            files,
            ocr,
            ocr_timeout,
        }
    }

    /// Store `upload` as the claim's current receipt and start OCR.
    ///
    /// Returns as soon as the receipt row exists with `PENDING` status.
    pub async fn attach(
        self: &Arc<Self>,
        actor: &Principal,
        expense_id: Uuid,
        upload: Upload,
    ) -> Result<Receipt, WorkflowError> {
        upload.validate()?;

        let expense = self.load_visible(actor, expense_id).await?;
        if expense.submitted_by != actor.id {
            return Err(WorkflowError::Forbidden(
                "only the owner can attach a receipt",
            ));
        }
        if !ATTACHABLE.contains(&expense.status) {
            return Err(WorkflowError::InvalidTransition {
                status: expense.status,
                operation: "attach_receipt",
            });
        }

        let receipt_id = Uuid::new_v4();
        let extension = extension_for(&upload.content_type);
        let storage_key = self
            .files
            .put(expense_id, receipt_id, extension, &upload.data)
            .await?;

        let file_name = match upload.file_name.trim() {
            "" => format!("receipt.{extension}"),
            name => name.to_string(),
        };
        let now = Utc::now();
        let receipt = Receipt {
            id: receipt_id,
            expense_id,
            file_name,
            content_type: upload.content_type.clone(),
            storage_key,
            ocr_status: OcrStatus::Pending,
            ocr_confidence: None,
            ocr_result: None,
            ocr_error: None,
            created_at: now,
            updated_at: now,
        };

        let previous = match self.store.replace_receipt(&receipt, ATTACHABLE).await {
            Ok(previous) => previous,
            Err(e) => {
                if let Err(cleanup) = self.files.delete(&receipt.storage_key).await {
                    log::warn!("Orphaned receipt file {}: {}", receipt.storage_key, cleanup);
                }
                return Err(match e {
                    StoreError::StatusChanged { status, .. } => WorkflowError::InvalidTransition {
                        status,
                        operation: "attach_receipt",
                    },
                    StoreError::NotFound(_) => WorkflowError::NotFound,
                    e => e.into(),
                });
            }
        };
        if let Some(previous) = previous {
            if let Err(e) = self.files.delete(&previous.storage_key).await {
                log::warn!("Failed to remove replaced receipt {}: {}", previous.storage_key, e);
            }
        }

        log::info!("Receipt {} attached to claim {}", receipt.id, expense_id);
        self.spawn_ocr(receipt.clone(), upload.data);
        Ok(receipt)
    }

    /// Run OCR for `receipt` without holding up the caller.
    pub fn spawn_ocr(self: &Arc<Self>, receipt: Receipt, data: Vec<u8>) -> JoinHandle<Receipt> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_ocr(receipt, data).await })
    }

    /// One bounded OCR attempt, recorded on the receipt whatever the result.
    pub async fn run_ocr(&self, mut receipt: Receipt, data: Vec<u8>) -> Receipt {
        let call = self
            .ocr
            .extract(&receipt.file_name, &receipt.content_type, data);
        let outcome = match tokio::time::timeout(self.ocr_timeout, call).await {
            Ok(Ok(fields)) => OcrOutcome::Extracted(fields),
            Ok(Err(e)) => OcrOutcome::Failed(e.to_string()),
            Err(_) => OcrOutcome::Failed(OcrError::Timeout.to_string()),
        };

        if let OcrOutcome::Failed(message) = &outcome {
            log::warn!("OCR failed for receipt {}: {}", receipt.id, message);
        }
        receipt.apply_outcome(outcome, Utc::now());

        if let Err(e) = self.store.record_ocr_outcome(&receipt).await {
            log::error!("Failed to record OCR result for receipt {}: {}", receipt.id, e);
        }
        receipt
    }

    /// The claim's current receipt and its bytes, subject to the receipt gate.
    pub async fn open(
        &self,
        actor: &Principal,
        expense_id: Uuid,
    ) -> Result<(Receipt, Vec<u8>), WorkflowError> {
        let expense = self.load_visible(actor, expense_id).await?;
        if !can_view_receipt(actor, &expense) {
            return Err(WorkflowError::Forbidden("receipt not visible to this role"));
        }
        let receipt = self
            .store
            .find_receipt(expense_id)
            .await?
            .ok_or(WorkflowError::NotFound)?;
        let data = match self.files.get(&receipt.storage_key).await {
            Ok(data) => data,
            Err(StoreError::NotFound(_)) => {
                log::warn!("Receipt {} has no stored file", receipt.id);
                return Err(WorkflowError::NotFound);
            }
            Err(e) => return Err(e.into()),
        };
        Ok((receipt, data))
    }

    pub async fn list_visible(&self, actor: &Principal) -> Result<Vec<Receipt>, WorkflowError> {
        let scope = ReceiptScope::for_principal(actor);
        Ok(self.store.list_receipts(&scope).await?)
    }

    async fn load_visible(
        &self,
        actor: &Principal,
        expense_id: Uuid,
    ) -> Result<Expense, WorkflowError> {
        match self.store.find_expense(expense_id).await? {
            Some(expense) if can_view_claim(actor, &expense) => Ok(expense),
            _ => Err(WorkflowError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpenseCategory, ExpenseInput, OcrFields, Role};
    use crate::store::files::memory::InMemoryReceiptFiles;
    use crate::store::memory::MemoryStore;
    use crate::workflow::WorkflowEngine;
    use async_trait::async_trait;

    enum FakeOcr {
        Reads(OcrFields),
        Fails,
        Hangs,
    }

    #[async_trait]
    impl OcrService for FakeOcr {
        async fn extract(
            &self,
            _file_name: &str,
            _content_type: &str,
            _data: Vec<u8>,
        ) -> Result<OcrFields, OcrError> {
            match self {
                FakeOcr::Reads(fields) => Ok(fields.clone()),
                FakeOcr::Fails => Err(OcrError::Status {
                    status: 503,
                    body: "warming up".to_string(),
                }),
                FakeOcr::Hangs => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(OcrError::Timeout)
                }
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        files: Arc<InMemoryReceiptFiles>,
        receipts: Arc<ReceiptService>,
        engine: WorkflowEngine,
        employee: Principal,
        manager: Principal,
        finance: Principal,
    }

    fn fixture(ocr: FakeOcr) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let files = Arc::new(InMemoryReceiptFiles::default());
        let manager = store.add_user("mona", Role::Manager, None);
        let employee = store.add_user("eve", Role::Employee, Some(manager.id));
        let finance = store.add_user("fred", Role::Finance, None);
        let receipts = Arc::new(ReceiptService::new(
            store.clone(),
            files.clone(),
            Arc::new(ocr),
            Duration::from_millis(50),
        ));
        let engine = WorkflowEngine::new(store.clone(), store.clone());
        Fixture {
            store,
            files,
            receipts,
            engine,
            employee,
            manager,
            finance,
        }
    }

    fn fields() -> OcrFields {
        OcrFields {
            vendor: Some("Chai Point".to_string()),
            date: Some("2026-02-11".to_string()),
            total_amount: Some("240.00".parse().unwrap()),
            confidence: 0.87,
            raw_text: "CHAI POINT TOTAL 240.00".to_string(),
        }
    }

    fn png(name: &str) -> Upload {
        Upload {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            data: b"\x89PNG\r\n".to_vec(),
        }
    }

    async fn draft(f: &Fixture) -> Expense {
        f.engine
            .create(
                &f.employee,
                ExpenseInput {
                    title: "Team chai".to_string(),
                    amount: "240".parse().unwrap(),
                    category: ExpenseCategory::Food,
                    description: String::new(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn attach_returns_pending_and_ocr_fills_in() {
        let f = fixture(FakeOcr::Reads(fields()));
        let claim = draft(&f).await;

        let receipt = f
            .receipts
            .attach(&f.employee, claim.id, png("chai.png"))
            .await
            .unwrap();
        assert_eq!(receipt.ocr_status, OcrStatus::Pending);

        let done = f.receipts.run_ocr(receipt, b"img".to_vec()).await;
        assert_eq!(done.ocr_status, OcrStatus::Success);
        assert_eq!(done.ocr_confidence, Some(0.87));

        let stored = f.store.find_receipt(claim.id).await.unwrap().unwrap();
        assert_eq!(stored.ocr_status, OcrStatus::Success);
        assert_eq!(stored.ocr_result.unwrap().0.vendor.as_deref(), Some("Chai Point"));
    }

    #[tokio::test]
    async fn ocr_failure_and_timeout_leave_claim_untouched() {
        for (ocr, expected) in [
            (FakeOcr::Fails, "OCR returned 503: warming up"),
            (FakeOcr::Hangs, "OCR timeout"),
        ] {
            let f = fixture(ocr);
            let claim = draft(&f).await;
            let receipt = f
                .receipts
                .attach(&f.employee, claim.id, png("r.png"))
                .await
                .unwrap();

            let done = f
                .receipts
                .spawn_ocr(receipt, b"img".to_vec())
                .await
                .unwrap();
            assert_eq!(done.ocr_status, OcrStatus::Failed);
            assert_eq!(done.ocr_error.as_deref(), Some(expected));

            let stored = f.store.find_receipt(claim.id).await.unwrap().unwrap();
            assert_eq!(stored.ocr_status, OcrStatus::Failed);
            let after = f.store.find_expense(claim.id).await.unwrap().unwrap();
            assert_eq!(after, claim);
        }
    }

    #[tokio::test]
    async fn reattach_replaces_the_current_receipt() {
        let f = fixture(FakeOcr::Fails);
        let claim = draft(&f).await;
        let first = f
            .receipts
            .attach(&f.employee, claim.id, png("first.png"))
            .await
            .unwrap();
        let second = f
            .receipts
            .attach(&f.employee, claim.id, png("second.png"))
            .await
            .unwrap();

        assert!(!f.files.contains(&first.storage_key));
        assert!(f.files.contains(&second.storage_key));
        let current = f.store.find_receipt(claim.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);

        // A late OCR result for the replaced receipt is dropped.
        f.receipts.run_ocr(first, b"img".to_vec()).await;
        let current = f.store.find_receipt(claim.id).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn attach_rejects_bad_uploads_and_wrong_actors() {
        let f = fixture(FakeOcr::Fails);
        let claim = draft(&f).await;

        let mut text = png("notes.txt");
        text.content_type = "text/plain".to_string();
        let err = f.receipts.attach(&f.employee, claim.id, text).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let mut empty = png("empty.png");
        empty.data.clear();
        let err = f.receipts.attach(&f.employee, claim.id, empty).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        // Routed to the manager but not theirs to attach to.
        f.engine.submit(&f.employee, claim.id).await.unwrap();
        let err = f
            .receipts
            .attach(&f.manager, claim.id, png("m.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));

        let err = f
            .receipts
            .attach(&f.employee, Uuid::new_v4(), png("x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));

        f.engine
            .manager_approve(&f.manager, claim.id, None)
            .await
            .unwrap();
        let err = f
            .receipts
            .attach(&f.employee, claim.id, png("late.png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                status: ExpenseStatus::Approved,
                ..
            }
        ));
    }

    /// Lets the manager's decision land while the upload is being written.
    struct ApprovesDuringPut {
        inner: InMemoryReceiptFiles,
        engine: WorkflowEngine,
        manager: Principal,
    }

    #[async_trait]
    impl ReceiptFiles for ApprovesDuringPut {
        async fn put(
            &self,
            expense_id: Uuid,
            receipt_id: Uuid,
            extension: &str,
            data: &[u8],
        ) -> Result<String, StoreError> {
            self.engine
                .manager_approve(&self.manager, expense_id, None)
                .await
                .unwrap();
            self.inner.put(expense_id, receipt_id, extension, data).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn attach_rechecks_status_when_swapping_the_receipt() {
        let store = Arc::new(MemoryStore::default());
        let manager = store.add_user("mona", Role::Manager, None);
        let employee = store.add_user("eve", Role::Employee, Some(manager.id));
        let engine = WorkflowEngine::new(store.clone(), store.clone());
        let claim = engine
            .create(
                &employee,
                ExpenseInput {
                    title: "Hotel".to_string(),
                    amount: "310".parse().unwrap(),
                    category: ExpenseCategory::Travel,
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        engine.submit(&employee, claim.id).await.unwrap();

        let files = Arc::new(ApprovesDuringPut {
            inner: InMemoryReceiptFiles::default(),
            engine: WorkflowEngine::new(store.clone(), store.clone()),
            manager,
        });
        let receipts = Arc::new(ReceiptService::new(
            store.clone(),
            files.clone(),
            Arc::new(FakeOcr::Fails),
            Duration::from_millis(50),
        ));

        let err = receipts
            .attach(&employee, claim.id, png("hotel.png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                status: ExpenseStatus::Approved,
                ..
            }
        ));
        assert!(store.find_receipt(claim.id).await.unwrap().is_none());
        assert!(files.inner.is_empty());
    }

    #[tokio::test]
    async fn open_follows_the_receipt_gate() {
        let f = fixture(FakeOcr::Fails);
        let claim = draft(&f).await;
        f.receipts
            .attach(&f.employee, claim.id, png("r.png"))
            .await
            .unwrap();

        let (receipt, data) = f.receipts.open(&f.employee, claim.id).await.unwrap();
        assert_eq!(receipt.file_name, "r.png");
        assert_eq!(data, b"\x89PNG\r\n");

        // Draft receipts are hidden from everyone but the owner.
        let err = f.receipts.open(&f.manager, claim.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));

        f.engine.submit(&f.employee, claim.id).await.unwrap();
        assert!(f.receipts.open(&f.manager, claim.id).await.is_ok());
        assert!(matches!(
            f.receipts.open(&f.finance, claim.id).await,
            Err(WorkflowError::NotFound)
        ));

        f.engine
            .manager_approve(&f.manager, claim.id, None)
            .await
            .unwrap();
        assert!(f.receipts.open(&f.finance, claim.id).await.is_ok());

        let colleague = f.store.add_user("carl", Role::Employee, Some(f.manager.id));
        assert!(matches!(
            f.receipts.open(&colleague, claim.id).await,
            Err(WorkflowError::NotFound)
        ));
    }

    #[tokio::test]
    async fn open_without_receipt_is_not_found() {
        let f = fixture(FakeOcr::Fails);
        let claim = draft(&f).await;
        assert!(matches!(
            f.receipts.open(&f.employee, claim.id).await,
            Err(WorkflowError::NotFound)
        ));
    }

    #[tokio::test]
    async fn approver_without_gate_access_is_forbidden() {
        let f = fixture(FakeOcr::Fails);
        // Employee-role approver reached through `reports_to`.
        let lead = f.store.add_user("lena", Role::Employee, None);
        let report = f.store.add_user("raj", Role::Employee, Some(lead.id));
        let claim = f
            .engine
            .create(
                &report,
                ExpenseInput {
                    title: "Cab".to_string(),
                    amount: "18.40".parse().unwrap(),
                    category: ExpenseCategory::Travel,
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        f.receipts.attach(&report, claim.id, png("cab.png")).await.unwrap();
        f.engine.submit(&report, claim.id).await.unwrap();

        assert!(matches!(
            f.receipts.open(&lead, claim.id).await,
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn list_visible_is_scoped_by_role() {
        let f = fixture(FakeOcr::Fails);
        let draft_claim = draft(&f).await;
        let submitted = draft(&f).await;
        f.receipts
            .attach(&f.employee, draft_claim.id, png("a.png"))
            .await
            .unwrap();
        f.receipts
            .attach(&f.employee, submitted.id, png("b.png"))
            .await
            .unwrap();
        f.engine.submit(&f.employee, submitted.id).await.unwrap();

        assert_eq!(f.receipts.list_visible(&f.employee).await.unwrap().len(), 2);
        let managers = f.receipts.list_visible(&f.manager).await.unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].expense_id, submitted.id);
        assert!(f.receipts.list_visible(&f.finance).await.unwrap().is_empty());
    }
}
