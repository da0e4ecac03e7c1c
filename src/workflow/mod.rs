//! The claim lifecycle: transitions, role-scoped reads and receipts.

pub mod engine;
pub mod receipts;
pub mod scope;
pub mod transition;

pub use engine::{ClaimDetail, WorkflowEngine};
pub use receipts::{ReceiptService, Upload};
