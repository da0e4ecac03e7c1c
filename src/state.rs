use std::sync::Arc;

use crate::store::Directory;
use crate::workflow::{ReceiptService, WorkflowEngine};

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub receipts: Arc<ReceiptService>,
    pub directory: Arc<dyn Directory>,
    pub jwt_secret: Arc<str>,
}
