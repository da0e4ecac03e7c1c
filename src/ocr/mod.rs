//! Receipt text extraction.
//!
//! The OCR service is an external HTTP dependency. Callers see it through
//! [`OcrService`] so the workflow can be exercised without a network.

mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::OcrFields;

pub use client::HttpOcrClient;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR timeout")]
    Timeout,

    #[error("OCR request failed: {0}")]
    Request(String),

    #[error("OCR returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("OCR returned invalid JSON")]
    InvalidJson,
}

#[async_trait]
pub trait OcrService: Send + Sync + 'static {
    async fn extract(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<OcrFields, OcrError>;
}
