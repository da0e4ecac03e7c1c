use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const SUPPORTED_CONTENT_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/tiff",
    "application/pdf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcrStatus {
    Pending,
    Success,
    Failed,
}

/// Fields the OCR service extracted from a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFields {
    pub vendor: Option<String>,
    /// ISO-8601 date as reported by the service.
    pub date: Option<String>,
    pub total_amount: Option<Decimal>,
    pub confidence: f64,
    #[serde(default)]
    pub raw_text: String,
}

/// The current receipt of a claim. A claim owns at most one.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub ocr_status: OcrStatus,
    pub ocr_confidence: Option<f64>,
    pub ocr_result: Option<sqlx::types::Json<OcrFields>>,
    pub ocr_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal result of one OCR attempt, written back onto the receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    Extracted(OcrFields),
    Failed(String),
}

impl Receipt {
    pub fn apply_outcome(&mut self, outcome: OcrOutcome, now: DateTime<Utc>) {
        match outcome {
            OcrOutcome::Extracted(fields) => {
                self.ocr_status = OcrStatus::Success;
                self.ocr_confidence = Some(fields.confidence.clamp(0.0, 1.0));
                self.ocr_result = Some(sqlx::types::Json(fields));
                self.ocr_error = None;
            }
            OcrOutcome::Failed(message) => {
                self.ocr_status = OcrStatus::Failed;
                self.ocr_confidence = None;
                self.ocr_result = None;
                self.ocr_error = Some(message);
            }
        }
        self.updated_at = now;
    }
}

pub fn is_supported_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    SUPPORTED_CONTENT_TYPES
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(essence))
}

/// File extension for a supported content type, used for the stored file name.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/tiff" => "tiff",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
