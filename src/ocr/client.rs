use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{OcrError, OcrService};
use crate::models::OcrFields;

/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 300;

pub struct HttpOcrClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOcrClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/ocr", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl OcrService for HttpOcrClient {
    async fn extract(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<OcrFields, OcrError> {
        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|e| OcrError::Request(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout
                } else {
                    OcrError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                OcrError::Timeout
            } else {
                OcrError::Request(e.to_string())
            }
        })?;
        serde_json::from_slice(&body).map_err(|_| OcrError::InvalidJson)
    }
}
