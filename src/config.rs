//! Process configuration, read once at startup.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub receipts_dir: PathBuf,
    pub ocr_service_url: String,
    pub ocr_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `JWT_SECRET`
    ///
    /// Optional:
    /// - `PORT` (default 3000)
    /// - `RECEIPTS_DIR` (default `storage/receipts`)
    /// - `OCR_SERVICE_URL` (default `http://127.0.0.1:8001`)
    /// - `OCR_TIMEOUT_SECS` (default 12)
    /// - `MAX_UPLOAD_BYTES` (default 10 MiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let ocr_timeout_secs: u64 = parse_or(&lookup, "OCR_TIMEOUT_SECS", 12)?;
        if ocr_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "OCR_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            port: parse_or(&lookup, "PORT", 3000)?,
            receipts_dir: lookup("RECEIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage/receipts")),
            ocr_service_url: lookup("OCR_SERVICE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8001".to_string()),
            ocr_timeout: Duration::from_secs(ocr_timeout_secs),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
