//! Receipt file storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::StoreError;

/// Blob storage for uploaded receipt files.
///
/// `put` writes `{expense_id}/{receipt_id}.{ext}`. Receipts folded in from the
/// old schema keep their original media-relative path (`receipts/lunch.png`).
#[async_trait]
pub trait ReceiptFiles: Send + Sync + 'static {
    /// Store `data` and return its key.
    async fn put(
        &self,
        expense_id: Uuid,
        receipt_id: Uuid,
        extension: &str,
        data: &[u8],
    ) -> Result<String, StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Removing a missing file is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Receipts on the local filesystem under `base`.
pub struct LocalReceiptFiles {
    base: PathBuf,
}

impl LocalReceiptFiles {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// Resolve a key to a path under `base`. A key is a relative path of
    /// plain segments (`[A-Za-z0-9._-]`); `.` and `..` segments are refused.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let invalid = || StoreError::InvalidKey(key.to_string());
        let plain = |segment: &str| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        };
        if !key.split('/').all(plain) {
            return Err(invalid());
        }

        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }
        Ok(self.base.join(relative))
    }
}

#[async_trait]
impl ReceiptFiles for LocalReceiptFiles {
    async fn put(
        &self,
        expense_id: Uuid,
        receipt_id: Uuid,
        extension: &str,
        data: &[u8],
    ) -> Result<String, StoreError> {
        let key = format!("{expense_id}/{receipt_id}.{extension}");
        let path = self.resolve(&key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, data).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("receipt file {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
