//! 工作集错误类型

use dms_import::ImportError;
use dms_storage::{StorageError, StorageErrorKind};
use domain::FieldError;

/// 编辑会话错误。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(StorageError),
    #[error("import error: {0}")]
    Import(#[from] ImportError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrency conflict: {0}")]
    Conflict(String),
    #[error("invalid edit: {0}")]
    Field(#[from] FieldError),
    #[error("no variable table loaded")]
    NotLoaded,
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err.kind() {
            StorageErrorKind::NotFound => SessionError::NotFound(err.message().to_string()),
            StorageErrorKind::Validation => SessionError::Validation(err.message().to_string()),
            StorageErrorKind::Conflict => SessionError::Conflict(err.message().to_string()),
            _ => SessionError::Storage(err),
        }
    }
}
