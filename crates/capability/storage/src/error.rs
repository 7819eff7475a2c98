//! 存储层错误类型
//!
//! 定义统一的存储错误类型，用于封装底层错误：
//! - 记录不存在
//! - 字段校验失败
//! - 外键 / 唯一约束冲突
//! - 连接错误
//! - 并发冲突（预期行数与实际影响行数不一致）

/// 存储错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    Validation,
    Constraint,
    Connectivity,
    Conflict,
    Backend,
}

impl StorageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::NotFound => "not_found",
            StorageErrorKind::Validation => "validation",
            StorageErrorKind::Constraint => "constraint",
            StorageErrorKind::Connectivity => "connectivity",
            StorageErrorKind::Conflict => "conflict",
            StorageErrorKind::Backend => "backend",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Backend, message)
    }

    pub fn with_kind(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Validation, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Constraint, message)
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Connectivity, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Conflict, message)
    }

    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => StorageErrorKind::NotFound,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageErrorKind::Constraint
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageErrorKind::Constraint,
            sqlx::Error::Database(db) if db.is_check_violation() => StorageErrorKind::Validation,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StorageErrorKind::Connectivity,
            _ => StorageErrorKind::Backend,
        };
        Self::with_kind(kind, err.to_string())
    }
}
