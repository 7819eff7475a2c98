//! 应用运行配置加载。

use domain::PollLevel;
use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 未设置时使用内存存储
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// 写入 `updated_by` 的操作员名
    pub operator: String,
    /// 导入记录的默认轮询级别
    pub default_poll_level: PollLevel,
    /// 启动时执行建表脚本
    pub apply_schema: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = read_optional("DMS_DATABASE_URL");
        let db_max_connections = read_u32_with_default("DMS_DB_MAX_CONNECTIONS", 8)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DMS_DB_MAX_CONNECTIONS".to_string(),
                "0".to_string(),
            ));
        }
        let operator = read_optional("DMS_OPERATOR").unwrap_or_else(|| "system".to_string());
        let default_poll_level = match read_optional("DMS_DEFAULT_POLL_LEVEL") {
            Some(value) => value
                .parse::<PollLevel>()
                .map_err(|_| ConfigError::Invalid("DMS_DEFAULT_POLL_LEVEL".to_string(), value))?,
            None => PollLevel::default(),
        };
        let apply_schema = read_bool_with_default("DMS_APPLY_SCHEMA", false);

        Ok(Self {
            database_url,
            db_max_connections,
            operator,
            default_poll_level,
            apply_schema,
        })
    }

    /// 读取必需的数据库地址。
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("DMS_DATABASE_URL".to_string()))
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
