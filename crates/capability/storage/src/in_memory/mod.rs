//! 内存存储实现模块
//!
//! 用于测试和本地演示，事务语义与 Postgres 实现一致：
//! - 事务内写入对其他工作单元不可见，直到提交
//! - 事务内任一写入失败整体回滚
//! - 外键、协议一致性在写入前检查

pub mod repository;
pub mod store;
pub mod tables;

pub use repository::InMemoryRepository;
pub use store::{InMemoryEntityStore, InMemoryUnitOfWork};
