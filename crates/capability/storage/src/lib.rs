//! # DMS Storage 模块
//!
//! 变量管理的持久化抽象层：每种实体一个仓储，多个仓储通过工作单元共享事务。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`Repository<T>`、`UnitOfWork`、`EntityStore`
//! 2. **错误处理层** (`error.rs`)：带分类的 `StorageError`
//! 3. **验证辅助层** (`validation.rs`)：变量字段、协议一致性校验
//! 4. **事务辅助层** (`transaction.rs`)：`begin` / `finish`
//! 5. **连接管理层** (`connection.rs`)：连接池与建表脚本
//! 6. **实现层**：
//!    - `in_memory/`：内存实现（测试、演示；支持故障注入）
//!    - `postgres/`：PostgreSQL 实现（生产环境）
//!
//! ## 事务语义
//!
//! - 未开启事务时，每次仓储调用（含批量调用）独立提交，单次批量调用原子
//! - 开启事务后，同一工作单元内的所有写入共享事务，要么全部生效要么全部不生效
//! - 事务内任一写入失败立即回滚；未提交即丢弃的工作单元等同回滚
//!
//! ## 引用完整性
//!
//! - 变量表必须引用已存在的设备，变量必须引用已存在的变量表
//! - 删除设备 / 变量表前必须先删除其下属记录（不做隐式级联删除）
//! - 变量表已有变量时协议不可修改，变量协议必须与变量表一致
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use dms_storage::{EntityStore, InMemoryEntityStore, begin, finish};
//!
//! let store = InMemoryEntityStore::new();
//! let mut uow = begin(&store).await?;
//! let result = uow.variables().add_batch(records).await;
//! let inserted = finish(uow, result).await?;
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod traits;
pub mod transaction;
pub mod validation;

pub use connection::*;
pub use error::*;
pub use traits::*;
pub use transaction::*;
pub use validation::*;

pub use in_memory::{InMemoryEntityStore, InMemoryUnitOfWork};
pub use postgres::{PgEntityStore, PgUnitOfWork};
