//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用的仓储与工作单元实现。
//!
//! ## 数据库模式
//!
//! 见 `migrations/0001_init.sql`：
//! - `devices` / `variable_tables` / `variables`：外键 `on delete restrict`，
//!   删除设备或变量表前必须先删除其下属记录
//! - `variable_mqtt_targets`：变量与 MQTT 目标的多对多关联
//! - `variable_histories`：只追加的历史值
//!
//! ## 批量写入
//!
//! - 插入使用 `QueryBuilder::push_values` 多行 insert + `returning`，按块拆分
//! - 删除使用 `where id = any($1)`
//! - 所有 SQL 使用参数绑定

pub mod entity;
pub mod repository;
pub mod store;

pub use entity::PgEntity;
pub use repository::PgRepository;
pub use store::{PgEntityStore, PgUnitOfWork};
