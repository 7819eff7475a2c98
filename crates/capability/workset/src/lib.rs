//! # DMS Workset 模块
//!
//! 变量表编辑的内存工作集与持久化状态协调：
//!
//! - `cache`：工作集缓存（有序记录 + 变更事件广播）
//! - `dirty`：逐记录脏状态跟踪、快照与恢复
//! - `filter`：忽略大小写的文本过滤
//! - `merge`：批量导入合并（时间戳、归属、协议强制，整批原子写入）
//! - `activation`：变量表启用状态切换（先持久化再确认）
//! - `provision`：设备与默认变量表的原子创建
//! - `session`：对外的编辑会话
//! - `notify` / `prompt`：通知与确认对话框接口（由调用方实现）

pub mod activation;
pub mod cache;
pub mod dirty;
pub mod error;
pub mod filter;
pub mod merge;
pub mod notify;
pub mod prompt;
pub mod provision;
pub mod session;

pub use activation::set_table_active;
pub use cache::{CacheEvent, WorkingSetCache};
pub use dirty::{DirtyTracker, RecordState, Snapshot};
pub use error::SessionError;
pub use filter::FilterEngine;
pub use merge::{BulkImportMerger, MergeOutcome};
pub use notify::{Notifier, TracingNotifier};
pub use prompt::ConfirmPrompt;
pub use provision::create_device_with_table;
pub use session::{SessionOptions, VariableTableSession};
