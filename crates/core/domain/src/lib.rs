//! 变量管理核心领域模型
//!
//! - `asset`：设备、变量表、MQTT 目标、历史记录
//! - `variable`：变量及其可编辑字段（类型化字段 ID 与字段值）
//! - `kinds`：协议类型、轮询级别等枚举

pub mod asset;
pub mod kinds;
pub mod variable;

pub use asset::{Device, MqttTarget, VariableHistory, VariableTable};
pub use kinds::{OpcUaUpdateMode, ParseKindError, PollLevel, ProtocolType, SignalType};
pub use variable::{FieldEdit, FieldError, FieldValue, Variable, VariableField};

use std::time::{SystemTime, UNIX_EPOCH};

/// 持久化实体：以整数 ID 作为所有关系的连接键。
///
/// `0` 表示尚未持久化，由存储层在插入时分配。
pub trait Entity {
    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
}

/// 当前 Unix 毫秒时间戳。
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
