//! 变量模型与类型化字段编辑。
//!
//! 编辑边界以 `(记录, 字段 ID, 旧值, 新值)` 的形式把修改显式传入核心，
//! 不依赖运行时反射或属性变更回调。

use crate::Entity;
use crate::kinds::{OpcUaUpdateMode, PollLevel, ProtocolType, SignalType};
use std::collections::BTreeSet;
use std::fmt;

/// 变量记录。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub id: i64,
    pub variable_table_id: i64,
    pub name: String,
    pub description: String,
    pub protocol: ProtocolType,
    pub signal_type: SignalType,
    /// S7 地址，例如 `DB1.DBD0`
    pub s7_address: Option<String>,
    /// OPC UA 节点 ID，例如 `ns=2;s=Line1.Speed`
    pub opcua_node_id: Option<String>,
    /// 通用地址（MQTT 主题、Modbus 寄存器等）
    pub address: Option<String>,
    pub data_type: String,
    /// 当前原始值
    pub data_value: String,
    /// 转换后的显示值
    pub display_value: String,
    /// 转换公式
    pub conversion: String,
    pub is_active: bool,
    pub is_alarm_enabled: bool,
    pub alarm_min: f64,
    pub alarm_max: f64,
    pub alarm_deadband: f64,
    pub is_history_enabled: bool,
    pub history_deadband: f64,
    pub poll_level: PollLevel,
    pub opcua_update_mode: OpcUaUpdateMode,
    pub last_poll_at_ms: Option<i64>,
    /// 逻辑删除标记
    pub is_deleted: bool,
    /// 脏标记（仅工作集使用，不落库）
    pub is_modified: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub updated_by: Option<String>,
    /// 关联的 MQTT 目标（集合语义，重复关联无效果）
    pub mqtt_target_ids: BTreeSet<i64>,
}

impl Entity for Variable {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// 可编辑字段 ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableField {
    Name,
    Description,
    S7Address,
    OpcUaNodeId,
    Address,
    DataType,
    DataValue,
    DisplayValue,
    Conversion,
    IsActive,
    IsAlarmEnabled,
    AlarmMin,
    AlarmMax,
    AlarmDeadband,
    IsHistoryEnabled,
    HistoryDeadband,
    PollLevel,
    OpcUaUpdateMode,
}

impl VariableField {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableField::Name => "name",
            VariableField::Description => "description",
            VariableField::S7Address => "s7_address",
            VariableField::OpcUaNodeId => "opcua_node_id",
            VariableField::Address => "address",
            VariableField::DataType => "data_type",
            VariableField::DataValue => "data_value",
            VariableField::DisplayValue => "display_value",
            VariableField::Conversion => "conversion",
            VariableField::IsActive => "is_active",
            VariableField::IsAlarmEnabled => "is_alarm_enabled",
            VariableField::AlarmMin => "alarm_min",
            VariableField::AlarmMax => "alarm_max",
            VariableField::AlarmDeadband => "alarm_deadband",
            VariableField::IsHistoryEnabled => "is_history_enabled",
            VariableField::HistoryDeadband => "history_deadband",
            VariableField::PollLevel => "poll_level",
            VariableField::OpcUaUpdateMode => "opcua_update_mode",
        }
    }
}

/// 类型化字段值。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    OptionalText(Option<String>),
    Bool(bool),
    Number(f64),
    Poll(PollLevel),
    UpdateMode(OpcUaUpdateMode),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::OptionalText(_) => "optional text",
            FieldValue::Bool(_) => "bool",
            FieldValue::Number(_) => "number",
            FieldValue::Poll(_) => "poll level",
            FieldValue::UpdateMode(_) => "update mode",
        }
    }
}

/// 字段写入失败（值类型与字段不匹配）。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: VariableField,
    pub expected: &'static str,
    pub actual: &'static str,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {} expects {}, got {}",
            self.field.as_str(),
            self.expected,
            self.actual
        )
    }
}

impl std::error::Error for FieldError {}

/// 编辑边界传入的单字段修改事件。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub record_id: i64,
    pub field: VariableField,
    pub old: FieldValue,
    pub new: FieldValue,
}

impl Variable {
    /// 读取字段当前值。
    pub fn field(&self, field: VariableField) -> FieldValue {
        match field {
            VariableField::Name => FieldValue::Text(self.name.clone()),
            VariableField::Description => FieldValue::Text(self.description.clone()),
            VariableField::S7Address => FieldValue::OptionalText(self.s7_address.clone()),
            VariableField::OpcUaNodeId => FieldValue::OptionalText(self.opcua_node_id.clone()),
            VariableField::Address => FieldValue::OptionalText(self.address.clone()),
            VariableField::DataType => FieldValue::Text(self.data_type.clone()),
            VariableField::DataValue => FieldValue::Text(self.data_value.clone()),
            VariableField::DisplayValue => FieldValue::Text(self.display_value.clone()),
            VariableField::Conversion => FieldValue::Text(self.conversion.clone()),
            VariableField::IsActive => FieldValue::Bool(self.is_active),
            VariableField::IsAlarmEnabled => FieldValue::Bool(self.is_alarm_enabled),
            VariableField::AlarmMin => FieldValue::Number(self.alarm_min),
            VariableField::AlarmMax => FieldValue::Number(self.alarm_max),
            VariableField::AlarmDeadband => FieldValue::Number(self.alarm_deadband),
            VariableField::IsHistoryEnabled => FieldValue::Bool(self.is_history_enabled),
            VariableField::HistoryDeadband => FieldValue::Number(self.history_deadband),
            VariableField::PollLevel => FieldValue::Poll(self.poll_level),
            VariableField::OpcUaUpdateMode => FieldValue::UpdateMode(self.opcua_update_mode),
        }
    }

    /// 写入字段，返回值是否发生变化。
    pub fn set_field(&mut self, field: VariableField, value: FieldValue) -> Result<bool, FieldError> {
        if self.field(field) == value {
            return Ok(false);
        }
        match (field, value) {
            (VariableField::Name, FieldValue::Text(v)) => self.name = v,
            (VariableField::Description, FieldValue::Text(v)) => self.description = v,
            (VariableField::S7Address, FieldValue::OptionalText(v)) => self.s7_address = v,
            (VariableField::OpcUaNodeId, FieldValue::OptionalText(v)) => self.opcua_node_id = v,
            (VariableField::Address, FieldValue::OptionalText(v)) => self.address = v,
            (VariableField::DataType, FieldValue::Text(v)) => self.data_type = v,
            (VariableField::DataValue, FieldValue::Text(v)) => self.data_value = v,
            (VariableField::DisplayValue, FieldValue::Text(v)) => self.display_value = v,
            (VariableField::Conversion, FieldValue::Text(v)) => self.conversion = v,
            (VariableField::IsActive, FieldValue::Bool(v)) => self.is_active = v,
            (VariableField::IsAlarmEnabled, FieldValue::Bool(v)) => self.is_alarm_enabled = v,
            (VariableField::AlarmMin, FieldValue::Number(v)) => self.alarm_min = v,
            (VariableField::AlarmMax, FieldValue::Number(v)) => self.alarm_max = v,
            (VariableField::AlarmDeadband, FieldValue::Number(v)) => self.alarm_deadband = v,
            (VariableField::IsHistoryEnabled, FieldValue::Bool(v)) => self.is_history_enabled = v,
            (VariableField::HistoryDeadband, FieldValue::Number(v)) => self.history_deadband = v,
            (VariableField::PollLevel, FieldValue::Poll(v)) => self.poll_level = v,
            (VariableField::OpcUaUpdateMode, FieldValue::UpdateMode(v)) => {
                self.opcua_update_mode = v
            }
            (field, value) => {
                return Err(FieldError {
                    field,
                    expected: self.field(field).kind(),
                    actual: value.kind(),
                });
            }
        }
        Ok(true)
    }

    /// 报警启用时要求上限不小于下限。
    pub fn alarm_range_valid(&self) -> bool {
        !self.is_alarm_enabled || self.alarm_max >= self.alarm_min
    }

    /// 协议相关地址（S7 地址 / OPC UA 节点 / 通用地址）。
    pub fn protocol_address(&self) -> Option<&str> {
        match self.protocol {
            ProtocolType::S7 => self.s7_address.as_deref(),
            ProtocolType::OpcUa => self.opcua_node_id.as_deref(),
            ProtocolType::Mqtt | ProtocolType::Modbus => self.address.as_deref(),
        }
    }
}
