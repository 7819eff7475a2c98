use crate::Entity;
use crate::kinds::ProtocolType;

/// 设备记录。
///
/// S7 设备使用 `ip/rack/slot`，OPC UA 设备使用 `opcua_endpoint_url`。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub protocol: ProtocolType,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub rack: Option<i16>,
    pub slot: Option<i16>,
    pub opcua_endpoint_url: Option<String>,
    pub is_active: bool,
}

/// 变量表记录（归属唯一设备）。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableTable {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    pub description: String,
    pub protocol: ProtocolType,
    pub is_active: bool,
}

/// MQTT 发布目标。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MqttTarget {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub is_active: bool,
}

/// 变量历史值（只追加，由外部采集方写入）。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableHistory {
    pub id: i64,
    pub variable_id: i64,
    pub value: String,
    pub ts_ms: i64,
}

impl Entity for Device {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl Entity for VariableTable {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl Entity for MqttTarget {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

impl Entity for VariableHistory {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}
