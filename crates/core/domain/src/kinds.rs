//! 枚举类型与文本互转。
//!
//! 存储层以文本列保存枚举值，统一使用 `as_str()` / `FromStr`。

use std::fmt;
use std::str::FromStr;

/// 枚举解析失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

impl ParseKindError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseKindError {}

/// 变量表协议类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolType {
    #[default]
    S7,
    OpcUa,
    Mqtt,
    Modbus,
}

impl ProtocolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::S7 => "s7",
            ProtocolType::OpcUa => "opcua",
            ProtocolType::Mqtt => "mqtt",
            ProtocolType::Modbus => "modbus",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolType {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s7" => Ok(ProtocolType::S7),
            "opcua" | "opc_ua" | "opc-ua" => Ok(ProtocolType::OpcUa),
            "mqtt" => Ok(ProtocolType::Mqtt),
            "modbus" | "modbus_tcp" => Ok(ProtocolType::Modbus),
            _ => Err(ParseKindError::new("protocol type", value)),
        }
    }
}

/// 轮询级别：外部调度器据此决定刷新频率。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PollLevel {
    HundredMilliseconds,
    FiveHundredMilliseconds,
    OneSecond,
    FiveSeconds,
    TenSeconds,
    #[default]
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    ThirtyMinutes,
    OneHour,
}

impl PollLevel {
    pub const ALL: [PollLevel; 10] = [
        PollLevel::HundredMilliseconds,
        PollLevel::FiveHundredMilliseconds,
        PollLevel::OneSecond,
        PollLevel::FiveSeconds,
        PollLevel::TenSeconds,
        PollLevel::ThirtySeconds,
        PollLevel::OneMinute,
        PollLevel::FiveMinutes,
        PollLevel::ThirtyMinutes,
        PollLevel::OneHour,
    ];

    /// 轮询间隔（毫秒）。
    pub fn interval_ms(&self) -> u64 {
        match self {
            PollLevel::HundredMilliseconds => 100,
            PollLevel::FiveHundredMilliseconds => 500,
            PollLevel::OneSecond => 1_000,
            PollLevel::FiveSeconds => 5_000,
            PollLevel::TenSeconds => 10_000,
            PollLevel::ThirtySeconds => 30_000,
            PollLevel::OneMinute => 60_000,
            PollLevel::FiveMinutes => 300_000,
            PollLevel::ThirtyMinutes => 1_800_000,
            PollLevel::OneHour => 3_600_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollLevel::HundredMilliseconds => "100ms",
            PollLevel::FiveHundredMilliseconds => "500ms",
            PollLevel::OneSecond => "1s",
            PollLevel::FiveSeconds => "5s",
            PollLevel::TenSeconds => "10s",
            PollLevel::ThirtySeconds => "30s",
            PollLevel::OneMinute => "1min",
            PollLevel::FiveMinutes => "5min",
            PollLevel::ThirtyMinutes => "30min",
            PollLevel::OneHour => "1h",
        }
    }
}

impl fmt::Display for PollLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollLevel {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        PollLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| ParseKindError::new("poll level", value))
    }
}

/// OPC UA 数据更新方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpcUaUpdateMode {
    #[default]
    Poll,
    Subscription,
}

impl OpcUaUpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpcUaUpdateMode::Poll => "poll",
            OpcUaUpdateMode::Subscription => "subscription",
        }
    }
}

impl FromStr for OpcUaUpdateMode {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "poll" => Ok(OpcUaUpdateMode::Poll),
            "subscription" | "subscribe" => Ok(OpcUaUpdateMode::Subscription),
            _ => Err(ParseKindError::new("opcua update mode", value)),
        }
    }
}

/// 信号类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignalType {
    #[default]
    Analog,
    Digital,
    Other,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Analog => "analog",
            SignalType::Digital => "digital",
            SignalType::Other => "other",
        }
    }

    /// 按数据类型推断信号类型（Bool 视为数字量）。
    pub fn infer(data_type: &str) -> Self {
        match data_type.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => SignalType::Digital,
            "" => SignalType::Other,
            _ => SignalType::Analog,
        }
    }
}

impl FromStr for SignalType {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "analog" => Ok(SignalType::Analog),
            "digital" => Ok(SignalType::Digital),
            "other" => Ok(SignalType::Other),
            _ => Err(ParseKindError::new("signal type", value)),
        }
    }
}
