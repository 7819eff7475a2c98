//! 变量导入来源
//!
//! - `tia`：TIA Portal 导出的 PLC 变量表（xlsx）
//! - `opcua`：OPC UA 服务器浏览结果（驱动接口或 JSON 导出）
//!
//! 来源只负责把外部记录转换为 `ImportedVariable`；归属、时间戳与持久化由工作集的批量导入合并完成。

pub mod opcua;
pub mod tia;

pub use opcua::{BrowsedNode, OpcUaBrowseSource, OpcUaBrowser, parse_browse_dump};
pub use tia::{TiaTagTableSource, parse_tag_rows};

use async_trait::async_trait;
use domain::{OpcUaUpdateMode, PollLevel, ProtocolType, SignalType, Variable};

/// 导入错误。
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to open workbook: {0}")]
    OpenWorkbook(String),
    #[error("workbook has no worksheet")]
    NoWorksheet,
    #[error("worksheet has no header row")]
    NoHeaderRow,
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),
    #[error("browse failed: {0}")]
    Browse(String),
    #[error("invalid browse dump: {0}")]
    Dump(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("import task failed: {0}")]
    Task(String),
}

/// 外部来源的一条变量记录。
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedVariable {
    pub name: String,
    pub description: String,
    pub protocol: ProtocolType,
    /// 协议地址：S7 地址 / OPC UA 节点 ID / 通用地址
    pub address: String,
    pub data_type: String,
    pub update_mode: Option<OpcUaUpdateMode>,
}

impl ImportedVariable {
    /// 转换为未持久化的变量（ID 为 0，归属与时间戳由导入合并填写）。
    pub fn into_variable(self, poll_level: PollLevel) -> Variable {
        let mut variable = Variable {
            name: self.name,
            description: self.description,
            protocol: self.protocol,
            signal_type: SignalType::infer(&self.data_type),
            data_type: self.data_type,
            poll_level,
            is_active: true,
            ..Default::default()
        };
        match self.protocol {
            ProtocolType::S7 => variable.s7_address = Some(self.address),
            ProtocolType::OpcUa => variable.opcua_node_id = Some(self.address),
            ProtocolType::Mqtt | ProtocolType::Modbus => variable.address = Some(self.address),
        }
        if let Some(mode) = self.update_mode {
            variable.opcua_update_mode = mode;
        }
        variable
    }
}

/// 导入来源。
#[async_trait]
pub trait ImportSource: Send + Sync {
    /// 协议型来源返回其协议，导入时强制覆盖每条记录的协议；表格来源返回 None。
    fn source_protocol(&self) -> Option<ProtocolType>;

    /// 来源描述（用于日志与提示）
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Vec<ImportedVariable>, ImportError>;
}
