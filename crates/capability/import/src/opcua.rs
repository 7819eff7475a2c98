//! OPC UA 浏览结果导入
//!
//! 两种输入：
//! - 在线浏览：通过 `OpcUaBrowser` 驱动接口浏览服务器（驱动由外部提供）
//! - 浏览导出：JSON 数组，每项为一个节点
//!
//! 只保留 Variable 类节点；所有记录强制为 OPC UA 协议，默认订阅方式更新。

use crate::{ImportError, ImportSource, ImportedVariable};
use async_trait::async_trait;
use domain::{OpcUaUpdateMode, ProtocolType};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 浏览得到的节点。
///
/// 导出中名称可能同时出现 `name`、`displayName`、`browseName`，按此顺序取第一个。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct BrowsedNode {
    pub name: String,
    pub node_id: String,
    pub node_class: String,
    pub data_type: String,
    pub description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "display_name")]
    display_name: Option<String>,
    #[serde(default, alias = "browse_name")]
    browse_name: Option<String>,
    #[serde(alias = "node_id", alias = "nodeid")]
    node_id: String,
    #[serde(default, alias = "node_class")]
    node_class: String,
    #[serde(default, alias = "data_type")]
    data_type: String,
    #[serde(default)]
    description: String,
}

impl TryFrom<RawNode> for BrowsedNode {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .or(raw.display_name)
            .or(raw.browse_name)
            .ok_or_else(|| format!("node {} has no name", raw.node_id))?;
        Ok(Self {
            name,
            node_id: raw.node_id,
            node_class: raw.node_class,
            data_type: raw.data_type,
            description: raw.description,
        })
    }
}

impl BrowsedNode {
    /// 节点类别缺省视为变量
    fn is_variable(&self) -> bool {
        let class = self.node_class.trim();
        class.is_empty() || class.eq_ignore_ascii_case("variable")
    }
}

/// OPC UA 浏览驱动（外部实现）。
#[async_trait]
pub trait OpcUaBrowser: Send + Sync {
    async fn browse(&self, endpoint_url: &str) -> Result<Vec<BrowsedNode>, ImportError>;
}

/// 解析 JSON 浏览导出。
pub fn parse_browse_dump(text: &str) -> Result<Vec<BrowsedNode>, ImportError> {
    Ok(serde_json::from_str(text)?)
}

enum BrowseInput {
    Live {
        browser: Arc<dyn OpcUaBrowser>,
        endpoint_url: String,
    },
    Dump(PathBuf),
}

/// OPC UA 来源（协议强制来源）。
pub struct OpcUaBrowseSource {
    input: BrowseInput,
    update_mode: OpcUaUpdateMode,
}

impl OpcUaBrowseSource {
    pub fn live(browser: Arc<dyn OpcUaBrowser>, endpoint_url: impl Into<String>) -> Self {
        Self {
            input: BrowseInput::Live {
                browser,
                endpoint_url: endpoint_url.into(),
            },
            update_mode: OpcUaUpdateMode::Subscription,
        }
    }

    pub fn from_dump(path: impl Into<PathBuf>) -> Self {
        Self {
            input: BrowseInput::Dump(path.into()),
            update_mode: OpcUaUpdateMode::Subscription,
        }
    }

    pub fn with_update_mode(mut self, update_mode: OpcUaUpdateMode) -> Self {
        self.update_mode = update_mode;
        self
    }

    fn to_records(&self, nodes: Vec<BrowsedNode>) -> Vec<ImportedVariable> {
        nodes
            .into_iter()
            .filter(|node| node.is_variable() && !node.node_id.trim().is_empty())
            .map(|node| ImportedVariable {
                name: node.name,
                description: node.description,
                protocol: ProtocolType::OpcUa,
                address: node.node_id.trim().to_string(),
                data_type: node.data_type,
                update_mode: Some(self.update_mode),
            })
            .collect()
    }
}

#[async_trait]
impl ImportSource for OpcUaBrowseSource {
    fn source_protocol(&self) -> Option<ProtocolType> {
        Some(ProtocolType::OpcUa)
    }

    fn describe(&self) -> String {
        match &self.input {
            BrowseInput::Live { endpoint_url, .. } => format!("opcua server {endpoint_url}"),
            BrowseInput::Dump(path) => format!("opcua browse dump {}", path.display()),
        }
    }

    async fn fetch(&self) -> Result<Vec<ImportedVariable>, ImportError> {
        let nodes = match &self.input {
            BrowseInput::Live {
                browser,
                endpoint_url,
            } => browser.browse(endpoint_url).await?,
            BrowseInput::Dump(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                parse_browse_dump(&text)?
            }
        };
        let browsed = nodes.len();
        let records = self.to_records(nodes);
        info!(
            target: "dms.import",
            source = %self.describe(),
            browsed,
            variables = records.len(),
            "opcua_browse_read"
        );
        Ok(records)
    }
}
