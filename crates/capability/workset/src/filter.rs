//! 工作集文本过滤
//!
//! 空白搜索词匹配全部记录；否则在名称、描述、S7 地址、OPC UA 节点、
//! 通用地址、当前值、显示值中做忽略大小写的子串匹配。

use domain::Variable;

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    search_text: String,
    needle: Option<String>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_search_text(&mut self, text: &str) {
        self.search_text = text.to_string();
        self.needle = if text.trim().is_empty() {
            None
        } else {
            Some(text.to_lowercase())
        };
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn is_match(&self, record: &Variable) -> bool {
        match &self.needle {
            None => true,
            Some(needle) => searchable_fields(record)
                .any(|value| value.to_lowercase().contains(needle.as_str())),
        }
    }

    /// 返回匹配记录，保持工作集顺序。
    pub fn apply<'a>(&self, records: &'a [Variable]) -> Vec<&'a Variable> {
        records.iter().filter(|record| self.is_match(record)).collect()
    }
}

fn searchable_fields(record: &Variable) -> impl Iterator<Item = &str> {
    [
        Some(record.name.as_str()),
        Some(record.description.as_str()),
        record.s7_address.as_deref(),
        record.opcua_node_id.as_deref(),
        record.address.as_deref(),
        Some(record.data_value.as_str()),
        Some(record.display_value.as_str()),
    ]
    .into_iter()
    .flatten()
}
