//! TIA Portal PLC 变量表导入
//!
//! 读取导出文件的第一张 sheet，首行为表头：
//! - 必需列：`Name`、`Data Type`、`Logical Address`
//! - 可选列：`Comment`
//!
//! 表头匹配忽略大小写与多余空白，并接受中文表头。
//! 逻辑地址去掉前导 `%`（`%DB1.DBD0` → `DB1.DBD0`）；名称或地址为空的行跳过。

use crate::{ImportError, ImportSource, ImportedVariable};
use async_trait::async_trait;
use calamine::{Data, Reader, open_workbook_auto};
use domain::ProtocolType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NAME_HEADERS: &[&str] = &["name", "名称", "变量名"];
const DATA_TYPE_HEADERS: &[&str] = &["data type", "datatype", "数据类型"];
const ADDRESS_HEADERS: &[&str] = &["logical address", "address", "逻辑地址", "地址"];
const COMMENT_HEADERS: &[&str] = &["comment", "注释", "描述"];

/// TIA 变量表来源（S7 地址，非协议强制来源）。
#[derive(Debug, Clone)]
pub struct TiaTagTableSource {
    path: PathBuf,
}

impl TiaTagTableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImportSource for TiaTagTableSource {
    fn source_protocol(&self) -> Option<ProtocolType> {
        None
    }

    fn describe(&self) -> String {
        format!("tia tag table {}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<ImportedVariable>, ImportError> {
        let path = self.path.clone();
        let records = tokio::task::spawn_blocking(move || read_tag_table(&path))
            .await
            .map_err(|err| ImportError::Task(err.to_string()))??;
        info!(
            target: "dms.import",
            source = %self.describe(),
            rows = records.len(),
            "tia_tag_table_read"
        );
        Ok(records)
    }
}

fn read_tag_table(path: &Path) -> Result<Vec<ImportedVariable>, ImportError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|err| ImportError::OpenWorkbook(err.to_string()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::NoWorksheet)?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| ImportError::OpenWorkbook(err.to_string()))?;
    parse_tag_rows(range.rows())
}

fn cell_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Float(v) => format!("{v}"),
        Data::Int(v) => format!("{v}"),
        Data::Bool(v) => v.to_string(),
        other => other.to_string().trim().to_string(),
    };
    if text.is_empty() { None } else { Some(text) }
}

fn normalize_header(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| aliases.iter().any(|alias| header == alias))
}

/// 解析变量表行（首行为表头）。
pub fn parse_tag_rows<'a>(
    rows: impl IntoIterator<Item = &'a [Data]>,
) -> Result<Vec<ImportedVariable>, ImportError> {
    let mut rows = rows.into_iter();
    let header_row = rows.next().ok_or(ImportError::NoHeaderRow)?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_string(cell).map(|s| normalize_header(&s)).unwrap_or_default())
        .collect();

    let name_col = find_column(&headers, NAME_HEADERS);
    let type_col = find_column(&headers, DATA_TYPE_HEADERS);
    let address_col = find_column(&headers, ADDRESS_HEADERS);
    let comment_col = find_column(&headers, COMMENT_HEADERS);
    let (Some(name_col), Some(type_col), Some(address_col)) = (name_col, type_col, address_col)
    else {
        let missing = [
            ("Name", name_col),
            ("Data Type", type_col),
            ("Logical Address", address_col),
        ]
        .into_iter()
        .filter(|(_, col)| col.is_none())
        .map(|(label, _)| label.to_string())
        .collect();
        return Err(ImportError::MissingColumns(missing));
    };

    let cell_at = |row: &[Data], col: usize| row.get(col).and_then(cell_string);
    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        let (Some(name), Some(address)) = (cell_at(row, name_col), cell_at(row, address_col))
        else {
            debug!(target: "dms.import", row = index + 2, "skip row without name or address");
            continue;
        };
        records.push(ImportedVariable {
            name,
            description: comment_col
                .and_then(|col| cell_at(row, col))
                .unwrap_or_default(),
            protocol: ProtocolType::S7,
            address: address.trim_start_matches('%').to_string(),
            data_type: cell_at(row, type_col).unwrap_or_default(),
            update_mode: None,
        });
    }
    Ok(records)
}
