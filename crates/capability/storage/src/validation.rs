//! 验证辅助函数
//!
//! 提供统一的验证逻辑，两种存储后端共用：
//! - validate_variable：变量字段一致性（名称、报警区间、协议地址）
//! - ensure_table_protocol：变量协议与所属变量表一致
//! - ensure_protocol_change：变量表已有变量时禁止修改协议

use crate::error::StorageError;
use domain::{ProtocolType, Variable, VariableTable};

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// 验证变量字段
pub fn validate_variable(variable: &Variable) -> Result<(), StorageError> {
    if variable.name.trim().is_empty() {
        return Err(StorageError::validation("variable name required"));
    }
    if !variable.alarm_range_valid() {
        return Err(StorageError::validation(format!(
            "variable {}: alarm max {} below alarm min {}",
            variable.name, variable.alarm_max, variable.alarm_min
        )));
    }
    match variable.protocol {
        ProtocolType::S7 if is_blank(variable.s7_address.as_deref()) => Err(
            StorageError::validation(format!("variable {}: s7 address required", variable.name)),
        ),
        ProtocolType::OpcUa if is_blank(variable.opcua_node_id.as_deref()) => {
            Err(StorageError::validation(format!(
                "variable {}: opcua node id required",
                variable.name
            )))
        }
        _ => Ok(()),
    }
}

/// 验证变量协议与变量表一致
pub fn ensure_table_protocol(
    variable: &Variable,
    table_protocol: ProtocolType,
) -> Result<(), StorageError> {
    if variable.protocol != table_protocol {
        return Err(StorageError::validation(format!(
            "variable {}: protocol {} does not match table protocol {}",
            variable.name, variable.protocol, table_protocol
        )));
    }
    Ok(())
}

/// 验证变量表协议修改
///
/// 变量表下已有变量时协议不可修改。
pub fn ensure_protocol_change(
    current: &VariableTable,
    next: &VariableTable,
    variable_count: usize,
) -> Result<(), StorageError> {
    if current.protocol != next.protocol && variable_count > 0 {
        return Err(StorageError::validation(format!(
            "variable table {}: protocol is fixed while {} variables reference it",
            current.id, variable_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageErrorKind;

    fn s7_variable() -> Variable {
        Variable {
            name: "Tank.Level".to_string(),
            protocol: ProtocolType::S7,
            s7_address: Some("DB1.DBD4".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn s7_variable_requires_address() {
        let mut variable = s7_variable();
        assert!(validate_variable(&variable).is_ok());
        variable.s7_address = Some("  ".to_string());
        let err = validate_variable(&variable).expect_err("blank address");
        assert_eq!(err.kind(), StorageErrorKind::Validation);
    }

    #[test]
    fn enabled_alarm_rejects_inverted_range() {
        let mut variable = s7_variable();
        variable.is_alarm_enabled = true;
        variable.alarm_min = 50.0;
        variable.alarm_max = 10.0;
        assert!(validate_variable(&variable).is_err());
    }

    #[test]
    fn protocol_change_blocked_when_variables_exist() {
        let current = VariableTable {
            id: 3,
            protocol: ProtocolType::S7,
            ..Default::default()
        };
        let next = VariableTable {
            protocol: ProtocolType::OpcUa,
            ..current.clone()
        };
        assert!(ensure_protocol_change(&current, &next, 0).is_ok());
        assert!(ensure_protocol_change(&current, &next, 2).is_err());
        assert!(ensure_protocol_change(&current, &current, 2).is_ok());
    }
}
