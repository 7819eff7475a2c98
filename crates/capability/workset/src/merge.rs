//! 批量导入合并
//!
//! 1. 空批次直接拒绝，不产生任何写入
//! 2. 为每条记录写入创建 / 更新时间、所属变量表与操作人；
//!    协议强制来源（如 OPC UA 浏览）覆盖记录协议
//! 3. 在一个事务中插入整批记录，任一失败整批回滚
//! 4. 提交成功后重新读取目标变量表的持久化记录；
//!    重新读取失败不影响导入结果，只是不提供整表记录

use crate::error::SessionError;
use dms_storage::{EntityStore, StorageError, begin, finish};
use dms_telemetry::{record_import, record_rollback};
use domain::{ProtocolType, Variable, now_ms};
use std::sync::Arc;
use tracing::{info, warn};

/// 合并结果。
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub imported: usize,
    /// 本次插入的记录（已分配 id）
    pub inserted: Vec<Variable>,
    /// 导入后目标变量表的全部持久化记录，重新读取失败时为 `None`
    pub table_records: Option<Vec<Variable>>,
}

pub struct BulkImportMerger {
    store: Arc<dyn EntityStore>,
    operator: String,
}

impl BulkImportMerger {
    pub fn new(store: Arc<dyn EntityStore>, operator: impl Into<String>) -> Self {
        Self {
            store,
            operator: operator.into(),
        }
    }

    /// 为导入记录写入系统字段。
    pub fn stamp(
        records: Vec<Variable>,
        table_id: i64,
        forced_protocol: Option<ProtocolType>,
        operator: &str,
        now: i64,
    ) -> Vec<Variable> {
        records
            .into_iter()
            .map(|mut record| {
                record.id = 0;
                record.variable_table_id = table_id;
                record.created_at_ms = now;
                record.updated_at_ms = now;
                record.updated_by = Some(operator.to_string());
                record.is_modified = false;
                record.is_deleted = false;
                if let Some(protocol) = forced_protocol {
                    record.protocol = protocol;
                }
                record
            })
            .collect()
    }

    pub async fn merge(
        &self,
        table_id: i64,
        records: Vec<Variable>,
        forced_protocol: Option<ProtocolType>,
    ) -> Result<MergeOutcome, SessionError> {
        if records.is_empty() {
            return Err(SessionError::Validation("import batch is empty".to_string()));
        }
        let stamped = Self::stamp(records, table_id, forced_protocol, &self.operator, now_ms());
        let requested = stamped.len();

        let mut uow = begin(self.store.as_ref()).await?;
        let table = uow.variable_tables().get_by_id(table_id).await;
        let result = match table {
            Ok(Some(_)) => uow.variables().add_batch(stamped).await,
            Ok(None) => Err(StorageError::not_found(format!(
                "variable table {table_id} not found"
            ))),
            Err(err) => Err(err),
        };
        let inserted = match finish(uow, result).await {
            Ok(inserted) => inserted,
            Err(err) => {
                record_rollback();
                warn!(
                    target: "dms.workset",
                    table_id,
                    requested,
                    error = %err,
                    "import_rolled_back"
                );
                return Err(err.into());
            }
        };

        let table_records = match self.read_back(table_id).await {
            Ok(records) => Some(records),
            Err(err) => {
                warn!(
                    target: "dms.workset",
                    table_id,
                    error = %err,
                    "refresh after import failed"
                );
                None
            }
        };
        record_import(inserted.len() as u64);
        info!(
            target: "dms.workset",
            table_id,
            imported = inserted.len(),
            forced_protocol = forced_protocol.map(|p| p.as_str()),
            "import_merged"
        );
        Ok(MergeOutcome {
            imported: inserted.len(),
            inserted,
            table_records,
        })
    }

    async fn read_back(&self, table_id: i64) -> Result<Vec<Variable>, StorageError> {
        let mut uow = self.store.unit_of_work().await?;
        let records = uow.variables().list_by_table(table_id).await?;
        Ok(records)
    }
}
