//! 变量表启用状态切换
//!
//! 先持久化再确认：只有更新影响行数大于 0 时才修改可见状态，
//! 影响 0 行（记录已不存在）作为失败上报。

use crate::error::SessionError;
use crate::notify::{Notifier, report_failure};
use dms_storage::{EntityStore, StorageError};
use domain::VariableTable;
use tracing::info;

async fn persist(store: &dyn EntityStore, table: &VariableTable) -> Result<u64, StorageError> {
    let mut uow = store.unit_of_work().await?;
    let affected = uow.variable_tables().update(table).await?;
    Ok(affected)
}

/// 返回是否切换成功；失败时 `table` 保持不变。
pub async fn set_table_active(
    store: &dyn EntityStore,
    notifier: &dyn Notifier,
    table: &mut VariableTable,
    active: bool,
) -> Result<bool, SessionError> {
    let mut next = table.clone();
    next.is_active = active;
    match persist(store, &next).await {
        Ok(affected) if affected > 0 => {
            table.is_active = active;
            info!(target: "dms.workset", table_id = table.id, active, "table_activation_changed");
            let state = if active { "activated" } else { "deactivated" };
            notifier.report_success(&format!("variable table {} {state}", table.name));
            Ok(true)
        }
        Ok(_) => {
            let err = SessionError::NotFound(format!("variable table {} not found", table.id));
            report_failure(notifier, "failed to change table activation", &err);
            Ok(false)
        }
        Err(err) => {
            let err = SessionError::from(err);
            report_failure(notifier, "failed to change table activation", &err);
            Err(err)
        }
    }
}
