//! 事务辅助函数
//!
//! - begin：从工厂取得工作单元并开启事务
//! - finish：按结果提交或回滚，回滚失败只记录日志，返回原始错误

use crate::error::StorageError;
use crate::traits::{EntityStore, UnitOfWork};
use tracing::warn;

/// 取得工作单元并开启事务。
pub async fn begin(store: &dyn EntityStore) -> Result<Box<dyn UnitOfWork>, StorageError> {
    let mut uow = store.unit_of_work().await?;
    uow.begin_transaction().await?;
    Ok(uow)
}

/// 结束事务：成功则提交，失败则回滚并返回原始错误。
pub async fn finish<T: Send>(
    mut uow: Box<dyn UnitOfWork>,
    result: Result<T, StorageError>,
) -> Result<T, StorageError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(
                    target: "dms.storage",
                    error = %rollback_err,
                    "rollback failed"
                );
            }
            Err(err)
        }
    }
}
