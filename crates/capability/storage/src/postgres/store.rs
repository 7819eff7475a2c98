//! Postgres 实体存储与工作单元
//!
//! 工作单元持有一个可选的 sqlx 事务：
//! - 显式事务：begin_transaction 开启，commit / rollback 结束
//! - 隐式事务：未开启显式事务时，每次仓储调用独立开启并提交
//!
//! 显式事务内任一语句失败会立即回滚，之后的 commit 返回错误。
//! 丢弃未提交的工作单元时 sqlx 自动回滚事务。

use crate::connection::connect_pool;
use crate::error::StorageError;
use crate::postgres::repository::PgRepository;
use crate::traits::{
    EntityStore, Repository, UnitOfWork, VariableHistoryRepository, VariableRepository,
    VariableTableRepository,
};
use async_trait::async_trait;
use domain::{Device, MqttTarget, Variable, VariableHistory, VariableTable};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::warn;

#[derive(Clone)]
pub struct PgEntityStore {
    pub pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = connect_pool(database_url, max_connections).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>, StorageError> {
        Ok(Box::new(PgUnitOfWork {
            pool: self.pool.clone(),
            tx: None,
            explicit: false,
            aborted: false,
        }))
    }
}

pub struct PgUnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    explicit: bool,
    aborted: bool,
}

impl PgUnitOfWork {
    /// 当前事务连接；无显式事务时开启隐式事务
    pub(crate) async fn connection(&mut self) -> Result<&mut PgConnection, StorageError> {
        if self.aborted {
            return Err(StorageError::new(
                "transaction was rolled back after a failed statement",
            ));
        }
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StorageError::new("no open transaction"))
    }

    /// 结束一次仓储调用：隐式事务按结果提交；失败时回滚当前事务
    pub(crate) async fn settle<R>(
        &mut self,
        result: Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        match result {
            Ok(value) => {
                if !self.explicit {
                    if let Some(tx) = self.tx.take() {
                        tx.commit().await?;
                    }
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(tx) = self.tx.take() {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(target: "dms.storage", error = %rollback_err, "rollback failed");
                    }
                }
                if self.explicit {
                    warn!(
                        target: "dms.storage",
                        error = %err,
                        "statement failed, transaction rolled back"
                    );
                    self.explicit = false;
                    self.aborted = true;
                }
                Err(err)
            }
        }
    }
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        if self.explicit && self.tx.is_some() {
            warn!(
                target: "dms.storage",
                "unit of work dropped with open transaction, changes discarded"
            );
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin_transaction(&mut self) -> Result<(), StorageError> {
        if self.explicit {
            return Err(StorageError::new("transaction already open"));
        }
        self.tx = Some(self.pool.begin().await?);
        self.explicit = true;
        self.aborted = false;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        if self.aborted {
            return Err(StorageError::new(
                "transaction was rolled back after a failed statement",
            ));
        }
        if !self.explicit {
            return Err(StorageError::new("no open transaction"));
        }
        self.explicit = false;
        let Some(tx) = self.tx.take() else {
            return Err(StorageError::new("no open transaction"));
        };
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.explicit = false;
        self.aborted = false;
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.explicit
    }

    fn devices(&mut self) -> Box<dyn Repository<Device> + '_> {
        Box::new(PgRepository::<Device>::new(self))
    }

    fn variable_tables(&mut self) -> Box<dyn VariableTableRepository + '_> {
        Box::new(PgRepository::<VariableTable>::new(self))
    }

    fn variables(&mut self) -> Box<dyn VariableRepository + '_> {
        Box::new(PgRepository::<Variable>::new(self))
    }

    fn mqtt_targets(&mut self) -> Box<dyn Repository<MqttTarget> + '_> {
        Box::new(PgRepository::<MqttTarget>::new(self))
    }

    fn histories(&mut self) -> Box<dyn VariableHistoryRepository + '_> {
        Box::new(PgRepository::<VariableHistory>::new(self))
    }
}
