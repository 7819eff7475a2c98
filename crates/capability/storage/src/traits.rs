//! 存储接口 Trait 定义
//!
//! - Repository<T>：单实体类型的通用仓储（增删改查 + 批量）
//! - VariableRepository / VariableTableRepository / VariableHistoryRepository：按归属查询
//! - UnitOfWork：共享同一事务的一组仓储
//! - EntityStore：工作单元工厂
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发
//! - 仓储句柄借用工作单元，同一单元内的写入共享事务

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{Device, Entity, MqttTarget, Variable, VariableHistory, VariableTable};

/// 条件查询谓词。
pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// 通用仓储接口
///
/// 批量写入返回实际影响行数，由调用方判断是否与预期一致。
#[async_trait]
pub trait Repository<T>: Send
where
    T: Entity + Clone + Send + Sync + 'static,
{
    /// 插入单条记录，返回带生成 ID 的记录
    async fn add(&mut self, entity: T) -> Result<T, StorageError>;

    /// 批量插入，返回带生成 ID 的记录（顺序与输入一致）
    async fn add_batch(&mut self, entities: Vec<T>) -> Result<Vec<T>, StorageError>;

    async fn update(&mut self, entity: &T) -> Result<u64, StorageError>;

    async fn update_batch(&mut self, entities: &[T]) -> Result<u64, StorageError>;

    async fn delete(&mut self, id: i64) -> Result<u64, StorageError>;

    async fn delete_batch(&mut self, ids: &[i64]) -> Result<u64, StorageError>;

    async fn get_by_id(&mut self, id: i64) -> Result<Option<T>, StorageError>;

    async fn get_all(&mut self) -> Result<Vec<T>, StorageError>;

    /// 返回第一条满足条件的记录
    async fn get_by_condition(
        &mut self,
        predicate: Predicate<'_, T>,
    ) -> Result<Option<T>, StorageError> {
        let items = self.get_all().await?;
        Ok(items.into_iter().find(|item| predicate(item)))
    }

    async fn exists(&mut self, predicate: Predicate<'_, T>) -> Result<bool, StorageError> {
        Ok(self.get_by_condition(predicate).await?.is_some())
    }
}

/// 变量表仓储
#[async_trait]
pub trait VariableTableRepository: Repository<VariableTable> {
    async fn list_by_device(&mut self, device_id: i64) -> Result<Vec<VariableTable>, StorageError>;
}

/// 变量仓储
#[async_trait]
pub trait VariableRepository: Repository<Variable> {
    /// 按变量表列出变量（按 ID 升序）
    async fn list_by_table(&mut self, table_id: i64) -> Result<Vec<Variable>, StorageError>;
}

/// 历史记录仓储（只追加）
#[async_trait]
pub trait VariableHistoryRepository: Repository<VariableHistory> {
    /// 按变量列出历史（按时间升序）
    async fn list_by_variable(
        &mut self,
        variable_id: i64,
    ) -> Result<Vec<VariableHistory>, StorageError>;
}

/// 工作单元
///
/// 未开启事务时每次写入独立提交；开启后所有仓储写入共享同一事务，
/// 直到 commit / rollback。事务内任一写入失败会自动回滚，之后的
/// commit 返回错误。未提交即丢弃的工作单元等同回滚。
#[async_trait]
pub trait UnitOfWork: Send {
    async fn begin_transaction(&mut self) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    /// 回滚当前事务（无事务时为空操作）
    async fn rollback(&mut self) -> Result<(), StorageError>;

    fn in_transaction(&self) -> bool;

    fn devices(&mut self) -> Box<dyn Repository<Device> + '_>;

    fn variable_tables(&mut self) -> Box<dyn VariableTableRepository + '_>;

    fn variables(&mut self) -> Box<dyn VariableRepository + '_>;

    fn mqtt_targets(&mut self) -> Box<dyn Repository<MqttTarget> + '_>;

    fn histories(&mut self) -> Box<dyn VariableHistoryRepository + '_>;
}

/// 工作单元工厂
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>, StorageError>;
}
