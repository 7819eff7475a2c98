//! 内存仓储实现
//!
//! 一个泛型 `InMemoryRepository<T>` 覆盖全部实体，按归属查询的接口单独实现。

use crate::error::StorageError;
use crate::in_memory::store::InMemoryUnitOfWork;
use crate::in_memory::tables::StoredEntity;
use crate::traits::{
    Predicate, Repository, VariableHistoryRepository, VariableRepository, VariableTableRepository,
};
use async_trait::async_trait;
use domain::{Variable, VariableHistory, VariableTable};
use std::marker::PhantomData;
use tracing::debug;

/// 借用工作单元的仓储句柄
pub struct InMemoryRepository<'a, T> {
    uow: &'a mut InMemoryUnitOfWork,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: StoredEntity> InMemoryRepository<'a, T> {
    pub fn new(uow: &'a mut InMemoryUnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }

    fn list_where(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>, StorageError> {
        self.uow.read(|tables| {
            T::table(tables)
                .values()
                .filter(|item| predicate(item))
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl<T: StoredEntity> Repository<T> for InMemoryRepository<'_, T> {
    async fn add(&mut self, entity: T) -> Result<T, StorageError> {
        let mut inserted = self.add_batch(vec![entity]).await?;
        inserted
            .pop()
            .ok_or_else(|| StorageError::new("insert returned no row"))
    }

    async fn add_batch(&mut self, entities: Vec<T>) -> Result<Vec<T>, StorageError> {
        let inserted = self
            .uow
            .write(move |shared, tables| {
                let mut inserted = Vec::with_capacity(entities.len());
                for mut entity in entities {
                    entity.prepare();
                    entity.check_insert(tables)?;
                    shared.record_write()?;
                    inserted.push(T::table_mut(tables).insert(entity));
                }
                Ok(inserted)
            })
            .await?;
        debug!(target: "dms.storage", kind = T::KIND, rows = inserted.len(), "inserted");
        Ok(inserted)
    }

    async fn update(&mut self, entity: &T) -> Result<u64, StorageError> {
        self.update_batch(std::slice::from_ref(entity)).await
    }

    async fn update_batch(&mut self, entities: &[T]) -> Result<u64, StorageError> {
        let affected = self
            .uow
            .write(|shared, tables| {
                let mut affected = 0;
                for entity in entities {
                    let Some(current) = T::table(tables).get(entity.id()).cloned() else {
                        continue;
                    };
                    let mut next = entity.clone();
                    next.prepare();
                    next.check_update(&current, tables)?;
                    shared.record_write()?;
                    affected += T::table_mut(tables).replace(next);
                }
                Ok(affected)
            })
            .await?;
        debug!(target: "dms.storage", kind = T::KIND, rows = affected, "updated");
        Ok(affected)
    }

    async fn delete(&mut self, id: i64) -> Result<u64, StorageError> {
        self.delete_batch(&[id]).await
    }

    async fn delete_batch(&mut self, ids: &[i64]) -> Result<u64, StorageError> {
        let affected = self
            .uow
            .write(|shared, tables| {
                let mut affected = 0;
                for id in ids {
                    if !T::table(tables).contains(*id) {
                        continue;
                    }
                    T::check_delete(*id, tables)?;
                    shared.record_write()?;
                    affected += T::table_mut(tables).remove(*id);
                }
                Ok(affected)
            })
            .await?;
        debug!(target: "dms.storage", kind = T::KIND, rows = affected, "deleted");
        Ok(affected)
    }

    async fn get_by_id(&mut self, id: i64) -> Result<Option<T>, StorageError> {
        self.uow.read(|tables| T::table(tables).get(id).cloned())
    }

    async fn get_all(&mut self) -> Result<Vec<T>, StorageError> {
        self.list_where(|_| true)
    }

    async fn get_by_condition(
        &mut self,
        predicate: Predicate<'_, T>,
    ) -> Result<Option<T>, StorageError> {
        self.uow
            .read(|tables| T::table(tables).values().find(|item| predicate(item)).cloned())
    }

    async fn exists(&mut self, predicate: Predicate<'_, T>) -> Result<bool, StorageError> {
        self.uow
            .read(|tables| T::table(tables).values().any(|item| predicate(item)))
    }
}

#[async_trait]
impl VariableTableRepository for InMemoryRepository<'_, VariableTable> {
    async fn list_by_device(&mut self, device_id: i64) -> Result<Vec<VariableTable>, StorageError> {
        self.list_where(|table| table.device_id == device_id)
    }
}

#[async_trait]
impl VariableRepository for InMemoryRepository<'_, Variable> {
    async fn list_by_table(&mut self, table_id: i64) -> Result<Vec<Variable>, StorageError> {
        self.list_where(|variable| variable.variable_table_id == table_id)
    }
}

#[async_trait]
impl VariableHistoryRepository for InMemoryRepository<'_, VariableHistory> {
    async fn list_by_variable(
        &mut self,
        variable_id: i64,
    ) -> Result<Vec<VariableHistory>, StorageError> {
        let mut items = self.list_where(|history| history.variable_id == variable_id)?;
        items.sort_by_key(|history| (history.ts_ms, history.id));
        Ok(items)
    }
}
