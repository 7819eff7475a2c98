//! Postgres 仓储实现
//!
//! 每次调用经由工作单元取得事务连接，结束后交回 `settle` 处理提交 / 回滚。

use crate::error::StorageError;
use crate::postgres::entity::PgEntity;
use crate::postgres::store::PgUnitOfWork;
use crate::traits::{
    Predicate, Repository, VariableHistoryRepository, VariableRepository, VariableTableRepository,
};
use async_trait::async_trait;
use domain::{Variable, VariableHistory, VariableTable};
use sqlx::PgConnection;
use std::marker::PhantomData;

/// 单条 insert 语句的最大行数（受绑定参数数量上限约束）
const INSERT_CHUNK_ROWS: usize = 500;

pub struct PgRepository<'a, T> {
    uow: &'a mut PgUnitOfWork,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: PgEntity> PgRepository<'a, T> {
    pub fn new(uow: &'a mut PgUnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }

    async fn select(&mut self, filter: &str, value: Option<i64>, order: &str) -> Result<Vec<T>, StorageError> {
        let result = {
            let conn = self.uow.connection().await?;
            select_rows::<T>(conn, filter, value, order).await
        };
        self.uow.settle(result).await
    }
}

async fn select_rows<T: PgEntity>(
    conn: &mut PgConnection,
    filter: &str,
    value: Option<i64>,
    order: &str,
) -> Result<Vec<T>, StorageError> {
    let sql = format!(
        "select {} from {} {} order by {}",
        T::COLUMNS,
        T::TABLE,
        filter,
        order
    );
    let mut query = sqlx::query(&sql);
    if let Some(value) = value {
        query = query.bind(value);
    }
    let rows = query.fetch_all(&mut *conn).await?;
    let mut items = rows
        .iter()
        .map(T::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    T::hydrate(conn, &mut items).await?;
    Ok(items)
}

async fn insert_rows<T: PgEntity>(
    conn: &mut PgConnection,
    entities: &[T],
) -> Result<Vec<T>, StorageError> {
    let mut inserted = Vec::with_capacity(entities.len());
    for chunk in entities.chunks(INSERT_CHUNK_ROWS) {
        inserted.extend(T::insert_batch(conn, chunk).await?);
    }
    Ok(inserted)
}

async fn delete_rows<T: PgEntity>(conn: &mut PgConnection, ids: &[i64]) -> Result<u64, StorageError> {
    let sql = format!("delete from {} where id = any($1)", T::TABLE);
    let result = sqlx::query(&sql)
        .bind(ids.to_vec())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl<T: PgEntity> Repository<T> for PgRepository<'_, T> {
    async fn add(&mut self, entity: T) -> Result<T, StorageError> {
        let mut inserted = self.add_batch(vec![entity]).await?;
        inserted
            .pop()
            .ok_or_else(|| StorageError::new("insert returned no row"))
    }

    async fn add_batch(&mut self, entities: Vec<T>) -> Result<Vec<T>, StorageError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let result = {
            let conn = self.uow.connection().await?;
            insert_rows(conn, &entities).await
        };
        self.uow.settle(result).await
    }

    async fn update(&mut self, entity: &T) -> Result<u64, StorageError> {
        self.update_batch(std::slice::from_ref(entity)).await
    }

    async fn update_batch(&mut self, entities: &[T]) -> Result<u64, StorageError> {
        if entities.is_empty() {
            return Ok(0);
        }
        let result = {
            let conn = self.uow.connection().await?;
            T::update_rows(conn, entities).await
        };
        self.uow.settle(result).await
    }

    async fn delete(&mut self, id: i64) -> Result<u64, StorageError> {
        self.delete_batch(&[id]).await
    }

    async fn delete_batch(&mut self, ids: &[i64]) -> Result<u64, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = {
            let conn = self.uow.connection().await?;
            delete_rows::<T>(conn, ids).await
        };
        self.uow.settle(result).await
    }

    async fn get_by_id(&mut self, id: i64) -> Result<Option<T>, StorageError> {
        let items = self.select("where id = $1", Some(id), "id").await?;
        Ok(items.into_iter().next())
    }

    async fn get_all(&mut self) -> Result<Vec<T>, StorageError> {
        self.select("", None, "id").await
    }

    async fn get_by_condition(
        &mut self,
        predicate: Predicate<'_, T>,
    ) -> Result<Option<T>, StorageError> {
        let items = self.get_all().await?;
        Ok(items.into_iter().find(|item| predicate(item)))
    }
}

#[async_trait]
impl VariableTableRepository for PgRepository<'_, VariableTable> {
    async fn list_by_device(&mut self, device_id: i64) -> Result<Vec<VariableTable>, StorageError> {
        self.select("where device_id = $1", Some(device_id), "id").await
    }
}

#[async_trait]
impl VariableRepository for PgRepository<'_, Variable> {
    async fn list_by_table(&mut self, table_id: i64) -> Result<Vec<Variable>, StorageError> {
        self.select("where variable_table_id = $1", Some(table_id), "id")
            .await
    }
}

#[async_trait]
impl VariableHistoryRepository for PgRepository<'_, VariableHistory> {
    async fn list_by_variable(
        &mut self,
        variable_id: i64,
    ) -> Result<Vec<VariableHistory>, StorageError> {
        self.select("where variable_id = $1", Some(variable_id), "ts_ms, id")
            .await
    }
}
