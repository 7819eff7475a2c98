//! 内存实体存储与工作单元
//!
//! - 已提交数据保存在 `RwLock<Tables>` 中
//! - 事务持有写锁（`tokio::sync::Mutex` 的 owned guard），在克隆出的暂存副本上写入，
//!   提交时整体替换；回滚或丢弃时直接丢弃暂存副本
//! - 无事务的写入同样在副本上执行，成功后替换，保证单次批量写入原子
//! - 支持故障注入（第 N 次写入失败、第 N 次读取失败、下一次提交失败），用于验证原子性

use crate::error::StorageError;
use crate::in_memory::repository::InMemoryRepository;
use crate::in_memory::tables::Tables;
use crate::traits::{
    EntityStore, Repository, UnitOfWork, VariableHistoryRepository, VariableRepository,
    VariableTableRepository,
};
use async_trait::async_trait;
use domain::{Device, MqttTarget, Variable, VariableHistory, VariableTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as WriterLock, OwnedMutexGuard};
use tracing::warn;

#[derive(Debug, Default)]
struct FaultPlan {
    /// 剩余可成功的写入次数，耗尽后下一次写入失败（一次性）
    fail_after_writes: Option<u64>,
    /// 剩余可成功的读取次数（一次性）
    fail_after_reads: Option<u64>,
    fail_next_commit: bool,
}

pub(crate) struct Shared {
    tables: RwLock<Tables>,
    writer: Arc<WriterLock<()>>,
    faults: Mutex<FaultPlan>,
    writes: AtomicU64,
    commits: AtomicU64,
}

impl Shared {
    /// 记录一次行写入，按故障计划决定是否失败
    pub(crate) fn record_write(&self) -> Result<(), StorageError> {
        let mut plan = self
            .faults
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(remaining) = plan.fail_after_writes.as_mut() {
            if *remaining == 0 {
                plan.fail_after_writes = None;
                return Err(StorageError::connectivity("injected write failure"));
            }
            *remaining -= 1;
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_read(&self) -> Result<(), StorageError> {
        let mut plan = self
            .faults
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(remaining) = plan.fail_after_reads.as_mut() {
            if *remaining == 0 {
                plan.fail_after_reads = None;
                return Err(StorageError::connectivity("injected read failure"));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn take_commit_fault(&self) -> Result<bool, StorageError> {
        let mut plan = self
            .faults
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(std::mem::take(&mut plan.fail_next_commit))
    }

    fn snapshot(&self) -> Result<Tables, StorageError> {
        self.tables
            .read()
            .map(|tables| tables.clone())
            .map_err(|_| StorageError::new("lock failed"))
    }

    fn publish(&self, staged: Tables) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        *tables = staged;
        Ok(())
    }
}

/// 内存实体存储
///
/// 克隆后共享同一份数据，可同时交给多个会话使用。
#[derive(Clone)]
pub struct InMemoryEntityStore {
    shared: Arc<Shared>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                writer: Arc::new(WriterLock::new(())),
                faults: Mutex::new(FaultPlan::default()),
                writes: AtomicU64::new(0),
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// 允许接下来 `writes` 次行写入成功，之后的一次写入失败
    pub fn fail_after_writes(&self, writes: u64) {
        if let Ok(mut plan) = self.shared.faults.lock() {
            plan.fail_after_writes = Some(writes);
        }
    }

    /// 允许接下来 `reads` 次读取成功，之后的一次读取失败
    pub fn fail_after_reads(&self, reads: u64) {
        if let Ok(mut plan) = self.shared.faults.lock() {
            plan.fail_after_reads = Some(reads);
        }
    }

    /// 下一次事务提交失败（事务被回滚）
    pub fn fail_next_commit(&self) {
        if let Ok(mut plan) = self.shared.faults.lock() {
            plan.fail_next_commit = true;
        }
    }

    /// 已成功执行的行写入次数（含随后被回滚的写入）
    pub fn write_count(&self) -> u64 {
        self.shared.writes.load(Ordering::Relaxed)
    }

    /// 已成功提交的事务数
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn unit_of_work(&self) -> Result<Box<dyn UnitOfWork>, StorageError> {
        Ok(Box::new(InMemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            tx: None,
            aborted: false,
        }))
    }
}

struct OpenTransaction {
    staged: Tables,
    _writer: OwnedMutexGuard<()>,
}

pub struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    tx: Option<OpenTransaction>,
    aborted: bool,
}

impl InMemoryUnitOfWork {
    fn ensure_usable(&self) -> Result<(), StorageError> {
        if self.aborted {
            return Err(StorageError::new(
                "transaction was rolled back after a failed write",
            ));
        }
        Ok(())
    }

    pub(crate) fn read<R>(&self, op: impl FnOnce(&Tables) -> R) -> Result<R, StorageError> {
        self.ensure_usable()?;
        self.shared.record_read()?;
        if let Some(tx) = &self.tx {
            return Ok(op(&tx.staged));
        }
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(op(&tables))
    }

    /// 在暂存副本上执行写入
    ///
    /// 事务内失败会立即回滚整个事务；无事务时失败的写入不产生任何效果。
    pub(crate) async fn write<R, F>(&mut self, op: F) -> Result<R, StorageError>
    where
        F: FnOnce(&Shared, &mut Tables) -> Result<R, StorageError> + Send,
        R: Send,
    {
        self.ensure_usable()?;
        let shared = Arc::clone(&self.shared);
        if let Some(tx) = self.tx.as_mut() {
            let result = op(shared.as_ref(), &mut tx.staged);
            if let Err(err) = &result {
                warn!(
                    target: "dms.storage",
                    error = %err,
                    "write failed, transaction rolled back"
                );
                self.tx = None;
                self.aborted = true;
            }
            return result;
        }
        let _writer = shared.writer.lock().await;
        let mut working = shared.snapshot()?;
        let value = op(shared.as_ref(), &mut working)?;
        shared.publish(working)?;
        Ok(value)
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(
                target: "dms.storage",
                "unit of work dropped with open transaction, changes discarded"
            );
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin_transaction(&mut self) -> Result<(), StorageError> {
        if self.tx.is_some() {
            return Err(StorageError::new("transaction already open"));
        }
        let writer = Arc::clone(&self.shared.writer).lock_owned().await;
        let staged = self.shared.snapshot()?;
        self.tx = Some(OpenTransaction {
            staged,
            _writer: writer,
        });
        self.aborted = false;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.ensure_usable()?;
        let Some(tx) = self.tx.take() else {
            return Err(StorageError::new("no open transaction"));
        };
        if self.shared.take_commit_fault()? {
            return Err(StorageError::connectivity("injected commit failure"));
        }
        self.shared.publish(tx.staged)?;
        self.shared.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        self.tx = None;
        self.aborted = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn devices(&mut self) -> Box<dyn Repository<Device> + '_> {
        Box::new(InMemoryRepository::<Device>::new(self))
    }

    fn variable_tables(&mut self) -> Box<dyn VariableTableRepository + '_> {
        Box::new(InMemoryRepository::<VariableTable>::new(self))
    }

    fn variables(&mut self) -> Box<dyn VariableRepository + '_> {
        Box::new(InMemoryRepository::<Variable>::new(self))
    }

    fn mqtt_targets(&mut self) -> Box<dyn Repository<MqttTarget> + '_> {
        Box::new(InMemoryRepository::<MqttTarget>::new(self))
    }

    fn histories(&mut self) -> Box<dyn VariableHistoryRepository + '_> {
        Box::new(InMemoryRepository::<VariableHistory>::new(self))
    }
}
