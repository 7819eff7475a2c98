//! 追踪初始化、会话 ID 与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub loads: u64,
    pub saves: u64,
    pub records_saved: u64,
    pub imports: u64,
    pub records_imported: u64,
    pub deletes: u64,
    pub records_deleted: u64,
    pub rollbacks: u64,
    pub restores: u64,
    pub errors_reported: u64,
}

/// 工作集计数器。
pub struct WorksetMetrics {
    loads: AtomicU64,
    saves: AtomicU64,
    records_saved: AtomicU64,
    imports: AtomicU64,
    records_imported: AtomicU64,
    deletes: AtomicU64,
    records_deleted: AtomicU64,
    rollbacks: AtomicU64,
    restores: AtomicU64,
    errors_reported: AtomicU64,
}

impl WorksetMetrics {
    pub fn new() -> Self {
        Self {
            loads: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            records_saved: AtomicU64::new(0),
            imports: AtomicU64::new(0),
            records_imported: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            records_deleted: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            restores: AtomicU64::new(0),
            errors_reported: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads: self.loads.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            records_saved: self.records_saved.load(Ordering::Relaxed),
            imports: self.imports.load(Ordering::Relaxed),
            records_imported: self.records_imported.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            restores: self.restores.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
        }
    }
}

impl Default for WorksetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<WorksetMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static WorksetMetrics {
    METRICS.get_or_init(WorksetMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成编辑会话 ID（用于关联同一会话的日志）。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录工作集加载次数。
pub fn record_load() {
    metrics().loads.fetch_add(1, Ordering::Relaxed);
}

/// 记录保存次数与保存的记录数。
pub fn record_save(records: u64) {
    let metrics = metrics();
    metrics.saves.fetch_add(1, Ordering::Relaxed);
    metrics.records_saved.fetch_add(records, Ordering::Relaxed);
}

/// 记录导入次数与导入的记录数。
pub fn record_import(records: u64) {
    let metrics = metrics();
    metrics.imports.fetch_add(1, Ordering::Relaxed);
    metrics.records_imported.fetch_add(records, Ordering::Relaxed);
}

/// 记录删除次数与删除的记录数。
pub fn record_delete(records: u64) {
    let metrics = metrics();
    metrics.deletes.fetch_add(1, Ordering::Relaxed);
    metrics.records_deleted.fetch_add(records, Ordering::Relaxed);
}

/// 记录事务回滚次数。
pub fn record_rollback() {
    metrics().rollbacks.fetch_add(1, Ordering::Relaxed);
}

/// 记录快照恢复次数。
pub fn record_restore() {
    metrics().restores.fetch_add(1, Ordering::Relaxed);
}

/// 记录已上报的错误数。
pub fn record_error_reported() {
    metrics().errors_reported.fetch_add(1, Ordering::Relaxed);
}
