//! 工作集缓存
//!
//! 保存当前变量表的有序记录，并通过广播通道发出变更事件，
//! 展示层订阅事件刷新视图，不依赖可观察集合。

use domain::Variable;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// 缓存变更事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Upserted(i64),
    Removed(i64),
    Replaced { table_id: i64, records: usize },
}

#[derive(Debug)]
pub struct WorkingSetCache {
    records: Vec<Variable>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for WorkingSetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingSetCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: Vec::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn records(&self) -> &[Variable] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Variable> {
        self.records.iter().find(|record| record.id == id)
    }

    /// 原地修改一条记录，记录存在时发出 `Upserted`。
    pub fn update<R>(&mut self, id: i64, edit: impl FnOnce(&mut Variable) -> R) -> Option<R> {
        let record = self.records.iter_mut().find(|record| record.id == id)?;
        let result = edit(record);
        self.emit(CacheEvent::Upserted(id));
        Some(result)
    }

    /// 按 ID 替换，不存在时追加到末尾。
    pub fn upsert(&mut self, record: Variable) {
        let id = record.id;
        match self.records.iter_mut().find(|current| current.id == id) {
            Some(current) => *current = record,
            None => self.records.push(record),
        }
        self.emit(CacheEvent::Upserted(id));
    }

    /// 用另一条记录原地替换 `id`（草稿保存后换成持久化 ID）。
    pub fn replace(&mut self, id: i64, record: Variable) -> bool {
        let Some(current) = self.records.iter_mut().find(|current| current.id == id) else {
            return false;
        };
        let new_id = record.id;
        *current = record;
        if new_id != id {
            self.emit(CacheEvent::Removed(id));
        }
        self.emit(CacheEvent::Upserted(new_id));
        true
    }

    pub fn remove(&mut self, id: i64) -> Option<Variable> {
        let index = self.records.iter().position(|record| record.id == id)?;
        let removed = self.records.remove(index);
        self.emit(CacheEvent::Removed(id));
        Some(removed)
    }

    pub fn replace_all(&mut self, table_id: i64, records: Vec<Variable>) {
        self.records = records;
        self.emit(CacheEvent::Replaced {
            table_id,
            records: self.records.len(),
        });
    }

    fn emit(&self, event: CacheEvent) {
        // 无订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }
}
