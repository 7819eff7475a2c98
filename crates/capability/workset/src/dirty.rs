//! 脏记录跟踪与快照
//!
//! 每条记录处于 Clean / Dirty / New 之一：
//! - 加载、导入、保存后全部为 Clean
//! - 字段修改把 Clean 记录标记为 Dirty（幂等），New 保持 New
//! - 恢复时 Dirty 记录回到快照值，New 记录移除，顺序不变

use domain::Variable;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordState {
    #[default]
    Clean,
    Dirty,
    New,
}

/// 已持久化记录的结构化副本。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: BTreeMap<i64, Variable>,
}

impl Snapshot {
    pub fn capture(records: &[Variable]) -> Self {
        let records = records
            .iter()
            .map(|record| {
                let mut copy = record.clone();
                copy.is_modified = false;
                (copy.id, copy)
            })
            .collect();
        Self { records }
    }

    pub fn get(&self, id: i64) -> Option<&Variable> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn upsert(&mut self, record: &Variable) {
        let mut copy = record.clone();
        copy.is_modified = false;
        self.records.insert(copy.id, copy);
    }

    pub(crate) fn retain(&mut self, ids: &HashSet<i64>) {
        self.records.retain(|id, _| ids.contains(id));
    }

    pub(crate) fn update(&mut self, id: i64, edit: impl FnOnce(&mut Variable)) {
        if let Some(record) = self.records.get_mut(&id) {
            edit(record);
        }
    }
}

#[derive(Debug, Default)]
pub struct DirtyTracker {
    states: HashMap<i64, RecordState>,
    snapshot: Snapshot,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以当前记录为基线重新开始跟踪。
    pub fn reset(&mut self, records: &[Variable]) {
        self.states.clear();
        self.snapshot = Snapshot::capture(records);
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub(crate) fn snapshot_mut(&mut self) -> &mut Snapshot {
        &mut self.snapshot
    }

    pub fn state(&self, id: i64) -> RecordState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// 标记为 Dirty，返回状态是否发生变化。
    pub fn mark_dirty(&mut self, id: i64) -> bool {
        match self.state(id) {
            RecordState::Clean => {
                self.states.insert(id, RecordState::Dirty);
                true
            }
            RecordState::Dirty | RecordState::New => false,
        }
    }

    pub fn mark_new(&mut self, id: i64) {
        self.states.insert(id, RecordState::New);
    }

    pub fn mark_clean(&mut self, id: i64) {
        self.states.remove(&id);
    }

    pub fn forget(&mut self, id: i64) {
        self.states.remove(&id);
    }

    pub fn is_dirty(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.states.len()
    }

    /// 按工作集顺序收集 Dirty / New 记录。
    pub fn collect_dirty<'a>(&self, records: &'a [Variable]) -> Vec<&'a Variable> {
        records
            .iter()
            .filter(|record| self.state(record.id) != RecordState::Clean)
            .collect()
    }

    /// 恢复到快照，返回受影响的记录数。
    pub fn restore(&mut self, records: &mut Vec<Variable>) -> usize {
        let touched = self.states.len();
        records.retain(|record| self.state(record.id) != RecordState::New);
        for record in records.iter_mut() {
            if self.state(record.id) == RecordState::Dirty
                && let Some(original) = self.snapshot.get(record.id)
            {
                *record = original.clone();
            }
            record.is_modified = false;
        }
        self.states.clear();
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, name: &str) -> Variable {
        Variable {
            id,
            name: name.to_string(),
            ..Variable::default()
        }
    }

    #[test]
    fn mark_dirty_is_idempotent() {
        let mut tracker = DirtyTracker::new();
        let records = vec![record(1, "a")];
        tracker.reset(&records);
        assert!(tracker.mark_dirty(1));
        assert!(!tracker.mark_dirty(1));
        assert_eq!(tracker.dirty_count(), 1);
        assert_eq!(tracker.collect_dirty(&records).len(), 1);
    }

    #[test]
    fn new_records_stay_new() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_new(-1);
        assert!(!tracker.mark_dirty(-1));
        assert_eq!(tracker.state(-1), RecordState::New);
    }

    #[test]
    fn restore_reverts_dirty_and_drops_new() {
        let mut tracker = DirtyTracker::new();
        let mut records = vec![record(1, "a"), record(2, "b"), record(3, "c")];
        tracker.reset(&records);

        records[1].name = "b2".to_string();
        records[1].is_modified = true;
        tracker.mark_dirty(2);
        records.push(record(-1, "draft"));
        tracker.mark_new(-1);

        assert_eq!(tracker.restore(&mut records), 2);
        assert_eq!(records, vec![record(1, "a"), record(2, "b"), record(3, "c")]);
        assert!(!tracker.is_dirty());
    }
}
