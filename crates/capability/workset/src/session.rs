//! 变量表编辑会话
//!
//! 会话独占工作集缓存与脏记录跟踪，存储只在显式提交点被访问：
//! - 加载：读取变量表与全部变量，建立快照，所有记录为 Clean
//! - 编辑：`apply_edit` 以字段事件修改记录并同步标记脏状态
//! - 保存：脏记录与草稿在一个事务中写入，成功后重建快照
//! - 放弃：脏记录回到快照值，草稿移除
//! - 导入 / 删除：成功后按存储结果重新同步，保留存活记录的未保存修改
//!
//! 每个失败恰好上报一次给 `Notifier`；失败时工作集保持操作前的状态。

use crate::activation::set_table_active;
use crate::cache::{CacheEvent, WorkingSetCache};
use crate::dirty::{DirtyTracker, RecordState, Snapshot};
use crate::error::SessionError;
use crate::filter::FilterEngine;
use crate::merge::BulkImportMerger;
use crate::notify::{Notifier, report_failure};
use crate::prompt::ConfirmPrompt;
use dms_import::ImportSource;
use dms_storage::{EntityStore, StorageError, UnitOfWork, begin, finish, validate_variable};
use dms_telemetry::{
    new_session_id, record_delete, record_load, record_restore, record_rollback, record_save,
};
use domain::{
    FieldEdit, PollLevel, ProtocolType, Variable, VariableHistory, VariableTable, now_ms,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 会话参数。
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// 写入 `updated_by` 的操作人
    pub operator: String,
    /// 导入记录的默认轮询级别
    pub default_poll_level: PollLevel,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            operator: "system".to_string(),
            default_poll_level: PollLevel::default(),
        }
    }
}

pub struct VariableTableSession {
    session_id: String,
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    options: SessionOptions,
    table: Option<VariableTable>,
    cache: WorkingSetCache,
    tracker: DirtyTracker,
    filter: FilterEngine,
    next_draft_id: i64,
}

async fn read_table(
    store: &dyn EntityStore,
    table_id: i64,
) -> Result<(VariableTable, Vec<Variable>), SessionError> {
    let mut uow = store.unit_of_work().await?;
    let table = uow
        .variable_tables()
        .get_by_id(table_id)
        .await?
        .ok_or_else(|| SessionError::NotFound(format!("variable table {table_id} not found")))?;
    let records = uow.variables().list_by_table(table_id).await?;
    Ok((table, records))
}

async fn read_history(
    store: &dyn EntityStore,
    variable_id: i64,
) -> Result<Vec<VariableHistory>, SessionError> {
    let mut uow = store.unit_of_work().await?;
    let items = uow.histories().list_by_variable(variable_id).await?;
    Ok(items)
}

async fn save_batch(
    uow: &mut dyn UnitOfWork,
    inserts: Vec<Variable>,
    updates: &[Variable],
) -> Result<Vec<Variable>, StorageError> {
    let inserted = if inserts.is_empty() {
        Vec::new()
    } else {
        uow.variables().add_batch(inserts).await?
    };
    update_expected(uow, updates).await?;
    Ok(inserted)
}

/// 批量更新，影响行数少于预期视为并发冲突。
async fn update_expected(uow: &mut dyn UnitOfWork, updates: &[Variable]) -> Result<(), StorageError> {
    if updates.is_empty() {
        return Ok(());
    }
    let affected = uow.variables().update_batch(updates).await?;
    let expected = updates.len() as u64;
    if affected != expected {
        return Err(StorageError::conflict(format!(
            "expected {expected} updated rows, storage reported {affected}"
        )));
    }
    Ok(())
}

impl VariableTableSession {
    pub fn new(
        store: Arc<dyn EntityStore>,
        notifier: Arc<dyn Notifier>,
        options: SessionOptions,
    ) -> Self {
        Self {
            session_id: new_session_id(),
            store,
            notifier,
            options,
            table: None,
            cache: WorkingSetCache::new(),
            tracker: DirtyTracker::new(),
            filter: FilterEngine::new(),
            next_draft_id: -1,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn table(&self) -> Option<&VariableTable> {
        self.table.as_ref()
    }

    pub fn records(&self) -> &[Variable] {
        self.cache.records()
    }

    pub fn record_state(&self, id: i64) -> RecordState {
        self.tracker.state(id)
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.tracker.snapshot()
    }

    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    fn table_id(&self) -> i64 {
        self.table.as_ref().map_or(0, |table| table.id)
    }

    fn fail<T>(&self, message: &str, err: SessionError) -> Result<T, SessionError> {
        debug!(target: "dms.workset", session_id = %self.session_id, "operation failed");
        report_failure(self.notifier.as_ref(), message, &err);
        Err(err)
    }

    fn stamp(&self, record: &mut Variable, now: i64) {
        record.updated_at_ms = now;
        record.updated_by = Some(self.options.operator.clone());
        record.is_modified = false;
    }

    /// 加载变量表的工作集并建立快照。
    pub async fn load(&mut self, table_id: i64) -> Result<&[Variable], SessionError> {
        let (table, mut records) = match read_table(self.store.as_ref(), table_id).await {
            Ok(loaded) => loaded,
            Err(err) => return self.fail("failed to load variable table", err),
        };
        for record in &mut records {
            record.is_modified = false;
        }
        let count = records.len();
        self.tracker.reset(&records);
        self.cache.replace_all(table_id, records);
        self.table = Some(table);
        self.next_draft_id = -1;
        record_load();
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            table_id,
            records = count,
            "working_set_loaded"
        );
        Ok(self.cache.records())
    }

    pub fn set_search_text(&mut self, text: &str) {
        self.filter.set_search_text(text);
    }

    pub fn search_text(&self) -> &str {
        self.filter.search_text()
    }

    /// 当前搜索词下的可见记录（工作集顺序）。
    pub fn filtered(&self) -> Vec<&Variable> {
        self.filter.apply(self.cache.records())
    }

    /// 应用一次字段编辑，返回记录是否发生变化。
    ///
    /// `edit.old` 必须与记录当前值一致，否则视为过期编辑。
    pub fn apply_edit(&mut self, edit: FieldEdit) -> Result<bool, SessionError> {
        let Some(current) = self.cache.get(edit.record_id) else {
            let err = SessionError::NotFound(format!(
                "variable {} is not in the working set",
                edit.record_id
            ));
            return self.fail("failed to apply edit", err);
        };
        if current.field(edit.field) != edit.old {
            let err = SessionError::Conflict(format!(
                "field {} of variable {} changed since the edit started",
                edit.field.as_str(),
                edit.record_id
            ));
            return self.fail("failed to apply edit", err);
        }
        let mut next = current.clone();
        let changed = match next.set_field(edit.field, edit.new) {
            Ok(changed) => changed,
            Err(err) => return self.fail("failed to apply edit", err.into()),
        };
        if !changed {
            return Ok(false);
        }
        next.is_modified = true;
        self.cache.upsert(next);
        self.tracker.mark_dirty(edit.record_id);
        debug!(
            target: "dms.workset",
            record_id = edit.record_id,
            field = edit.field.as_str(),
            "field_edited"
        );
        Ok(true)
    }

    /// 显式标记记录已修改（幂等），返回状态是否发生变化。
    pub fn mark_modified(&mut self, id: i64) -> bool {
        if self.cache.get(id).is_none() {
            return false;
        }
        let changed = self.tracker.mark_dirty(id);
        if changed {
            self.cache.update(id, |record| record.is_modified = true);
        }
        changed
    }

    /// 在工作集中添加草稿记录（临时负 ID），保存时插入。
    pub fn add_draft(&mut self, mut draft: Variable) -> Result<i64, SessionError> {
        let Some((table_id, protocol)) = self.table.as_ref().map(|t| (t.id, t.protocol)) else {
            return self.fail("failed to add variable", SessionError::NotLoaded);
        };
        let id = self.next_draft_id;
        self.next_draft_id -= 1;
        draft.id = id;
        draft.variable_table_id = table_id;
        draft.protocol = protocol;
        draft.is_modified = true;
        self.cache.upsert(draft);
        self.tracker.mark_new(id);
        Ok(id)
    }

    /// 自上次加载 / 保存以来修改过的记录与草稿。
    pub fn collect_dirty(&self) -> Vec<Variable> {
        self.tracker
            .collect_dirty(self.cache.records())
            .into_iter()
            .cloned()
            .collect()
    }

    /// 在一个事务中保存全部脏记录，返回写入条数。
    pub async fn save_modified(&mut self) -> Result<usize, SessionError> {
        let dirty = self.collect_dirty();
        if dirty.is_empty() {
            debug!(target: "dms.workset", session_id = %self.session_id, "nothing to save");
            return Ok(0);
        }
        if let Err(err) = dirty.iter().try_for_each(validate_variable) {
            return self.fail("failed to save variables", err.into());
        }

        let now = now_ms();
        let (drafts, updates): (Vec<Variable>, Vec<Variable>) = dirty
            .into_iter()
            .map(|mut record| {
                self.stamp(&mut record, now);
                record
            })
            .partition(|record| self.tracker.state(record.id) == RecordState::New);
        let draft_ids: Vec<i64> = drafts.iter().map(|record| record.id).collect();
        let inserts: Vec<Variable> = drafts
            .into_iter()
            .map(|mut record| {
                record.id = 0;
                record.created_at_ms = now;
                record
            })
            .collect();

        let mut uow = match begin(self.store.as_ref()).await {
            Ok(uow) => uow,
            Err(err) => return self.fail("failed to save variables", err.into()),
        };
        let result = save_batch(uow.as_mut(), inserts, &updates).await;
        let inserted = match finish(uow, result).await {
            Ok(inserted) => inserted,
            Err(err) => {
                record_rollback();
                return self.fail("failed to save variables", err.into());
            }
        };

        let saved = inserted.len() + updates.len();
        for (draft_id, record) in draft_ids.into_iter().zip(inserted) {
            self.cache.replace(draft_id, record);
        }
        for record in updates {
            self.cache.upsert(record);
        }
        self.tracker.reset(self.cache.records());
        record_save(saved as u64);
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            table_id = self.table_id(),
            saved,
            "working_set_saved"
        );
        self.notifier
            .report_success(&format!("saved {saved} variables"));
        Ok(saved)
    }

    /// 放弃未保存的修改，返回受影响的记录数。
    pub fn discard_modified(&mut self) -> usize {
        if !self.tracker.is_dirty() {
            return 0;
        }
        let mut records = self.cache.records().to_vec();
        let restored = self.tracker.restore(&mut records);
        self.cache.replace_all(self.table_id(), records);
        record_restore();
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            restored,
            "working_set_restored"
        );
        restored
    }

    /// 退出编辑。存在未保存修改时询问用户：
    /// 确认离开则丢弃工作集返回 true；拒绝则恢复快照并返回 false。
    pub async fn exit(&mut self, prompt: &dyn ConfirmPrompt) -> bool {
        if self.tracker.is_dirty() {
            let message = format!(
                "{} variables have unsaved changes. Leave without saving?",
                self.tracker.dirty_count()
            );
            if !prompt.confirm("Unsaved changes", &message, "Leave").await {
                self.discard_modified();
                return false;
            }
        }
        let table_id = self.table_id();
        self.tracker.reset(&[]);
        self.cache.replace_all(table_id, Vec::new());
        self.table = None;
        info!(target: "dms.workset", session_id = %self.session_id, table_id, "session_closed");
        true
    }

    /// 批量导入到 `table_id`。空批次不写入，上报一次错误并返回 0。
    pub async fn import(
        &mut self,
        table_id: i64,
        records: Vec<Variable>,
        forced_protocol: Option<ProtocolType>,
    ) -> Result<usize, SessionError> {
        if records.is_empty() {
            let err = SessionError::Validation("import batch is empty".to_string());
            report_failure(self.notifier.as_ref(), "nothing to import", &err);
            return Ok(0);
        }
        let merger = BulkImportMerger::new(self.store.clone(), self.options.operator.clone());
        let outcome = match merger.merge(table_id, records, forced_protocol).await {
            Ok(outcome) => outcome,
            Err(err) => return self.fail("failed to import variables", err),
        };
        if self.table_id() == table_id {
            match outcome.table_records {
                Some(records) => self.resync(records),
                None => {
                    // 导入已提交，只是刷新失败：本地追加插入的记录
                    for record in outcome.inserted {
                        self.tracker.snapshot_mut().upsert(&record);
                        self.tracker.mark_clean(record.id);
                        self.cache.upsert(record);
                    }
                }
            }
        }
        self.notifier
            .report_success(&format!("imported {} variables", outcome.imported));
        Ok(outcome.imported)
    }

    /// 从导入来源读取并导入到当前变量表。
    pub async fn import_from(&mut self, source: &dyn ImportSource) -> Result<usize, SessionError> {
        let Some(table_id) = self.table.as_ref().map(|table| table.id) else {
            return self.fail("failed to import variables", SessionError::NotLoaded);
        };
        let fetched = match source.fetch().await {
            Ok(fetched) => fetched,
            Err(err) => return self.fail("failed to read import source", err.into()),
        };
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            source = %source.describe(),
            records = fetched.len(),
            "import_source_read"
        );
        let poll_level = self.options.default_poll_level;
        let records = fetched
            .into_iter()
            .map(|record| record.into_variable(poll_level))
            .collect();
        self.import(table_id, records, source.source_protocol()).await
    }

    /// 删除记录，返回删除条数。
    ///
    /// 草稿只从工作集移除；已持久化记录在一次批量调用中删除，
    /// 一条都没删除时作为失败上报并返回 0。
    pub async fn delete(&mut self, ids: &[i64]) -> Result<usize, SessionError> {
        let (drafts, persisted): (Vec<i64>, Vec<i64>) = ids
            .iter()
            .copied()
            .filter(|id| self.cache.get(*id).is_some())
            .partition(|id| self.tracker.state(*id) == RecordState::New);
        for id in &drafts {
            self.cache.remove(*id);
            self.tracker.forget(*id);
        }
        if persisted.is_empty() {
            if drafts.is_empty() {
                let err = SessionError::NotFound("no matching variables to delete".to_string());
                report_failure(self.notifier.as_ref(), "failed to delete variables", &err);
            }
            return Ok(drafts.len());
        }

        let deleted = match self.delete_persisted(&persisted).await {
            Ok(deleted) => deleted,
            Err(err) => return self.fail("failed to delete variables", err),
        };
        if deleted == 0 {
            let err = SessionError::NotFound("variables were already deleted".to_string());
            report_failure(self.notifier.as_ref(), "failed to delete variables", &err);
            return Ok(drafts.len());
        }
        if (deleted as usize) < persisted.len() {
            warn!(
                target: "dms.workset",
                requested = persisted.len(),
                deleted,
                "some variables were already deleted"
            );
        }
        match read_table(self.store.as_ref(), self.table_id()).await {
            Ok((_, records)) => self.resync(records),
            Err(err) => {
                // 删除已提交，只是刷新失败：本地移除被删记录
                warn!(target: "dms.workset", error = %err, "refresh after delete failed");
                for id in &persisted {
                    self.cache.remove(*id);
                    self.tracker.forget(*id);
                }
            }
        }
        record_delete(deleted);
        let removed = deleted as usize + drafts.len();
        self.notifier
            .report_success(&format!("deleted {removed} variables"));
        Ok(removed)
    }

    async fn delete_persisted(&self, ids: &[i64]) -> Result<u64, SessionError> {
        let mut uow = self.store.unit_of_work().await?;
        let deleted = uow.variables().delete_batch(ids).await?;
        Ok(deleted)
    }

    /// 修改选中记录的轮询级别并立即持久化，返回更新条数。
    pub async fn change_poll_level(
        &mut self,
        ids: &[i64],
        level: PollLevel,
    ) -> Result<usize, SessionError> {
        let now = now_ms();
        let updates: Vec<Variable> = self
            .persisted_records(ids)
            .into_iter()
            .map(|mut record| {
                record.poll_level = level;
                self.stamp(&mut record, now);
                record
            })
            .collect();
        let updated = self
            .persist_updates(updates, "failed to change poll level")
            .await?;
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            level = level.as_str(),
            updated,
            "poll_level_changed"
        );
        self.notifier
            .report_success(&format!("poll level of {updated} variables set to {level}"));
        Ok(updated)
    }

    /// 为选中记录关联 MQTT 目标（已关联的记录不重复写入），返回更新条数。
    pub async fn attach_mqtt_target(
        &mut self,
        ids: &[i64],
        target_id: i64,
    ) -> Result<usize, SessionError> {
        match self.find_mqtt_target(target_id).await {
            Ok(true) => {}
            Ok(false) => {
                let err = SessionError::NotFound(format!("mqtt target {target_id} not found"));
                return self.fail("failed to attach mqtt target", err);
            }
            Err(err) => return self.fail("failed to attach mqtt target", err),
        }
        let now = now_ms();
        let updates: Vec<Variable> = self
            .persisted_records(ids)
            .into_iter()
            .filter(|record| !record.mqtt_target_ids.contains(&target_id))
            .map(|mut record| {
                record.mqtt_target_ids.insert(target_id);
                self.stamp(&mut record, now);
                record
            })
            .collect();
        let updated = self
            .persist_updates(updates, "failed to attach mqtt target")
            .await?;
        info!(
            target: "dms.workset",
            session_id = %self.session_id,
            target_id,
            updated,
            "mqtt_target_attached"
        );
        self.notifier
            .report_success(&format!("mqtt target attached to {updated} variables"));
        Ok(updated)
    }

    async fn find_mqtt_target(&self, target_id: i64) -> Result<bool, SessionError> {
        let mut uow = self.store.unit_of_work().await?;
        let target = uow.mqtt_targets().get_by_id(target_id).await?;
        Ok(target.is_some())
    }

    /// 选中记录中已持久化的部分（工作集当前值）。
    fn persisted_records(&self, ids: &[i64]) -> Vec<Variable> {
        let selected: HashSet<i64> = ids.iter().copied().collect();
        self.cache
            .records()
            .iter()
            .filter(|record| selected.contains(&record.id))
            .filter(|record| self.tracker.state(record.id) != RecordState::New)
            .cloned()
            .collect()
    }

    /// 原子地写入整批记录；成功后这些记录与存储一致，标记为 Clean 并更新快照。
    async fn persist_updates(
        &mut self,
        updates: Vec<Variable>,
        message: &str,
    ) -> Result<usize, SessionError> {
        if updates.is_empty() {
            return Ok(0);
        }
        if let Err(err) = updates.iter().try_for_each(validate_variable) {
            return self.fail(message, err.into());
        }
        let mut uow = match begin(self.store.as_ref()).await {
            Ok(uow) => uow,
            Err(err) => return self.fail(message, err.into()),
        };
        let result = update_expected(uow.as_mut(), &updates).await;
        if let Err(err) = finish(uow, result).await {
            record_rollback();
            return self.fail(message, err.into());
        }
        let updated = updates.len();
        for record in updates {
            self.tracker.mark_clean(record.id);
            self.tracker.snapshot_mut().upsert(&record);
            self.cache.upsert(record);
        }
        Ok(updated)
    }

    /// 切换当前变量表的启用状态。
    pub async fn set_active(&mut self, active: bool) -> Result<bool, SessionError> {
        if self.table.is_none() {
            return self.fail("failed to change table activation", SessionError::NotLoaded);
        }
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        match self.table.as_mut() {
            Some(table) => set_table_active(store.as_ref(), notifier.as_ref(), table, active).await,
            None => Err(SessionError::NotLoaded),
        }
    }

    /// 采集方回写的实时值。不属于用户编辑，不改变脏状态。
    pub fn refresh_live_value(
        &mut self,
        id: i64,
        data_value: impl Into<String>,
        display_value: impl Into<String>,
    ) -> bool {
        let data_value = data_value.into();
        let display_value = display_value.into();
        let polled_at = now_ms();
        let apply = |record: &mut Variable| {
            record.data_value = data_value.clone();
            record.display_value = display_value.clone();
            record.last_poll_at_ms = Some(polled_at);
        };
        if self.cache.update(id, apply).is_none() {
            return false;
        }
        self.tracker.snapshot_mut().update(id, apply);
        true
    }

    /// 变量的历史值（按时间升序）。
    pub async fn history(&self, variable_id: i64) -> Result<Vec<VariableHistory>, SessionError> {
        match read_history(self.store.as_ref(), variable_id).await {
            Ok(items) => Ok(items),
            Err(err) => self.fail("failed to read variable history", err),
        }
    }

    /// 按存储结果重新同步工作集：
    /// 存活的 Dirty 记录保留本地修改，其余记录取存储值，草稿保留在末尾，
    /// 快照更新为存储值并丢弃已不存在的记录。
    fn resync(&mut self, persisted: Vec<Variable>) {
        let alive: HashSet<i64> = persisted.iter().map(|record| record.id).collect();
        let mut merged = Vec::with_capacity(persisted.len());
        for mut record in persisted {
            self.tracker.snapshot_mut().upsert(&record);
            match self.tracker.state(record.id) {
                RecordState::Dirty => match self.cache.get(record.id) {
                    Some(local) => merged.push(local.clone()),
                    None => {
                        self.tracker.mark_clean(record.id);
                        record.is_modified = false;
                        merged.push(record);
                    }
                },
                _ => {
                    record.is_modified = false;
                    merged.push(record);
                }
            }
        }
        let mut stale = Vec::new();
        for record in self.cache.records() {
            match self.tracker.state(record.id) {
                RecordState::New => merged.push(record.clone()),
                RecordState::Dirty if !alive.contains(&record.id) => stale.push(record.id),
                _ => {}
            }
        }
        for id in stale {
            self.tracker.forget(id);
        }
        self.tracker.snapshot_mut().retain(&alive);
        let records = merged.len();
        self.cache.replace_all(self.table_id(), merged);
        debug!(target: "dms.workset", session_id = %self.session_id, records, "working_set_resynced");
    }
}
