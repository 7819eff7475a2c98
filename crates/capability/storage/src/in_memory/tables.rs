//! 内存表与约束检查
//!
//! 每种实体一张 `EntityTable`，ID 自增；外键、协议一致性等约束
//! 由 `StoredEntity` 在写入前检查，与 Postgres 外键行为保持一致。

use crate::error::StorageError;
use crate::validation::{ensure_protocol_change, ensure_table_protocol, validate_variable};
use domain::{Device, Entity, MqttTarget, Variable, VariableHistory, VariableTable};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct EntityTable<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> Default for EntityTable<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Entity + Clone> EntityTable<T> {
    /// 分配新 ID 并插入
    pub fn insert(&mut self, mut entity: T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        entity.set_id(id);
        self.rows.insert(id, entity.clone());
        entity
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    /// 覆盖已存在的行，返回影响行数
    pub fn replace(&mut self, entity: T) -> u64 {
        match self.rows.get_mut(&entity.id()) {
            Some(slot) => {
                *slot = entity;
                1
            }
            None => 0,
        }
    }

    pub fn remove(&mut self, id: i64) -> u64 {
        self.rows.remove(&id).map(|_| 1).unwrap_or(0)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

/// 全部内存表（事务内整体克隆为暂存副本）
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub devices: EntityTable<Device>,
    pub variable_tables: EntityTable<VariableTable>,
    pub variables: EntityTable<Variable>,
    pub mqtt_targets: EntityTable<MqttTarget>,
    pub histories: EntityTable<VariableHistory>,
}

/// 可存入内存表的实体
pub trait StoredEntity: Entity + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn table(tables: &Tables) -> &EntityTable<Self>;

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self>;

    /// 写入前整理（例如清除不落库的字段）
    fn prepare(&mut self) {}

    fn check_insert(&self, _tables: &Tables) -> Result<(), StorageError> {
        Ok(())
    }

    fn check_update(&self, _current: &Self, tables: &Tables) -> Result<(), StorageError> {
        self.check_insert(tables)
    }

    fn check_delete(_id: i64, _tables: &Tables) -> Result<(), StorageError> {
        Ok(())
    }
}

impl StoredEntity for Device {
    const KIND: &'static str = "device";

    fn table(tables: &Tables) -> &EntityTable<Self> {
        &tables.devices
    }

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self> {
        &mut tables.devices
    }

    fn check_delete(id: i64, tables: &Tables) -> Result<(), StorageError> {
        if tables.variable_tables.values().any(|t| t.device_id == id) {
            return Err(StorageError::constraint(format!(
                "device {id} still owns variable tables"
            )));
        }
        Ok(())
    }
}

impl StoredEntity for VariableTable {
    const KIND: &'static str = "variable table";

    fn table(tables: &Tables) -> &EntityTable<Self> {
        &tables.variable_tables
    }

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self> {
        &mut tables.variable_tables
    }

    fn check_insert(&self, tables: &Tables) -> Result<(), StorageError> {
        if !tables.devices.contains(self.device_id) {
            return Err(StorageError::constraint(format!(
                "device {} not found",
                self.device_id
            )));
        }
        Ok(())
    }

    fn check_update(&self, current: &Self, tables: &Tables) -> Result<(), StorageError> {
        self.check_insert(tables)?;
        let count = tables
            .variables
            .values()
            .filter(|v| v.variable_table_id == current.id)
            .count();
        ensure_protocol_change(current, self, count)
    }

    fn check_delete(id: i64, tables: &Tables) -> Result<(), StorageError> {
        if tables.variables.values().any(|v| v.variable_table_id == id) {
            return Err(StorageError::constraint(format!(
                "variable table {id} still owns variables"
            )));
        }
        Ok(())
    }
}

impl StoredEntity for Variable {
    const KIND: &'static str = "variable";

    fn table(tables: &Tables) -> &EntityTable<Self> {
        &tables.variables
    }

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self> {
        &mut tables.variables
    }

    fn prepare(&mut self) {
        self.is_modified = false;
    }

    fn check_insert(&self, tables: &Tables) -> Result<(), StorageError> {
        validate_variable(self)?;
        let Some(table) = tables.variable_tables.get(self.variable_table_id) else {
            return Err(StorageError::constraint(format!(
                "variable table {} not found",
                self.variable_table_id
            )));
        };
        ensure_table_protocol(self, table.protocol)?;
        if let Some(missing) = self
            .mqtt_target_ids
            .iter()
            .find(|id| !tables.mqtt_targets.contains(**id))
        {
            return Err(StorageError::constraint(format!(
                "mqtt target {missing} not found"
            )));
        }
        Ok(())
    }
}

impl StoredEntity for MqttTarget {
    const KIND: &'static str = "mqtt target";

    fn table(tables: &Tables) -> &EntityTable<Self> {
        &tables.mqtt_targets
    }

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self> {
        &mut tables.mqtt_targets
    }

    fn check_delete(id: i64, tables: &Tables) -> Result<(), StorageError> {
        if tables
            .variables
            .values()
            .any(|v| v.mqtt_target_ids.contains(&id))
        {
            return Err(StorageError::constraint(format!(
                "mqtt target {id} still linked to variables"
            )));
        }
        Ok(())
    }
}

impl StoredEntity for VariableHistory {
    const KIND: &'static str = "variable history";

    fn table(tables: &Tables) -> &EntityTable<Self> {
        &tables.histories
    }

    fn table_mut(tables: &mut Tables) -> &mut EntityTable<Self> {
        &mut tables.histories
    }
}
