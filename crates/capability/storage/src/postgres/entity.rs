//! 实体与表的映射
//!
//! 每个实体声明表名、列清单、行解析和写入 SQL；
//! 枚举列以文本保存，解析失败按后端错误返回。
//! 批量插入使用多行 values，批量更新以 `unnest` 数组参数一条语句完成。

use crate::error::StorageError;
use crate::validation::{ensure_protocol_change, ensure_table_protocol, validate_variable};
use async_trait::async_trait;
use domain::{
    Device, Entity, MqttTarget, ParseKindError, ProtocolType, Variable, VariableHistory,
    VariableTable,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

#[async_trait]
pub trait PgEntity: Entity + Clone + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    /// select / returning 使用的列清单（含 id）
    const COLUMNS: &'static str;

    fn from_row(row: &PgRow) -> Result<Self, StorageError>;

    /// 批量插入（调用方保证非空），返回顺序与输入一致
    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError>;

    /// 批量更新（调用方保证非空），返回实际更新的行数
    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError>;

    /// 读取后补齐关联数据
    async fn hydrate(_conn: &mut PgConnection, _items: &mut [Self]) -> Result<(), StorageError> {
        Ok(())
    }
}

fn parse_kind<K>(value: &str) -> Result<K, StorageError>
where
    K: FromStr<Err = ParseKindError>,
{
    value
        .parse()
        .map_err(|err: ParseKindError| StorageError::new(err.to_string()))
}

fn port_from_db(value: Option<i32>) -> Result<Option<u16>, StorageError> {
    value
        .map(|port| {
            u16::try_from(port).map_err(|_| StorageError::new(format!("invalid port {port}")))
        })
        .transpose()
}

fn rows_into<T: PgEntity>(rows: &[PgRow]) -> Result<Vec<T>, StorageError> {
    rows.iter().map(T::from_row).collect()
}

/// 取出一列，作为 `unnest` 的数组参数
fn column<T, V>(items: &[T], value: impl Fn(&T) -> V) -> Vec<V> {
    items.iter().map(value).collect()
}

#[async_trait]
impl PgEntity for Device {
    const TABLE: &'static str = "devices";
    const COLUMNS: &'static str =
        "id, name, description, protocol, ip, port, rack, slot, opcua_endpoint_url, is_active";

    fn from_row(row: &PgRow) -> Result<Self, StorageError> {
        let protocol: String = row.try_get("protocol")?;
        Ok(Device {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            protocol: parse_kind(&protocol)?,
            ip: row.try_get("ip")?,
            port: port_from_db(row.try_get("port")?)?,
            rack: row.try_get("rack")?,
            slot: row.try_get("slot")?,
            opcua_endpoint_url: row.try_get("opcua_endpoint_url")?,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into devices \
             (name, description, protocol, ip, port, rack, slot, opcua_endpoint_url, is_active) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.name.clone())
                .push_bind(item.description.clone())
                .push_bind(item.protocol.as_str())
                .push_bind(item.ip.clone())
                .push_bind(item.port.map(i32::from))
                .push_bind(item.rack)
                .push_bind(item.slot)
                .push_bind(item.opcua_endpoint_url.clone())
                .push_bind(item.is_active);
        });
        builder.push(" returning ");
        builder.push(Self::COLUMNS);
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows_into(&rows)
    }

    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "update devices as d set name = u.name, description = u.description, \
             protocol = u.protocol, ip = u.ip, port = u.port, rack = u.rack, slot = u.slot, \
             opcua_endpoint_url = u.opcua_endpoint_url, is_active = u.is_active \
             from unnest($1::bigint[], $2::text[], $3::text[], $4::text[], $5::text[], \
             $6::integer[], $7::smallint[], $8::smallint[], $9::text[], $10::boolean[]) \
             as u(id, name, description, protocol, ip, port, rack, slot, opcua_endpoint_url, \
             is_active) \
             where d.id = u.id",
        )
        .bind(column(items, |item| item.id))
        .bind(column(items, |item| item.name.clone()))
        .bind(column(items, |item| item.description.clone()))
        .bind(column(items, |item| item.protocol.as_str().to_string()))
        .bind(column(items, |item| item.ip.clone()))
        .bind(column(items, |item| item.port.map(i32::from)))
        .bind(column(items, |item| item.rack))
        .bind(column(items, |item| item.slot))
        .bind(column(items, |item| item.opcua_endpoint_url.clone()))
        .bind(column(items, |item| item.is_active))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PgEntity for VariableTable {
    const TABLE: &'static str = "variable_tables";
    const COLUMNS: &'static str = "id, device_id, name, description, protocol, is_active";

    fn from_row(row: &PgRow) -> Result<Self, StorageError> {
        let protocol: String = row.try_get("protocol")?;
        Ok(VariableTable {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            protocol: parse_kind(&protocol)?,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into variable_tables (device_id, name, description, protocol, is_active) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.device_id)
                .push_bind(item.name.clone())
                .push_bind(item.description.clone())
                .push_bind(item.protocol.as_str())
                .push_bind(item.is_active);
        });
        builder.push(" returning ");
        builder.push(Self::COLUMNS);
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows_into(&rows)
    }

    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError> {
        let rows = sqlx::query(
            "select t.id, t.protocol, \
             (select count(*) from variables v where v.variable_table_id = t.id) as variable_count \
             from variable_tables t where t.id = any($1)",
        )
        .bind(column(items, |item| item.id))
        .fetch_all(&mut *conn)
        .await?;
        let mut current: HashMap<i64, (ProtocolType, i64)> = HashMap::with_capacity(rows.len());
        for row in rows {
            let protocol: String = row.try_get("protocol")?;
            current.insert(
                row.try_get("id")?,
                (parse_kind(&protocol)?, row.try_get("variable_count")?),
            );
        }
        for item in items {
            if let Some((protocol, count)) = current.get(&item.id)
                && *protocol != item.protocol
            {
                let stored = VariableTable {
                    protocol: *protocol,
                    ..item.clone()
                };
                ensure_protocol_change(&stored, item, usize::try_from(*count).unwrap_or(usize::MAX))?;
            }
        }
        let result = sqlx::query(
            "update variable_tables as t set device_id = u.device_id, name = u.name, \
             description = u.description, protocol = u.protocol, is_active = u.is_active \
             from unnest($1::bigint[], $2::bigint[], $3::text[], $4::text[], $5::text[], \
             $6::boolean[]) as u(id, device_id, name, description, protocol, is_active) \
             where t.id = u.id",
        )
        .bind(column(items, |item| item.id))
        .bind(column(items, |item| item.device_id))
        .bind(column(items, |item| item.name.clone()))
        .bind(column(items, |item| item.description.clone()))
        .bind(column(items, |item| item.protocol.as_str().to_string()))
        .bind(column(items, |item| item.is_active))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

/// 校验变量字段及其与所属变量表的协议一致性
async fn check_variables(conn: &mut PgConnection, items: &[Variable]) -> Result<(), StorageError> {
    let table_ids: Vec<i64> = items
        .iter()
        .map(|item| item.variable_table_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let rows = sqlx::query("select id, protocol from variable_tables where id = any($1)")
        .bind(table_ids)
        .fetch_all(&mut *conn)
        .await?;
    let mut protocols: HashMap<i64, ProtocolType> = HashMap::with_capacity(rows.len());
    for row in rows {
        let protocol: String = row.try_get("protocol")?;
        protocols.insert(row.try_get("id")?, parse_kind(&protocol)?);
    }
    for item in items {
        validate_variable(item)?;
        let Some(protocol) = protocols.get(&item.variable_table_id) else {
            return Err(StorageError::constraint(format!(
                "variable table {} not found",
                item.variable_table_id
            )));
        };
        ensure_table_protocol(item, *protocol)?;
    }
    Ok(())
}

/// 以变量当前的 MQTT 目标集合覆盖关联表
async fn replace_links(conn: &mut PgConnection, items: &[Variable]) -> Result<(), StorageError> {
    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    sqlx::query("delete from variable_mqtt_targets where variable_id = any($1)")
        .bind(ids)
        .execute(&mut *conn)
        .await?;
    let pairs: Vec<(i64, i64)> = items
        .iter()
        .flat_map(|item| {
            item.mqtt_target_ids
                .iter()
                .map(move |target_id| (item.id, *target_id))
        })
        .collect();
    if pairs.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "insert into variable_mqtt_targets (variable_id, mqtt_target_id) ",
    );
    builder.push_values(pairs, |mut row, (variable_id, target_id)| {
        row.push_bind(variable_id).push_bind(target_id);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl PgEntity for Variable {
    const TABLE: &'static str = "variables";
    const COLUMNS: &'static str = "id, variable_table_id, name, description, protocol, \
        signal_type, s7_address, opcua_node_id, address, data_type, data_value, display_value, \
        conversion, is_active, is_alarm_enabled, alarm_min, alarm_max, alarm_deadband, \
        is_history_enabled, history_deadband, poll_level, opcua_update_mode, last_poll_at_ms, \
        is_deleted, created_at_ms, updated_at_ms, updated_by";

    fn from_row(row: &PgRow) -> Result<Self, StorageError> {
        let protocol: String = row.try_get("protocol")?;
        let signal_type: String = row.try_get("signal_type")?;
        let poll_level: String = row.try_get("poll_level")?;
        let update_mode: String = row.try_get("opcua_update_mode")?;
        Ok(Variable {
            id: row.try_get("id")?,
            variable_table_id: row.try_get("variable_table_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            protocol: parse_kind(&protocol)?,
            signal_type: parse_kind(&signal_type)?,
            s7_address: row.try_get("s7_address")?,
            opcua_node_id: row.try_get("opcua_node_id")?,
            address: row.try_get("address")?,
            data_type: row.try_get("data_type")?,
            data_value: row.try_get("data_value")?,
            display_value: row.try_get("display_value")?,
            conversion: row.try_get("conversion")?,
            is_active: row.try_get("is_active")?,
            is_alarm_enabled: row.try_get("is_alarm_enabled")?,
            alarm_min: row.try_get("alarm_min")?,
            alarm_max: row.try_get("alarm_max")?,
            alarm_deadband: row.try_get("alarm_deadband")?,
            is_history_enabled: row.try_get("is_history_enabled")?,
            history_deadband: row.try_get("history_deadband")?,
            poll_level: parse_kind(&poll_level)?,
            opcua_update_mode: parse_kind(&update_mode)?,
            last_poll_at_ms: row.try_get("last_poll_at_ms")?,
            is_deleted: row.try_get("is_deleted")?,
            is_modified: false,
            created_at_ms: row.try_get("created_at_ms")?,
            updated_at_ms: row.try_get("updated_at_ms")?,
            updated_by: row.try_get("updated_by")?,
            mqtt_target_ids: BTreeSet::new(),
        })
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError> {
        check_variables(conn, items).await?;
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into variables (variable_table_id, name, description, protocol, signal_type, \
             s7_address, opcua_node_id, address, data_type, data_value, display_value, conversion, \
             is_active, is_alarm_enabled, alarm_min, alarm_max, alarm_deadband, is_history_enabled, \
             history_deadband, poll_level, opcua_update_mode, last_poll_at_ms, is_deleted, \
             created_at_ms, updated_at_ms, updated_by) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.variable_table_id)
                .push_bind(item.name.clone())
                .push_bind(item.description.clone())
                .push_bind(item.protocol.as_str())
                .push_bind(item.signal_type.as_str())
                .push_bind(item.s7_address.clone())
                .push_bind(item.opcua_node_id.clone())
                .push_bind(item.address.clone())
                .push_bind(item.data_type.clone())
                .push_bind(item.data_value.clone())
                .push_bind(item.display_value.clone())
                .push_bind(item.conversion.clone())
                .push_bind(item.is_active)
                .push_bind(item.is_alarm_enabled)
                .push_bind(item.alarm_min)
                .push_bind(item.alarm_max)
                .push_bind(item.alarm_deadband)
                .push_bind(item.is_history_enabled)
                .push_bind(item.history_deadband)
                .push_bind(item.poll_level.as_str())
                .push_bind(item.opcua_update_mode.as_str())
                .push_bind(item.last_poll_at_ms)
                .push_bind(item.is_deleted)
                .push_bind(item.created_at_ms)
                .push_bind(item.updated_at_ms)
                .push_bind(item.updated_by.clone());
        });
        builder.push(" returning ");
        builder.push(Self::COLUMNS);
        let rows = builder.build().fetch_all(&mut *conn).await?;
        let mut inserted: Vec<Variable> = rows_into(&rows)?;
        for (stored, source) in inserted.iter_mut().zip(items) {
            stored.mqtt_target_ids = source.mqtt_target_ids.clone();
        }
        replace_links(conn, &inserted).await?;
        Ok(inserted)
    }

    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError> {
        check_variables(conn, items).await?;
        let rows = sqlx::query(
            "update variables as v set variable_table_id = u.variable_table_id, name = u.name, \
             description = u.description, protocol = u.protocol, signal_type = u.signal_type, \
             s7_address = u.s7_address, opcua_node_id = u.opcua_node_id, address = u.address, \
             data_type = u.data_type, data_value = u.data_value, \
             display_value = u.display_value, conversion = u.conversion, \
             is_active = u.is_active, is_alarm_enabled = u.is_alarm_enabled, \
             alarm_min = u.alarm_min, alarm_max = u.alarm_max, \
             alarm_deadband = u.alarm_deadband, is_history_enabled = u.is_history_enabled, \
             history_deadband = u.history_deadband, poll_level = u.poll_level, \
             opcua_update_mode = u.opcua_update_mode, last_poll_at_ms = u.last_poll_at_ms, \
             is_deleted = u.is_deleted, created_at_ms = u.created_at_ms, \
             updated_at_ms = u.updated_at_ms, updated_by = u.updated_by \
             from unnest($1::bigint[], $2::bigint[], $3::text[], $4::text[], $5::text[], \
             $6::text[], $7::text[], $8::text[], $9::text[], $10::text[], $11::text[], \
             $12::text[], $13::text[], $14::boolean[], $15::boolean[], \
             $16::double precision[], $17::double precision[], $18::double precision[], \
             $19::boolean[], $20::double precision[], $21::text[], $22::text[], \
             $23::bigint[], $24::boolean[], $25::bigint[], $26::bigint[], $27::text[]) \
             as u(id, variable_table_id, name, description, protocol, signal_type, s7_address, \
             opcua_node_id, address, data_type, data_value, display_value, conversion, \
             is_active, is_alarm_enabled, alarm_min, alarm_max, alarm_deadband, \
             is_history_enabled, history_deadband, poll_level, opcua_update_mode, \
             last_poll_at_ms, is_deleted, created_at_ms, updated_at_ms, updated_by) \
             where v.id = u.id \
             returning v.id",
        )
        .bind(column(items, |item| item.id))
        .bind(column(items, |item| item.variable_table_id))
        .bind(column(items, |item| item.name.clone()))
        .bind(column(items, |item| item.description.clone()))
        .bind(column(items, |item| item.protocol.as_str().to_string()))
        .bind(column(items, |item| item.signal_type.as_str().to_string()))
        .bind(column(items, |item| item.s7_address.clone()))
        .bind(column(items, |item| item.opcua_node_id.clone()))
        .bind(column(items, |item| item.address.clone()))
        .bind(column(items, |item| item.data_type.clone()))
        .bind(column(items, |item| item.data_value.clone()))
        .bind(column(items, |item| item.display_value.clone()))
        .bind(column(items, |item| item.conversion.clone()))
        .bind(column(items, |item| item.is_active))
        .bind(column(items, |item| item.is_alarm_enabled))
        .bind(column(items, |item| item.alarm_min))
        .bind(column(items, |item| item.alarm_max))
        .bind(column(items, |item| item.alarm_deadband))
        .bind(column(items, |item| item.is_history_enabled))
        .bind(column(items, |item| item.history_deadband))
        .bind(column(items, |item| item.poll_level.as_str().to_string()))
        .bind(column(items, |item| item.opcua_update_mode.as_str().to_string()))
        .bind(column(items, |item| item.last_poll_at_ms))
        .bind(column(items, |item| item.is_deleted))
        .bind(column(items, |item| item.created_at_ms))
        .bind(column(items, |item| item.updated_at_ms))
        .bind(column(items, |item| item.updated_by.clone()))
        .fetch_all(&mut *conn)
        .await?;
        let mut updated = BTreeSet::new();
        for row in &rows {
            updated.insert(row.try_get::<i64, _>("id")?);
        }
        let touched: Vec<Variable> = items
            .iter()
            .filter(|item| updated.contains(&item.id))
            .cloned()
            .collect();
        if !touched.is_empty() {
            replace_links(conn, &touched).await?;
        }
        Ok(rows.len() as u64)
    }

    async fn hydrate(conn: &mut PgConnection, items: &mut [Self]) -> Result<(), StorageError> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let rows = sqlx::query(
            "select variable_id, mqtt_target_id from variable_mqtt_targets \
             where variable_id = any($1)",
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
        let mut links: HashMap<i64, BTreeSet<i64>> = HashMap::new();
        for row in rows {
            links
                .entry(row.try_get("variable_id")?)
                .or_default()
                .insert(row.try_get("mqtt_target_id")?);
        }
        for item in items.iter_mut() {
            item.mqtt_target_ids = links.remove(&item.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl PgEntity for MqttTarget {
    const TABLE: &'static str = "mqtt_targets";
    const COLUMNS: &'static str = "id, name, host, port, topic, is_active";

    fn from_row(row: &PgRow) -> Result<Self, StorageError> {
        let port: i32 = row.try_get("port")?;
        Ok(MqttTarget {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            host: row.try_get("host")?,
            port: port_from_db(Some(port))?.unwrap_or_default(),
            topic: row.try_get("topic")?,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "insert into mqtt_targets (name, host, port, topic, is_active) ",
        );
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.name.clone())
                .push_bind(item.host.clone())
                .push_bind(i32::from(item.port))
                .push_bind(item.topic.clone())
                .push_bind(item.is_active);
        });
        builder.push(" returning ");
        builder.push(Self::COLUMNS);
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows_into(&rows)
    }

    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "update mqtt_targets as m set name = u.name, host = u.host, port = u.port, \
             topic = u.topic, is_active = u.is_active \
             from unnest($1::bigint[], $2::text[], $3::text[], $4::integer[], $5::text[], \
             $6::boolean[]) as u(id, name, host, port, topic, is_active) \
             where m.id = u.id",
        )
        .bind(column(items, |item| item.id))
        .bind(column(items, |item| item.name.clone()))
        .bind(column(items, |item| item.host.clone()))
        .bind(column(items, |item| i32::from(item.port)))
        .bind(column(items, |item| item.topic.clone()))
        .bind(column(items, |item| item.is_active))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PgEntity for VariableHistory {
    const TABLE: &'static str = "variable_histories";
    const COLUMNS: &'static str = "id, variable_id, value, ts_ms";

    fn from_row(row: &PgRow) -> Result<Self, StorageError> {
        Ok(VariableHistory {
            id: row.try_get("id")?,
            variable_id: row.try_get("variable_id")?,
            value: row.try_get("value")?,
            ts_ms: row.try_get("ts_ms")?,
        })
    }

    async fn insert_batch(
        conn: &mut PgConnection,
        items: &[Self],
    ) -> Result<Vec<Self>, StorageError> {
        let mut builder =
            QueryBuilder::<Postgres>::new("insert into variable_histories (variable_id, value, ts_ms) ");
        builder.push_values(items, |mut row, item| {
            row.push_bind(item.variable_id)
                .push_bind(item.value.clone())
                .push_bind(item.ts_ms);
        });
        builder.push(" returning ");
        builder.push(Self::COLUMNS);
        let rows = builder.build().fetch_all(&mut *conn).await?;
        rows_into(&rows)
    }

    async fn update_rows(conn: &mut PgConnection, items: &[Self]) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "update variable_histories as h set variable_id = u.variable_id, value = u.value, \
             ts_ms = u.ts_ms \
             from unnest($1::bigint[], $2::bigint[], $3::text[], $4::bigint[]) \
             as u(id, variable_id, value, ts_ms) \
             where h.id = u.id",
        )
        .bind(column(items, |item| item.id))
        .bind(column(items, |item| item.variable_id))
        .bind(column(items, |item| item.value.clone()))
        .bind(column(items, |item| item.ts_ms))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}
