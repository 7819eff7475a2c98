#![allow(dead_code)]

use async_trait::async_trait;
use dms_storage::{EntityStore, InMemoryEntityStore};
use dms_workset::{ConfirmPrompt, Notifier, SessionOptions, VariableTableSession};
use domain::{Device, FieldEdit, FieldValue, ProtocolType, Variable, VariableField, VariableTable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().expect("lock").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn report_success(&self, message: &str) {
        self.successes.lock().expect("lock").push(message.to_string());
    }

    fn report_error(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        self.errors
            .lock()
            .expect("lock")
            .push(format!("{message}: {cause}"));
    }
}

pub struct ScriptedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmPrompt for ScriptedPrompt {
    async fn confirm(&self, _title: &str, _message: &str, _action_label: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

pub struct Fixture {
    pub store: InMemoryEntityStore,
    pub notifier: Arc<RecordingNotifier>,
    pub session: VariableTableSession,
    pub device_id: i64,
    pub table_id: i64,
}

impl Fixture {
    /// 已加载工作集中按名称查找记录 ID
    pub fn id_of(&self, name: &str) -> i64 {
        self.session
            .records()
            .iter()
            .find(|record| record.name == name)
            .map(|record| record.id)
            .expect("record in working set")
    }

    pub fn record(&self, name: &str) -> Variable {
        self.session
            .records()
            .iter()
            .find(|record| record.name == name)
            .cloned()
            .expect("record in working set")
    }

    pub async fn persisted(&self) -> Vec<Variable> {
        let mut uow = self.store.unit_of_work().await.expect("uow");
        let items = uow
            .variables()
            .list_by_table(self.table_id)
            .await
            .expect("list");
        items
    }
}

pub fn s7_variable(table_id: i64, name: &str, index: usize) -> Variable {
    Variable {
        variable_table_id: table_id,
        name: name.to_string(),
        description: format!("{name} description"),
        protocol: ProtocolType::S7,
        s7_address: Some(format!("DB1.DBD{}", index * 4)),
        data_type: "Real".to_string(),
        is_active: true,
        ..Default::default()
    }
}

pub fn opcua_variable(table_id: i64, name: &str) -> Variable {
    Variable {
        variable_table_id: table_id,
        name: name.to_string(),
        protocol: ProtocolType::OpcUa,
        opcua_node_id: Some(format!("ns=2;s={name}")),
        data_type: "Double".to_string(),
        ..Default::default()
    }
}

/// 创建设备、变量表与初始变量（不加载）
pub async fn seed(
    store: &InMemoryEntityStore,
    protocol: ProtocolType,
    variables: Vec<Variable>,
) -> (i64, i64) {
    let mut uow = store.unit_of_work().await.expect("uow");
    let device = uow
        .devices()
        .add(Device {
            name: "PLC-1".to_string(),
            protocol,
            is_active: true,
            ..Default::default()
        })
        .await
        .expect("device");
    let table = uow
        .variable_tables()
        .add(VariableTable {
            device_id: device.id,
            name: "Table-1".to_string(),
            protocol,
            is_active: true,
            ..Default::default()
        })
        .await
        .expect("table");
    let variables: Vec<Variable> = variables
        .into_iter()
        .map(|mut variable| {
            variable.variable_table_id = table.id;
            variable
        })
        .collect();
    if !variables.is_empty() {
        uow.variables().add_batch(variables).await.expect("variables");
    }
    (device.id, table.id)
}

pub fn session_for(store: &InMemoryEntityStore, notifier: &Arc<RecordingNotifier>) -> VariableTableSession {
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    VariableTableSession::new(
        shared,
        notifier.clone(),
        SessionOptions {
            operator: "tester".to_string(),
            ..SessionOptions::default()
        },
    )
}

/// S7 变量表，已加载给定名称的变量
pub async fn loaded_fixture(names: &[&str]) -> Fixture {
    let store = InMemoryEntityStore::new();
    let variables = names
        .iter()
        .enumerate()
        .map(|(index, name)| s7_variable(0, name, index))
        .collect();
    let (device_id, table_id) = seed(&store, ProtocolType::S7, variables).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let mut session = session_for(&store, &notifier);
    session.load(table_id).await.expect("load");
    Fixture {
        store,
        notifier,
        session,
        device_id,
        table_id,
    }
}

/// 以记录当前值为旧值构造编辑事件
pub fn edit(record: &Variable, field: VariableField, new: FieldValue) -> FieldEdit {
    FieldEdit {
        record_id: record.id,
        field,
        old: record.field(field),
        new,
    }
}

pub fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}
