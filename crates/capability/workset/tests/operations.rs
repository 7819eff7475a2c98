mod common;

use common::{RecordingNotifier, edit, loaded_fixture, s7_variable, seed, session_for, text};
use dms_storage::{EntityStore, InMemoryEntityStore};
use dms_workset::{RecordState, SessionError, create_device_with_table, set_table_active};
use domain::{
    Device, MqttTarget, PollLevel, ProtocolType, VariableField, VariableHistory, VariableTable,
};
use std::sync::Arc;

async fn add_mqtt_target(store: &InMemoryEntityStore) -> i64 {
    let mut uow = store.unit_of_work().await.expect("uow");
    let target = uow
        .mqtt_targets()
        .add(MqttTarget {
            name: "broker".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1883,
            topic: "dms/values".to_string(),
            is_active: true,
            ..Default::default()
        })
        .await
        .expect("target");
    target.id
}

#[tokio::test]
async fn delete_removes_rows_and_refreshes() {
    let mut fx = loaded_fixture(&["A", "B", "C"]).await;
    let b = fx.id_of("B");
    let removed = fx.session.delete(&[b]).await.expect("delete");
    assert_eq!(removed, 1);

    let names: Vec<String> = fx.session.records().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["A", "C"]);
    assert!(fx.session.snapshot().get(b).is_none());
    assert_eq!(fx.persisted().await.len(), 2);
    assert_eq!(fx.notifier.successes().len(), 1);
}

#[tokio::test]
async fn deleting_vanished_rows_reports_an_error() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.id_of("A");
    {
        let mut uow = fx.store.unit_of_work().await.expect("uow");
        uow.variables().delete(a).await.expect("delete");
    }
    let removed = fx.session.delete(&[a]).await.expect("delete");
    assert_eq!(removed, 0);
    assert_eq!(fx.notifier.errors().len(), 1);
    assert!(fx.notifier.successes().is_empty());
}

#[tokio::test]
async fn delete_keeps_unsaved_edits_of_survivors() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let a = fx.record("A");
    fx.session
        .apply_edit(edit(&a, VariableField::Description, text("pending")))
        .expect("edit");
    let b = fx.id_of("B");
    fx.session.delete(&[b]).await.expect("delete");

    assert_eq!(fx.session.records().len(), 1);
    assert_eq!(fx.record("A").description, "pending");
    assert_eq!(fx.session.record_state(a.id), RecordState::Dirty);
}

#[tokio::test]
async fn deleting_a_draft_stays_local() {
    let mut fx = loaded_fixture(&["A"]).await;
    let draft = fx
        .session
        .add_draft(s7_variable(0, "Draft", 5))
        .expect("draft");
    let writes_before = fx.store.write_count();
    assert_eq!(fx.session.delete(&[draft]).await.expect("delete"), 1);
    assert_eq!(fx.store.write_count(), writes_before);
    assert!(!fx.session.is_dirty());
    assert_eq!(fx.session.records().len(), 1);
}

#[tokio::test]
async fn failed_delete_keeps_working_set() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let before = fx.session.records().to_vec();
    let ids: Vec<i64> = before.iter().map(|r| r.id).collect();

    fx.store.fail_after_writes(1);
    let err = fx.session.delete(&ids).await.expect_err("injected");
    assert!(matches!(err, SessionError::Storage(_)));
    assert_eq!(fx.session.records(), before.as_slice());
    assert_eq!(fx.persisted().await.len(), 2);
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn poll_level_change_is_persisted() {
    let mut fx = loaded_fixture(&["A", "B", "C"]).await;
    let ids = [fx.id_of("A"), fx.id_of("C")];
    let updated = fx
        .session
        .change_poll_level(&ids, PollLevel::FiveSeconds)
        .await
        .expect("poll level");
    assert_eq!(updated, 2);

    for record in fx.persisted().await {
        let expected = if record.name == "B" {
            PollLevel::ThirtySeconds
        } else {
            PollLevel::FiveSeconds
        };
        assert_eq!(record.poll_level, expected, "{}", record.name);
    }
    assert_eq!(fx.record("A").poll_level, PollLevel::FiveSeconds);
    assert!(!fx.session.is_dirty());
    assert_eq!(
        fx.session.snapshot().get(ids[0]).map(|r| r.poll_level),
        Some(PollLevel::FiveSeconds)
    );
}

#[tokio::test]
async fn mqtt_attach_is_idempotent() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let target = add_mqtt_target(&fx.store).await;
    let ids = [fx.id_of("A"), fx.id_of("B")];

    assert_eq!(
        fx.session.attach_mqtt_target(&ids, target).await.expect("attach"),
        2
    );
    let writes_before = fx.store.write_count();
    assert_eq!(
        fx.session.attach_mqtt_target(&ids, target).await.expect("again"),
        0
    );
    assert_eq!(fx.store.write_count(), writes_before);

    for record in fx.persisted().await {
        assert_eq!(record.mqtt_target_ids.len(), 1);
        assert!(record.mqtt_target_ids.contains(&target));
    }
}

#[tokio::test]
async fn poll_level_conflict_writes_nothing() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let a = fx.id_of("A");
    let b = fx.id_of("B");
    {
        let mut uow = fx.store.unit_of_work().await.expect("uow");
        uow.variables().delete(b).await.expect("delete");
    }
    let commits_before = fx.store.commit_count();

    let err = fx
        .session
        .change_poll_level(&[a, b], PollLevel::FiveSeconds)
        .await
        .expect_err("vanished row");
    assert!(matches!(err, SessionError::Conflict(_)));

    let persisted = fx.persisted().await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].poll_level, PollLevel::ThirtySeconds);
    assert_eq!(fx.record("A").poll_level, PollLevel::ThirtySeconds);
    assert_eq!(fx.store.commit_count(), commits_before);
    assert_eq!(fx.notifier.errors().len(), 1);
    assert!(fx.notifier.successes().is_empty());
}

#[tokio::test]
async fn attach_failure_writes_nothing() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let target = add_mqtt_target(&fx.store).await;
    let ids = [fx.id_of("A"), fx.id_of("B")];
    let before = fx.session.records().to_vec();

    fx.store.fail_after_writes(1);
    let err = fx
        .session
        .attach_mqtt_target(&ids, target)
        .await
        .expect_err("injected");
    assert!(matches!(err, SessionError::Storage(_)));

    for record in fx.persisted().await {
        assert!(record.mqtt_target_ids.is_empty(), "{}", record.name);
    }
    assert_eq!(fx.session.records(), before.as_slice());
    assert_eq!(fx.notifier.errors().len(), 1);
    assert!(fx.notifier.successes().is_empty());
}

#[tokio::test]
async fn attach_conflict_writes_nothing() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let target = add_mqtt_target(&fx.store).await;
    let a = fx.id_of("A");
    let b = fx.id_of("B");
    {
        let mut uow = fx.store.unit_of_work().await.expect("uow");
        uow.variables().delete(b).await.expect("delete");
    }

    let err = fx
        .session
        .attach_mqtt_target(&[a, b], target)
        .await
        .expect_err("vanished row");
    assert!(matches!(err, SessionError::Conflict(_)));
    let persisted = fx.persisted().await;
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].mqtt_target_ids.is_empty());
    assert!(fx.record("A").mqtt_target_ids.is_empty());
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn attaching_unknown_target_is_not_found() {
    let mut fx = loaded_fixture(&["A"]).await;
    let ids = [fx.id_of("A")];
    let err = fx
        .session
        .attach_mqtt_target(&ids, 77)
        .await
        .expect_err("unknown target");
    assert!(matches!(err, SessionError::NotFound(_)));
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn activation_flips_after_persisting() {
    let mut fx = loaded_fixture(&["A"]).await;
    assert!(fx.session.set_active(false).await.expect("deactivate"));
    assert_eq!(fx.session.table().map(|t| t.is_active), Some(false));

    let mut uow = fx.store.unit_of_work().await.expect("uow");
    let stored = uow
        .variable_tables()
        .get_by_id(fx.table_id)
        .await
        .expect("get")
        .expect("table");
    assert!(!stored.is_active);
}

#[tokio::test]
async fn activation_on_missing_row_keeps_flag() {
    let store = InMemoryEntityStore::new();
    let (_, table_id) = seed(&store, ProtocolType::S7, Vec::new()).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let mut session = session_for(&store, &notifier);
    session.load(table_id).await.expect("load");
    {
        let mut uow = store.unit_of_work().await.expect("uow");
        uow.variable_tables().delete(table_id).await.expect("delete");
    }

    let before = session.table().map(|t| t.is_active);
    let ok = session.set_active(!before.unwrap_or(false)).await.expect("toggle");
    assert!(!ok);
    assert_eq!(session.table().map(|t| t.is_active), before);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn set_table_active_works_without_a_session() {
    let store = InMemoryEntityStore::new();
    let (device_id, table_id) = seed(&store, ProtocolType::S7, Vec::new()).await;
    let notifier = RecordingNotifier::default();
    let mut table = VariableTable {
        id: table_id,
        device_id,
        name: "Table-1".to_string(),
        protocol: ProtocolType::S7,
        is_active: true,
        ..Default::default()
    };
    let ok = set_table_active(&store, &notifier, &mut table, false)
        .await
        .expect("toggle");
    assert!(ok);
    assert!(!table.is_active);
    assert_eq!(notifier.successes().len(), 1);
}

#[tokio::test]
async fn provisioning_creates_device_and_table_together() {
    let store = InMemoryEntityStore::new();
    let (device, table) = create_device_with_table(
        &store,
        Device {
            name: "OPC-1".to_string(),
            protocol: ProtocolType::OpcUa,
            opcua_endpoint_url: Some("opc.tcp://10.0.0.5:4840".to_string()),
            ..Default::default()
        },
        VariableTable {
            name: "Default".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("provision");
    assert!(device.id > 0);
    assert_eq!(table.device_id, device.id);
    assert_eq!(table.protocol, ProtocolType::OpcUa);
}

#[tokio::test]
async fn provisioning_failure_persists_nothing() {
    let store = InMemoryEntityStore::new();
    store.fail_after_writes(1);
    let result = create_device_with_table(
        &store,
        Device {
            name: "PLC-9".to_string(),
            ..Default::default()
        },
        VariableTable {
            name: "Default".to_string(),
            ..Default::default()
        },
    )
    .await;
    assert!(result.is_err());

    let mut uow = store.unit_of_work().await.expect("uow");
    assert!(uow.devices().get_all().await.expect("devices").is_empty());
}

#[tokio::test]
async fn history_is_read_in_time_order() {
    let fx = loaded_fixture(&["A"]).await;
    let a = fx.id_of("A");
    {
        let mut uow = fx.store.unit_of_work().await.expect("uow");
        uow.histories()
            .add_batch(vec![
                VariableHistory {
                    variable_id: a,
                    value: "2".to_string(),
                    ts_ms: 2_000,
                    ..Default::default()
                },
                VariableHistory {
                    variable_id: a,
                    value: "1".to_string(),
                    ts_ms: 1_000,
                    ..Default::default()
                },
            ])
            .await
            .expect("history");
    }
    let values: Vec<String> = fx
        .session
        .history(a)
        .await
        .expect("history")
        .into_iter()
        .map(|h| h.value)
        .collect();
    assert_eq!(values, vec!["1", "2"]);
}
