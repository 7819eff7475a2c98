mod common;

use common::{ScriptedPrompt, edit, loaded_fixture, session_for, text};
use dms_storage::{EntityStore, InMemoryEntityStore};
use dms_workset::{CacheEvent, RecordState, SessionError};
use domain::{FieldValue, PollLevel, Variable, VariableField};
use std::sync::Arc;

#[tokio::test]
async fn save_persists_only_the_modified_record() {
    let mut fx = loaded_fixture(&["A", "B", "C"]).await;
    let b = fx.record("B");
    let changed = fx
        .session
        .apply_edit(edit(
            &b,
            VariableField::PollLevel,
            FieldValue::Poll(PollLevel::OneSecond),
        ))
        .expect("edit");
    assert!(changed);

    let dirty: Vec<i64> = fx.session.collect_dirty().iter().map(|r| r.id).collect();
    assert_eq!(dirty, vec![b.id]);

    let writes_before = fx.store.write_count();
    let saved = fx.session.save_modified().await.expect("save");
    assert_eq!(saved, 1);
    assert_eq!(fx.store.write_count() - writes_before, 1);
    assert!(!fx.session.is_dirty());
    assert!(fx.session.records().iter().all(|r| !r.is_modified));

    let persisted = fx.persisted().await;
    let stored_b = persisted.iter().find(|r| r.id == b.id).expect("B");
    assert_eq!(stored_b.poll_level, PollLevel::OneSecond);
    assert_eq!(stored_b.updated_by.as_deref(), Some("tester"));
    assert_eq!(fx.notifier.successes().len(), 1);
    assert!(fx.notifier.errors().is_empty());

    // 保存后重建快照
    let snap = fx.session.snapshot().get(b.id).expect("snapshot");
    assert_eq!(snap.poll_level, PollLevel::OneSecond);
}

#[tokio::test]
async fn declined_exit_restores_snapshot() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.record("A");
    fx.session
        .apply_edit(edit(&a, VariableField::Description, text("y")))
        .expect("edit");
    assert!(fx.record("A").is_modified);

    let prompt = ScriptedPrompt::answering(false);
    assert!(!fx.session.exit(&prompt).await);
    assert_eq!(prompt.asked(), 1);

    let restored = fx.record("A");
    assert_eq!(restored.description, a.description);
    assert!(!restored.is_modified);
    assert_eq!(fx.session.record_state(a.id), RecordState::Clean);
    assert!(fx.session.table().is_some());
}

#[tokio::test]
async fn confirmed_exit_leaves_without_saving() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.record("A");
    fx.session
        .apply_edit(edit(&a, VariableField::Description, text("y")))
        .expect("edit");

    let prompt = ScriptedPrompt::answering(true);
    assert!(fx.session.exit(&prompt).await);
    assert!(fx.session.table().is_none());
    assert!(fx.session.records().is_empty());
    assert!(!fx.session.is_dirty());

    let persisted = fx.persisted().await;
    assert_eq!(persisted[0].description, a.description);
}

#[tokio::test]
async fn clean_exit_does_not_prompt() {
    let mut fx = loaded_fixture(&["A"]).await;
    let prompt = ScriptedPrompt::answering(false);
    assert!(fx.session.exit(&prompt).await);
    assert_eq!(prompt.asked(), 0);
}

#[tokio::test]
async fn marking_twice_collects_once() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let a = fx.id_of("A");
    assert!(fx.session.mark_modified(a));
    assert!(!fx.session.mark_modified(a));
    assert!(!fx.session.mark_modified(9_999));
    assert_eq!(fx.session.collect_dirty().len(), 1);
}

#[tokio::test]
async fn repeated_edits_leave_the_snapshot_untouched() {
    let mut fx = loaded_fixture(&["A"]).await;
    let original = fx.record("A");
    for value in ["one", "two", "three"] {
        let current = fx.record("A");
        fx.session
            .apply_edit(edit(&current, VariableField::Name, text(value)))
            .expect("edit");
    }
    assert_eq!(fx.session.collect_dirty().len(), 1);
    assert_eq!(fx.session.snapshot().get(original.id), Some(&original));

    assert_eq!(fx.session.discard_modified(), 1);
    assert_eq!(fx.session.records(), &[original][..]);
}

#[tokio::test]
async fn unchanged_value_is_not_an_edit() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.record("A");
    let changed = fx
        .session
        .apply_edit(edit(&a, VariableField::Name, text("A")))
        .expect("edit");
    assert!(!changed);
    assert!(!fx.session.is_dirty());
}

#[tokio::test]
async fn stale_edit_is_rejected_once() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.record("A");
    let mut stale = edit(&a, VariableField::Name, text("renamed"));
    stale.old = text("something else");
    let err = fx.session.apply_edit(stale).expect_err("stale");
    assert!(matches!(err, SessionError::Conflict(_)));
    assert_eq!(fx.notifier.errors().len(), 1);
    assert_eq!(fx.record("A"), a);
}

#[tokio::test]
async fn mistyped_edit_is_rejected_once() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.record("A");
    let err = fx
        .session
        .apply_edit(edit(&a, VariableField::Name, FieldValue::Bool(true)))
        .expect_err("type mismatch");
    assert!(matches!(err, SessionError::Field(_)));
    assert_eq!(fx.notifier.errors().len(), 1);
    assert!(!fx.session.is_dirty());
}

#[tokio::test]
async fn drafts_are_inserted_on_save() {
    let mut fx = loaded_fixture(&["A"]).await;
    let draft_id = fx
        .session
        .add_draft(common::s7_variable(0, "Draft", 9))
        .expect("draft");
    assert!(draft_id < 0);
    assert_eq!(fx.session.record_state(draft_id), RecordState::New);

    assert_eq!(fx.session.save_modified().await.expect("save"), 1);
    let names: Vec<String> = fx.session.records().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["A", "Draft"]);
    let saved = fx.record("Draft");
    assert!(saved.id > 0);
    assert_eq!(saved.variable_table_id, fx.table_id);
    assert!(saved.created_at_ms > 0);
    assert_eq!(fx.persisted().await.len(), 2);
}

#[tokio::test]
async fn discard_removes_drafts_and_restores_edits() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let before = fx.session.records().to_vec();
    let b = fx.record("B");
    fx.session
        .apply_edit(edit(&b, VariableField::Description, text("changed")))
        .expect("edit");
    fx.session
        .add_draft(common::s7_variable(0, "Draft", 9))
        .expect("draft");

    assert_eq!(fx.session.discard_modified(), 2);
    assert_eq!(fx.session.records(), before.as_slice());
    assert!(!fx.session.is_dirty());
    assert_eq!(fx.session.discard_modified(), 0);
}

#[tokio::test]
async fn draft_requires_loaded_table() {
    let store = InMemoryEntityStore::new();
    let notifier = Arc::new(common::RecordingNotifier::default());
    let mut session = session_for(&store, &notifier);
    let err = session
        .add_draft(Variable::default())
        .expect_err("not loaded");
    assert!(matches!(err, SessionError::NotLoaded));
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn failed_write_leaves_working_set_unchanged() {
    let mut fx = loaded_fixture(&["A", "B", "C"]).await;
    for name in ["A", "B", "C"] {
        let record = fx.record(name);
        fx.session
            .apply_edit(edit(&record, VariableField::Description, text("edited")))
            .expect("edit");
    }
    let before = fx.session.records().to_vec();
    let persisted_before = fx.persisted().await;

    fx.store.fail_after_writes(2);
    let err = fx.session.save_modified().await.expect_err("injected");
    assert!(matches!(err, SessionError::Storage(_)));

    assert_eq!(fx.session.records(), before.as_slice());
    assert_eq!(fx.session.collect_dirty().len(), 3);
    assert_eq!(fx.persisted().await, persisted_before);
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn failed_commit_leaves_working_set_unchanged() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let a = fx.record("A");
    fx.session
        .apply_edit(edit(&a, VariableField::Description, text("edited")))
        .expect("edit");
    fx.session
        .add_draft(common::s7_variable(0, "Draft", 7))
        .expect("draft");
    let before = fx.session.records().to_vec();
    let persisted_before = fx.persisted().await;

    fx.store.fail_next_commit();
    assert!(fx.session.save_modified().await.is_err());
    assert_eq!(fx.session.records(), before.as_slice());
    assert_eq!(fx.persisted().await, persisted_before);
    assert_eq!(fx.notifier.errors().len(), 1);

    // 故障是一次性的，重试成功
    assert_eq!(fx.session.save_modified().await.expect("retry"), 2);
}

#[tokio::test]
async fn invalid_alarm_range_is_rejected_before_writing() {
    let mut fx = loaded_fixture(&["A"]).await;
    let edits = [
        (VariableField::IsAlarmEnabled, FieldValue::Bool(true)),
        (VariableField::AlarmMin, FieldValue::Number(10.0)),
        (VariableField::AlarmMax, FieldValue::Number(5.0)),
    ];
    for (field, value) in edits {
        let current = fx.record("A");
        fx.session
            .apply_edit(edit(&current, field, value))
            .expect("edit");
    }
    let writes_before = fx.store.write_count();
    let err = fx.session.save_modified().await.expect_err("invalid");
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(fx.store.write_count(), writes_before);
    assert!(fx.session.is_dirty());
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn vanished_row_turns_save_into_conflict() {
    let mut fx = loaded_fixture(&["A", "B"]).await;
    let a = fx.record("A");
    let b = fx.record("B");
    for record in [&a, &b] {
        fx.session
            .apply_edit(edit(record, VariableField::Description, text("edited")))
            .expect("edit");
    }
    {
        let mut uow = fx.store.unit_of_work().await.expect("uow");
        uow.variables().delete(b.id).await.expect("delete");
    }

    let err = fx.session.save_modified().await.expect_err("conflict");
    assert!(matches!(err, SessionError::Conflict(_)));
    let persisted = fx.persisted().await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].description, a.description);
    assert_eq!(fx.session.collect_dirty().len(), 2);
    assert_eq!(fx.notifier.errors().len(), 1);
}

#[tokio::test]
async fn nothing_to_save_is_a_no_op() {
    let mut fx = loaded_fixture(&["A"]).await;
    let writes_before = fx.store.write_count();
    assert_eq!(fx.session.save_modified().await.expect("save"), 0);
    assert_eq!(fx.store.write_count(), writes_before);
    assert!(fx.notifier.successes().is_empty());
}

#[tokio::test]
async fn loading_missing_table_reports_not_found() {
    let store = InMemoryEntityStore::new();
    let notifier = Arc::new(common::RecordingNotifier::default());
    let mut session = session_for(&store, &notifier);
    let err = session.load(42).await.expect_err("missing");
    assert!(matches!(err, SessionError::NotFound(_)));
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn filter_only_changes_the_view() {
    let mut fx = loaded_fixture(&["Motor_Speed", "Tank_Level", "motor_current"]).await;
    fx.session.set_search_text("MOTOR");
    let names: Vec<&str> = fx
        .session
        .filtered()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["Motor_Speed", "motor_current"]);
    assert_eq!(fx.session.records().len(), 3);

    fx.session.set_search_text("DBD4");
    assert_eq!(fx.session.filtered().len(), 1);

    fx.session.set_search_text("");
    assert_eq!(fx.session.filtered().len(), 3);
}

#[tokio::test]
async fn edits_are_broadcast_to_subscribers() {
    let mut fx = loaded_fixture(&["A"]).await;
    let mut events = fx.session.subscribe();
    let a = fx.record("A");
    fx.session
        .apply_edit(edit(&a, VariableField::Description, text("x")))
        .expect("edit");
    assert_eq!(events.try_recv().expect("event"), CacheEvent::Upserted(a.id));
}

#[tokio::test]
async fn live_values_do_not_make_records_dirty() {
    let mut fx = loaded_fixture(&["A"]).await;
    let a = fx.id_of("A");
    assert!(fx.session.refresh_live_value(a, "12.5", "12.5 bar"));
    assert!(!fx.session.refresh_live_value(9_999, "1", "1"));
    assert!(!fx.session.is_dirty());

    let current = fx.record("A");
    fx.session
        .apply_edit(edit(&current, VariableField::Description, text("x")))
        .expect("edit");
    fx.session.discard_modified();
    let restored = fx.record("A");
    assert_eq!(restored.display_value, "12.5 bar");
    assert!(restored.last_poll_at_ms.is_some());
}
