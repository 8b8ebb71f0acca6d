// Integration tests for open/close/delete_store, schema migration and
// lifecycle logging

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{migrate_v1, open_widget_store, scratch, widget, widget_manager, Marker, Widget};
use dtstore_core::logging_facility::test_capture::init_test_capture;
use dtstore_core::{
    CodecScope, Executor, ExErrorKind, MigrationPlan, Persistable, Result, SchemaVersion, Value,
};
use dtstore_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_ERR_CODE, FIELD_OBJECT_ID, FIELD_SCHEMA_VERSION,
};
use dtstore_store::{JournalMode, SqliteConnector, SqliteManager, SqliteOptions};
use std::cell::Cell;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::Command;

fn table_exists(manager: &mut SqliteManager, table: &str) -> bool {
    !manager
        .store_mut()
        .unwrap()
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::from(table)],
        )
        .unwrap()
        .is_empty()
}

#[test]
fn test_widgets_migration_survives_reopen() {
    let scratch = scratch();
    let mut manager = widget_manager();
    let seen = Cell::new(Vec::new());

    let migrate = |exec: &mut dyn Executor, current: SchemaVersion| -> Result<SchemaVersion> {
        let mut calls = seen.take();
        calls.push(current.get());
        seen.set(calls);
        if current == SchemaVersion::ZERO {
            exec.execute_batch(
                "CREATE TABLE widgets (
                    objectId INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT, weight REAL, count INTEGER, active INTEGER,
                    nickname TEXT, payload BLOB
                )",
            )?;
        }
        Ok(SchemaVersion::new(1))
    };

    assert_eq!(manager.open(&scratch.path, migrate).unwrap().get(), 1);
    let mut kept = widget("kept", 2);
    let id = manager.save(&mut kept).unwrap();
    manager.close().unwrap();
    assert!(!manager.is_open());

    assert_eq!(manager.open(&scratch.path, migrate).unwrap().get(), 1);
    assert_eq!(manager.schema_version(), Some(SchemaVersion::new(1)));
    assert_eq!(seen.take(), vec![0, 1]);
    assert_eq!(manager.load::<Widget>(id).unwrap(), Some(kept));
}

#[test]
fn test_registration_after_open_is_configuration() {
    let (mut manager, _scratch) = open_widget_store();

    let err = manager.register_managed_class::<Marker>().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Configuration);

    let err = manager
        .register_codec(common::point_codec(), CodecScope::type_name("Point"))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Configuration);
}

#[test]
fn test_registrations_survive_reopen() {
    let (mut manager, scratch) = open_widget_store();
    manager.close().unwrap();
    manager.register_managed_class::<Marker>().unwrap();

    manager.open(&scratch.path, migrate_v1).unwrap();
    assert!(manager.classes().contains::<Widget>());
    assert!(manager.classes().contains::<Marker>());
    assert!(manager.all_ids::<Widget>().unwrap().is_empty());
}

#[test]
fn test_failed_migration_rolls_back() {
    let (mut manager, scratch) = open_widget_store();
    manager.close().unwrap();

    let err = manager
        .open(
            &scratch.path,
            |exec: &mut dyn Executor, _: SchemaVersion| -> Result<SchemaVersion> {
                exec.execute_batch("CREATE TABLE gadgets (objectId INTEGER PRIMARY KEY)")?;
                exec.execute_batch("ALTER TABLE no_such_table ADD COLUMN x TEXT")?;
                Ok(SchemaVersion::new(2))
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Migration);
    assert!(!manager.is_open());

    let version = manager.open(&scratch.path, migrate_v1).unwrap();
    assert_eq!(version.get(), 1);
    assert!(!table_exists(&mut manager, "gadgets"));
}

#[test]
fn test_version_regression_rolls_back() {
    let (mut manager, scratch) = open_widget_store();
    manager.close().unwrap();

    let err = manager
        .open(
            &scratch.path,
            |exec: &mut dyn Executor, _: SchemaVersion| -> Result<SchemaVersion> {
                exec.execute_batch("CREATE TABLE extras (objectId INTEGER PRIMARY KEY)")?;
                Ok(SchemaVersion::ZERO)
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Migration);

    manager.open(&scratch.path, migrate_v1).unwrap();
    assert_eq!(manager.schema_version(), Some(SchemaVersion::new(1)));
    assert!(!table_exists(&mut manager, "extras"));
}

#[test]
fn test_migration_plan_applies_pending_steps() {
    let scratch = scratch();
    let mut manager = widget_manager();
    let v1 = MigrationPlan::new().step(1, common::WIDGETS_DDL);
    let v2 = v1
        .clone()
        .step(2, "ALTER TABLE widgets ADD COLUMN colour TEXT");

    assert_eq!(manager.open(&scratch.path, v1).unwrap().get(), 1);
    let mut early = widget("early", 1);
    manager.save(&mut early).unwrap();
    manager.close().unwrap();

    assert_eq!(manager.open(&scratch.path, v2.clone()).unwrap().get(), 2);
    let columns = manager
        .store_mut()
        .unwrap()
        .query("SELECT name FROM pragma_table_info('widgets')", &[])
        .unwrap();
    assert!(columns
        .iter()
        .any(|row| row.get("name") == Some(&Value::from("colour"))));
    manager.close().unwrap();

    // Nothing pending: the version stays put
    assert_eq!(manager.open(&scratch.path, v2).unwrap().get(), 2);
    assert_eq!(manager.all_ids::<Widget>().unwrap().len(), 1);
}

#[test]
fn test_generated_ddl_drives_migration() {
    let scratch = scratch();
    let mut manager = widget_manager();
    let ddl = manager.create_table_sql::<Widget>().unwrap();

    manager
        .open(
            &scratch.path,
            move |exec: &mut dyn Executor, _: SchemaVersion| -> Result<SchemaVersion> {
                exec.execute_batch(&ddl)?;
                Ok(SchemaVersion::new(1))
            },
        )
        .unwrap();

    let mut w = widget("generated", 5);
    w.payload = vec![9, 9];
    let id = manager.save(&mut w).unwrap();
    assert_eq!(manager.load::<Widget>(id).unwrap(), Some(w));
}

#[test]
fn test_close_blocked_by_open_transaction() {
    let (mut manager, _scratch) = open_widget_store();
    manager.store_mut().unwrap().execute_batch("BEGIN").unwrap();

    let err = manager.close().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageClose);
    assert!(manager.is_open());

    manager.store_mut().unwrap().execute_batch("COMMIT").unwrap();
    manager.close().unwrap();
    assert!(!manager.is_open());
}

#[test]
fn test_delete_store_removes_files() {
    let (mut manager, scratch) = open_widget_store();
    let mut w = widget("doomed", 1);
    manager.save(&mut w).unwrap();
    assert!(scratch.path.exists());

    manager.delete_store().unwrap();
    assert!(!manager.is_open());
    assert!(!scratch.path.exists());
    for suffix in ["-wal", "-shm", "-journal"] {
        let sidecar = format!("{}{}", scratch.path.display(), suffix);
        assert!(!std::path::Path::new(&sidecar).exists(), "{sidecar} left behind");
    }

    // A later open starts from an empty store
    let seen = Cell::new(None);
    manager
        .open(
            &scratch.path,
            |_: &mut dyn Executor, current: SchemaVersion| -> Result<SchemaVersion> {
                seen.set(Some(current));
                Ok(current)
            },
        )
        .unwrap();
    assert_eq!(seen.get(), Some(SchemaVersion::ZERO));
}

#[test]
fn test_delete_store_without_path_fails() {
    let mut manager = widget_manager();
    let err = manager.delete_store().unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageDelete);
}

#[test]
fn test_open_rejects_non_database_file() {
    let scratch = scratch();
    std::fs::write(&scratch.path, "plain text, certainly not an SQLite header").unwrap();

    let mut manager = widget_manager();
    let err = manager.open(&scratch.path, migrate_v1).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageOpen);
    assert!(!manager.is_open());
}

/// Make `path` unwritable even for root; false when the platform refuses
fn make_unwritable(path: &Path) -> bool {
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    permissions.set_readonly(true);
    std::fs::set_permissions(path, permissions).unwrap();
    if OpenOptions::new().write(true).open(path).is_err() {
        return true;
    }
    Command::new("chattr")
        .arg("+i")
        .arg(path)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
        && OpenOptions::new().write(true).open(path).is_err()
}

fn make_writable(path: &Path) {
    let _ = Command::new("chattr").arg("-i").arg(path).status();
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    std::fs::set_permissions(path, permissions).unwrap();
}

#[test]
fn test_unwritable_store_fails_to_open() {
    let (mut manager, scratch) = open_widget_store();
    manager.close().unwrap();

    if !make_unwritable(&scratch.path) {
        eprintln!("skipping: cannot make {} unwritable", scratch.path.display());
        make_writable(&scratch.path);
        return;
    }
    let result = manager.open(&scratch.path, migrate_v1);
    make_writable(&scratch.path);

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageOpen);
    assert!(!manager.is_open());
}

#[test]
fn test_open_twice_is_rejected() {
    let (mut manager, scratch) = open_widget_store();
    let err = manager.open(&scratch.path, migrate_v1).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageOpen);
    assert!(manager.is_open());
}

#[test]
fn test_operations_after_close_are_not_open() {
    let (mut manager, _scratch) = open_widget_store();
    let mut w = widget("late", 1);
    manager.save(&mut w).unwrap();
    manager.close().unwrap();

    assert_eq!(
        manager.save(&mut w).unwrap_err().kind(),
        ExErrorKind::NotOpen
    );
    assert_eq!(
        manager.delete(&w).unwrap_err().kind(),
        ExErrorKind::NotOpen
    );
    assert_eq!(
        manager.store_mut().unwrap_err().kind(),
        ExErrorKind::NotOpen
    );
    assert_eq!(manager.schema_version(), None);
}

#[cfg(not(feature = "sqlcipher"))]
#[test]
fn test_encrypted_open_needs_sqlcipher() {
    let scratch = scratch();
    let mut manager = widget_manager();

    let err = manager
        .open_encrypted(&scratch.path, "s3cret", migrate_v1)
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageOpen);
    assert!(err.message().contains("SQLCipher"));
    assert!(!manager.is_open());
}

#[cfg(feature = "sqlcipher")]
#[test]
fn test_encrypted_open_round_trip() {
    let scratch = scratch();
    let mut manager = widget_manager();
    manager
        .open_encrypted(&scratch.path, "s3cret", migrate_v1)
        .unwrap();
    let mut w = widget("sealed", 3);
    let id = manager.save(&mut w).unwrap();
    manager.close().unwrap();

    let header = std::fs::read(&scratch.path).unwrap();
    assert!(!header.starts_with(b"SQLite format 3\0"));

    manager
        .open_encrypted(&scratch.path, "s3cret", migrate_v1)
        .unwrap();
    assert_eq!(manager.load::<Widget>(id).unwrap(), Some(w));
}

#[cfg(feature = "sqlcipher")]
#[test]
fn test_wrong_key_fails_to_open() {
    let scratch = scratch();
    let mut manager = widget_manager();
    manager
        .open_encrypted(&scratch.path, "right", migrate_v1)
        .unwrap();
    manager.close().unwrap();

    let err = manager
        .open_encrypted(&scratch.path, "wrong", migrate_v1)
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::StorageOpen);
}

#[test]
fn test_journal_mode_follows_options() {
    let scratch = scratch();
    let options = SqliteOptions::from_toml_str("journal_mode = \"delete\"\n").unwrap();
    assert_eq!(options.journal_mode, JournalMode::Delete);
    let mut manager = SqliteManager::new(SqliteConnector::new(options));
    manager.register_managed_class::<Widget>().unwrap();
    manager.open(&scratch.path, migrate_v1).unwrap();

    let rows = manager
        .store_mut()
        .unwrap()
        .query("PRAGMA journal_mode", &[])
        .unwrap();
    assert_eq!(
        rows[0].get("journal_mode"),
        Some(&Value::Text("delete".to_string()))
    );
}

#[test]
fn test_lifecycle_operations_are_logged() {
    let capture = init_test_capture();
    let (mut manager, _scratch) = open_widget_store();
    let mut w = widget("logged", 1);
    manager.save(&mut w).unwrap();
    manager.load::<Widget>(w.object_id().unwrap()).unwrap();
    manager.close().unwrap();

    for op in ["open", "save", "load", "close"] {
        capture.assert_event_exists(op, EVENT_START);
        capture.assert_event_exists(op, EVENT_END);
    }

    let saved_id = w.object_id().unwrap().get().to_string();
    assert!(capture.count_events(|e| {
        e.op.as_deref() == Some("save")
            && e.event.as_deref() == Some(EVENT_END)
            && e.field(FIELD_OBJECT_ID) == Some(saved_id.as_str())
    }) >= 1);
    assert!(capture.count_events(|e| {
        e.op.as_deref() == Some("open")
            && e.event.as_deref() == Some(EVENT_END)
            && e.field(FIELD_SCHEMA_VERSION) == Some("1")
    }) >= 1);

    let err = manager.delete(&w).unwrap_err();
    let failures = capture.count_events(|e| {
        e.op.as_deref() == Some("delete")
            && e.event.as_deref() == Some(EVENT_END_ERROR)
            && e.field(FIELD_ERR_CODE) == Some(err.code())
    });
    assert!(failures >= 1);
}

#[test]
fn test_keys_never_reach_logs() {
    let capture = init_test_capture();
    let scratch = scratch();
    let mut manager = widget_manager();
    // Fails without SQLCipher; either outcome must keep the key out of logs
    let _ = manager.open_encrypted(&scratch.path, "do-not-log-me", migrate_v1);

    capture.assert_event_exists("open", EVENT_START);
    assert!(capture
        .events()
        .iter()
        .all(|e| e.fields.values().all(|v| !v.contains("do-not-log-me"))));
}
