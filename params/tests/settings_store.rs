//! End-to-end behavior of the settings store against a real backing file.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use satkit_params::{FileLock, LockMode, Params, ParamsError, SETTINGS_FILENAME};

fn fresh_store(dir: &tempfile::TempDir) -> Params {
    Params::create(Some(dir.path())).unwrap()
}

#[test]
fn create_writes_defaults_and_empty_data_dirs() {
    let dir = tempfile::TempDir::new().unwrap();
    let params = fresh_store(&dir);

    assert_eq!(params.get("clean_level").unwrap(), &json!("clean"));
    assert_eq!(params.get("file_timeout").unwrap(), &json!(10));
    assert_eq!(params.get("update_files").unwrap(), &json!(true));
    assert_eq!(params.get("user_modules").unwrap(), &json!({}));
    assert_eq!(params.get("data_dirs").unwrap(), &json!([]));
    assert_eq!(params.file_path(), dir.path().join(SETTINGS_FILENAME));
}

#[test]
fn set_round_trips_through_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);
    params.set("custom_key", json!([1, 2, 3])).unwrap();
    params.set("clean_level", json!("dirty")).unwrap();

    let reopened = Params::open_at(dir.path()).unwrap();
    assert_eq!(reopened.get("custom_key").unwrap(), &json!([1, 2, 3]));
    assert_eq!(reopened.get("clean_level").unwrap(), &json!("dirty"));
}

#[test]
fn get_unknown_key_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let params = fresh_store(&dir);
    let err = params.get("never_set").unwrap_err();
    assert!(matches!(err, ParamsError::KeyNotFound { key } if key == "never_set"));
}

#[test]
fn data_dirs_batch_with_one_bad_path_changes_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);
    params
        .set("data_dirs", json!([data_dir.path().to_string_lossy()]))
        .unwrap();
    let before = params.get("data_dirs").unwrap().clone();

    let missing = data_dir.path().join("nope");
    let err = params
        .set(
            "data_dirs",
            json!([data_dir.path().to_string_lossy(), missing.to_string_lossy()]),
        )
        .unwrap_err();
    assert!(matches!(err, ParamsError::PathNotFound { .. }));

    // Neither memory nor disk moved.
    assert_eq!(params.get("data_dirs").unwrap(), &before);
    let reopened = Params::open_at(dir.path()).unwrap();
    assert_eq!(reopened.get("data_dirs").unwrap(), &before);
}

#[test]
fn data_dirs_valid_batch_replaces_the_full_array() {
    let dir = tempfile::TempDir::new().unwrap();
    let a = tempfile::TempDir::new().unwrap();
    let b = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);

    params
        .set("data_dirs", json!(a.path().to_string_lossy()))
        .unwrap();
    assert_eq!(params.data_dirs().unwrap(), vec![a.path().to_path_buf()]);

    params
        .set(
            "data_dirs",
            json!([b.path().to_string_lossy(), a.path().to_string_lossy()]),
        )
        .unwrap();
    assert_eq!(
        params.data_dirs().unwrap(),
        vec![b.path().to_path_buf(), a.path().to_path_buf()]
    );
}

#[test]
fn data_dirs_rejects_non_string_payloads() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);
    let err = params.set("data_dirs", json!(42)).unwrap_err();
    assert!(matches!(err, ParamsError::InvalidValue { .. }));
    let err = params.set("data_dirs", json!(["/tmp", 42])).unwrap_err();
    assert!(matches!(err, ParamsError::InvalidValue { .. }));
}

#[test]
fn restore_defaults_leaves_user_and_no_default_keys_alone() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);

    params.set("user_key", json!(42)).unwrap();
    params
        .set_data_dirs(&[data_dir.path().to_string_lossy()])
        .unwrap();
    params.set("clean_level", json!("none")).unwrap();

    params.restore_defaults().unwrap();

    assert_eq!(params.get("user_key").unwrap(), &json!(42));
    assert_eq!(params.data_dirs().unwrap(), vec![data_dir.path().to_path_buf()]);
    assert_eq!(params.get("clean_level").unwrap(), &json!("clean"));
    assert_eq!(params.get("file_timeout").unwrap(), &json!(10));
}

#[test]
fn clear_and_restart_drops_everything() {
    let dir = tempfile::TempDir::new().unwrap();
    let data_dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);

    params.set("user_key", json!("kept?")).unwrap();
    params
        .set_data_dirs(&[data_dir.path().to_string_lossy()])
        .unwrap();

    params.clear_and_restart().unwrap();

    assert_eq!(params.get("clean_level").unwrap(), &json!("clean"));
    assert_eq!(params.get("data_dirs").unwrap(), &json!([]));
    assert!(matches!(
        params.get("user_key").unwrap_err(),
        ParamsError::KeyNotFound { .. }
    ));
}

#[test]
fn user_modules_is_never_settable() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);

    let err = params.set("user_modules", json!({"mod": "spec"})).unwrap_err();
    assert!(matches!(err, ParamsError::ProtectedKeyWrite));
    assert_eq!(params.get("user_modules").unwrap(), &json!({}));

    // Still refused after other state changes.
    params.set("clean_level", json!("dusty")).unwrap();
    let err = params.set("user_modules", json!(null)).unwrap_err();
    assert!(matches!(err, ParamsError::ProtectedKeyWrite));
}

#[test]
fn registry_path_can_rewrite_user_modules() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);

    params
        .replace_user_modules(json!({"platform_name": "my.module"}))
        .unwrap();
    let reopened = Params::open_at(dir.path()).unwrap();
    assert_eq!(
        reopened.get("user_modules").unwrap(),
        &json!({"platform_name": "my.module"})
    );
}

#[test]
fn open_at_missing_directory_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("not_here");
    let err = Params::open_at(&missing).unwrap_err();
    assert!(matches!(err, ParamsError::PathNotFound { .. }));
}

#[test]
fn open_at_directory_without_settings_file_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = Params::open_at(dir.path()).unwrap_err();
    match err {
        ParamsError::SettingsFileNotLocated { searched, .. } => {
            assert_eq!(searched, vec![dir.path().join(SETTINGS_FILENAME)]);
        }
        other => panic!("expected SettingsFileNotLocated, got {other:?}"),
    }
}

#[test]
fn corrupt_file_is_reported_as_corrupt() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join(SETTINGS_FILENAME), "not json at all").unwrap();
    let err = Params::open_at(dir.path()).unwrap_err();
    assert!(matches!(err, ParamsError::CorruptStore { .. }));

    // Valid JSON of the wrong shape is corruption too.
    std::fs::write(dir.path().join(SETTINGS_FILENAME), "[1, 2, 3]").unwrap();
    let err = Params::open_at(dir.path()).unwrap_err();
    match err {
        ParamsError::CorruptStore { reason, .. } => assert!(reason.contains("array")),
        other => panic!("expected CorruptStore, got {other:?}"),
    }
}

#[test]
fn lock_timeout_leaves_memory_and_file_as_last_written() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut params = fresh_store(&dir);
    params.set("file_timeout", json!(0)).unwrap();
    params.set("marker", json!("before")).unwrap();

    let held = FileLock::acquire(
        params.file_path(),
        LockMode::Exclusive,
        Duration::from_secs(1),
    )
    .unwrap();

    let err = params.set("marker", json!("after")).unwrap_err();
    assert!(matches!(err, ParamsError::LockTimeout { .. }));
    // Rolled back, not half-applied.
    assert_eq!(params.get("marker").unwrap(), &json!("before"));

    drop(held);
    let reopened = Params::open_at(dir.path()).unwrap();
    assert_eq!(reopened.get("marker").unwrap(), &json!("before"));
}

#[test]
fn concurrent_writers_never_corrupt_the_file() {
    let dir = tempfile::TempDir::new().unwrap();
    fresh_store(&dir);
    let location: PathBuf = dir.path().to_path_buf();

    let writers: Vec<_> = (0..2)
        .map(|writer| {
            let location = location.clone();
            std::thread::spawn(move || {
                let mut params = Params::open_at(&location).unwrap();
                for round in 0..20 {
                    params
                        .set(&format!("writer_{writer}"), json!(round))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    // The file must be a valid JSON object reflecting complete writes only.
    let contents = std::fs::read_to_string(location.join(SETTINGS_FILENAME)).unwrap();
    let parsed: Value = serde_json::from_str(&contents).unwrap();
    let object = parsed.as_object().unwrap();
    assert_eq!(object["clean_level"], json!("clean"));
    let last_writes: Vec<_> = ["writer_0", "writer_1"]
        .iter()
        .filter_map(|key| object.get(*key))
        .collect();
    assert!(!last_writes.is_empty());
    for value in last_writes {
        assert_eq!(value, &json!(19));
    }
}
