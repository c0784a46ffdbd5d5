//! Integration tests for syncing one backend into another.

use treesync_core::{
    CoreError, CrudError, DiffAction, ModelFlags, Store, SyncFlags, SyncOptions, SyncStatus,
    Value,
};
use treesync_testkit::prelude::*;

fn site_names(store: &Store) -> Vec<String> {
    store
        .get_all("site")
        .iter()
        .map(|site| site.read().unique_id())
        .collect()
}

fn device_ids(store: &Store, site: &str) -> Vec<String> {
    store
        .get("site", site)
        .map(|site| site.read().child_ids("device").to_vec())
        .unwrap_or_default()
}

#[test]
fn sync_from_brings_destination_in_line() {
    let mut a = backend_a();
    let b = backend_b();

    let report = a.sync_from(&b, SyncFlags::NONE).unwrap();
    assert_eq!(report.created(), 8);
    assert_eq!(report.updated(), 2);
    assert_eq!(report.deleted(), 9);
    assert_eq!(report.failures().count(), 0);

    // Only the destination adapter hears about the sync
    assert_eq!(a.sync_completions(), 1);
    assert_eq!(b.sync_completions(), 0);

    assert_eq!(site_names(&a), ["nyc", "sfo", "atl"]);
    assert!(a.get("site", "rdu").is_none());
    assert!(a.get("device", "rdu-spine1").is_none());
    assert!(a.get("person", "Glenn Matthews").is_none());

    let spine = a.get("device", "sfo-spine1").unwrap();
    assert_eq!(spine.read().get("role"), Some(&Value::from("leaf")));
    let eth0 = a.get("interface", "nyc-spine1__eth0").unwrap();
    assert_eq!(eth0.read().get("description"), Some(&Value::from("Interface 0/0")));

    assert_eq!(device_ids(&a, "atl"), ["atl-spine1", "atl-spine2"]);
    let atl_spine1 = a.get("device", "atl-spine1").unwrap();
    assert_eq!(
        atl_spine1.read().child_ids("interface"),
        ["atl-spine1__eth0".to_string(), "atl-spine1__eth1".to_string()]
    );
    // Created records use the destination's own schema
    assert_eq!(atl_spine1.read().get("tag"), Some(&Value::from("")));
    assert!(atl_spine1.read().get("vlans").is_none());
    assert_eq!(atl_spine1.read().store_id(), Some(a.id()));

    let sfo_spine2 = a.get("device", "sfo-spine2").unwrap();
    assert_eq!(
        sfo_spine2.read().child_ids("interface"),
        [
            "sfo-spine2__eth0".to_string(),
            "sfo-spine2__eth1".to_string(),
            "sfo-spine2__eth3".to_string()
        ]
    );
    assert!(a.get("interface", "sfo-spine2__eth2").is_none());

    assert!(!a.diff_from(&b, SyncFlags::NONE).unwrap().has_diffs());
}

#[test]
fn second_sync_changes_nothing() {
    let mut a = backend_a();
    let b = backend_b();
    a.sync_from(&b, SyncFlags::NONE).unwrap();

    let again = a.sync_from(&b, SyncFlags::NONE).unwrap();
    assert!(!again.has_changes());
    assert_eq!(again.count(SyncStatus::Unchanged), again.outcomes().len());
    assert_eq!(a.sync_completions(), 1);
}

#[test]
fn sync_to_updates_the_target() {
    let extra = backend_a_with_extra_models();
    let mut a = backend_a();
    extra.sync_to(&mut a, SyncFlags::NONE).unwrap();

    assert_eq!(site_names(&a), ["nyc", "sfo", "rdu", "lax"]);
    assert_eq!(device_ids(&a, "nyc"), ["nyc-spine1", "nyc-spine2", "nyc-spine3"]);
    assert_eq!(a.sync_completions(), 1);
    assert_eq!(extra.sync_completions(), 0);
    assert!(!a.diff_from(&extra, SyncFlags::NONE).unwrap().has_diffs());
}

#[test]
fn missing_model_in_destination_aborts() {
    // A site created in B brings A's people along, which B has no model for
    let a = backend_a();
    let mut b = backend_b();
    let err = a.sync_to(&mut b, SyncFlags::NONE).unwrap_err();
    assert!(matches!(err, CoreError::UnknownModel { .. }));
    assert!(err.is_configuration());
}

#[test]
fn sync_with_skip_unmatched_src() {
    let mut a = backend_a();
    let extra = backend_a_with_extra_models();
    a.sync_from(&extra, SyncFlags::SKIP_UNMATCHED_SRC).unwrap();
    // New records are not created
    assert!(a.get("site", "lax").is_none());
    assert!(a.get("device", "nyc-spine3").is_none());
    assert!(!device_ids(&a, "nyc").contains(&"nyc-spine3".to_string()));

    let minus = backend_a_minus_some_models();
    a.sync_from(&minus, SyncFlags::SKIP_UNMATCHED_SRC).unwrap();
    // Missing records are still deleted
    assert!(a.get("site", "rdu").is_none());
    assert!(a.get("device", "sfo-spine2").is_none());
    assert!(!device_ids(&a, "sfo").contains(&"sfo-spine2".to_string()));
}

#[test]
fn sync_with_skip_unmatched_dst() {
    let mut a = backend_a();
    let minus = backend_a_minus_some_models();
    a.sync_from(&minus, SyncFlags::SKIP_UNMATCHED_DST).unwrap();
    // Missing records are not deleted
    assert!(a.get("site", "rdu").is_some());
    assert!(a.get("device", "sfo-spine2").is_some());
    assert!(device_ids(&a, "sfo").contains(&"sfo-spine2".to_string()));

    let extra = backend_a_with_extra_models();
    a.sync_from(&extra, SyncFlags::SKIP_UNMATCHED_DST).unwrap();
    // New records are still created
    assert!(a.get("site", "lax").is_some());
    assert!(a.get("device", "nyc-spine3").is_some());
    assert!(device_ids(&a, "nyc").contains(&"nyc-spine3".to_string()));
}

#[test]
fn skip_children_on_delete_bypasses_child_hooks() {
    let mut store = backend_a_with_undeletable_interface();
    let a = backend_a();
    assert!(store.diff_from(&a, SyncFlags::NONE).unwrap().has_diffs());

    let report = store.sync_from(&a, SyncFlags::NONE).unwrap();
    assert_eq!(report.deleted(), 1);
    assert!(report
        .outcomes()
        .iter()
        .all(|outcome| outcome.unique_id != "nyc-spine3__eth0"));

    assert!(store.get("device", "nyc-spine3").is_none());
    assert!(store.get("interface", "nyc-spine3__eth0").is_none());
    assert!(!device_ids(&store, "nyc").contains(&"nyc-spine3".to_string()));
    assert!(!store.diff_from(&a, SyncFlags::NONE).unwrap().has_diffs());
}

#[test]
fn hook_failures_propagate_by_default() {
    let mut store = backend_a_with_undeletable_interface();
    let a = backend_a();
    let nyc_spine3 = store.get("device", "nyc-spine3").unwrap();
    nyc_spine3.write().set_flags(ModelFlags::NONE);

    let err = store.sync_from(&a, SyncFlags::NONE).unwrap_err();
    assert!(err.is_crud());
    assert!(matches!(err, CoreError::Crud(CrudError::Other(_))));
    // The device went away before its interface refused to
    assert!(store.get("device", "nyc-spine3").is_none());
    assert!(store.get("interface", "nyc-spine3__eth0").is_some());
    assert_eq!(store.sync_completions(), 0);
}

#[test]
fn continue_on_failure_retries_until_converged() {
    let mut store = error_prone_backend_a();
    let b = backend_b();
    let capture = LogCapture::new();

    let first = capture.capture(|| store.sync_from(&b, SyncFlags::CONTINUE_ON_FAILURE));
    let first = first.unwrap();
    assert!(first.failures().count() > 0);
    assert!(store.diff_from(&b, SyncFlags::NONE).unwrap().has_diffs());

    assert!(capture.has("Created successfully", Some("success")));
    assert!(capture.has("Updated successfully", Some("success")));
    assert!(capture.has("Deleted successfully", Some("success")));
    let errors = capture.errors();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|event| event.field("status") == Some("error")));
    assert!(errors
        .iter()
        .any(|event| event.message.contains("Random creation error!")));

    let mut converged = false;
    for _ in 0..10 {
        store.sync_from(&b, SyncFlags::CONTINUE_ON_FAILURE).unwrap();
        if !store.diff_from(&b, SyncFlags::NONE).unwrap().has_diffs() {
            converged = true;
            break;
        }
    }
    assert!(converged);

    capture.clear();
    let last = capture.capture(|| store.sync_from(&b, SyncFlags::CONTINUE_ON_FAILURE));
    assert!(!last.unwrap().has_changes());
    assert!(capture.errors().is_empty());
}

#[test]
fn sync_events_name_the_record() {
    let mut store = error_prone_backend_a();
    let b = backend_b();
    let capture = LogCapture::new();

    let report = capture
        .capture_at("warn", || store.sync_from(&b, SyncFlags::CONTINUE_ON_FAILURE))
        .unwrap();
    let errors = capture.errors();
    assert_eq!(errors.len(), report.failures().count());
    for (event, failure) in errors.iter().zip(report.failures()) {
        assert_eq!(event.field("model"), Some(failure.model.as_str()));
        assert_eq!(event.field("unique_id"), Some(failure.unique_id.as_str()));
    }
    assert!(capture.events().iter().all(|event| event.level <= tracing::Level::WARN));

    capture.clear();
    let mut a = backend_a();
    capture.capture(|| a.sync_from(&b, SyncFlags::NONE)).unwrap();
    let successes: Vec<_> = capture
        .events()
        .into_iter()
        .filter(|event| event.field("status") == Some("success"))
        .collect();
    assert!(!successes.is_empty());
    assert!(successes
        .iter()
        .all(|event| event.field("unique_id").is_some() && event.field("src").is_some()));
}

#[test]
fn failed_parent_skips_its_children() {
    let mut store = error_prone_backend_a();
    let b = backend_b();
    let report = store.sync_from(&b, SyncFlags::CONTINUE_ON_FAILURE).unwrap();

    for failure in report.failures() {
        if failure.action == Some(DiffAction::Create) && failure.model == "device" {
            let prefix = format!("{}__", failure.unique_id);
            assert!(report
                .outcomes()
                .iter()
                .all(|outcome| !outcome.unique_id.starts_with(&prefix)));
        }
    }
}

#[test]
fn unchanged_records_log_only_when_asked() {
    let mut a = backend_a();
    let same = backend_a();

    let capture = LogCapture::new();
    capture.capture(|| a.sync_from(&same, SyncFlags::NONE)).unwrap();
    assert!(!capture.has("No changes to apply; no action needed", None));
    assert!(capture.has("Beginning sync", None));
    assert!(capture.has("Sync complete", None));

    capture.clear();
    let options = SyncOptions::new().with_flags(SyncFlags::LOG_UNCHANGED_RECORDS);
    capture.capture(|| a.sync_from(&same, options)).unwrap();
    assert!(capture.has("No changes to apply; no action needed", Some("success")));
}

#[test]
fn diff_logs_skipped_records() {
    let a = backend_a();
    let extra = backend_a_with_extra_models();
    let capture = LogCapture::new();
    capture
        .capture(|| a.diff_from(&extra, SyncFlags::SKIP_UNMATCHED_SRC))
        .unwrap();

    assert!(capture.has("Beginning diff calculation", None));
    assert!(capture.has("Diff calculation complete", None));
    let skipped: Vec<String> = capture
        .events()
        .into_iter()
        .filter(|event| event.message == "Skipping unmatched source object")
        .filter_map(|event| event.field("unique_id").map(str::to_string))
        .collect();
    // Children are visited before the next sibling
    assert_eq!(skipped, ["nyc-spine3", "lax"]);
}
