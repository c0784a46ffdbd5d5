//! Integration tests for diff calculation between backends.

use parking_lot::Mutex;
use std::sync::Arc;
use treesync_core::{
    Diff, DiffAction, DiffElement, DiffSummary, ModelFlags, SyncFlags, SyncOptions, Value,
};
use treesync_testkit::prelude::*;

fn element<'a>(diff: &'a Diff, path: &[(&str, &str)]) -> &'a DiffElement {
    let (first, rest) = path.split_first().expect("path is not empty");
    let mut current = diff.get(first.0, first.1).expect("element is present");
    for (kind, name) in rest {
        current = current
            .child_diff()
            .get(kind, name)
            .expect("child element is present");
    }
    current
}

/// Checks that two diffs mirror each other with sides swapped.
fn assert_mirrored(left: &Diff, right: &Diff) {
    let left_children = left.children();
    assert_eq!(left_children.len(), right.children().len());
    for l in left_children {
        let r = right.get(l.kind(), l.name()).expect("mirrored element");
        assert_eq!(l.source_attrs(), r.dest_attrs());
        assert_eq!(l.dest_attrs(), r.source_attrs());
        assert_mirrored(l.child_diff(), r.child_diff());
    }
}

#[test]
fn self_diff_is_empty() {
    let a = backend_a();
    let diff = a.diff_from(&a, SyncFlags::NONE).unwrap();
    assert!(!diff.has_diffs());
    assert_eq!(diff.summary().changes(), 0);
    assert_eq!(diff.render(0), "(no diffs)");
    assert_eq!(diff.to_value(), Value::Map(Default::default()));
}

#[test]
fn diff_between_backends() {
    let a = backend_a();
    let b = backend_b();
    let diff = a.diff_from(&b, SyncFlags::NONE).unwrap();
    assert!(diff.has_diffs());

    // Shared sites in source order, then the ones only the destination has
    let sites: Vec<&str> = diff.group("site").iter().map(|e| e.name()).collect();
    assert_eq!(sites, ["nyc", "sfo", "atl", "rdu"]);

    assert_eq!(element(&diff, &[("site", "atl")]).action(), Some(DiffAction::Create));
    assert_eq!(element(&diff, &[("site", "rdu")]).action(), Some(DiffAction::Delete));
    assert_eq!(element(&diff, &[("site", "nyc")]).action(), None);

    let spine1 = element(&diff, &[("site", "sfo"), ("device", "sfo-spine1")]);
    assert_eq!(spine1.action(), Some(DiffAction::Update));
    let role = spine1.attrs_diffs();
    let change = role.get("role").unwrap();
    assert_eq!(change.source, Some(Value::from("leaf")));
    assert_eq!(change.dest, Some(Value::from("spine")));
    // Only attributes declared by both backends are compared
    assert_eq!(spine1.attrs_keys(), ["role"]);

    let eth0 = element(
        &diff,
        &[("site", "nyc"), ("device", "nyc-spine1"), ("interface", "eth0")],
    );
    assert_eq!(eth0.action(), Some(DiffAction::Update));
    assert_eq!(
        eth0.source_changes().get("description"),
        Some(&Value::from("Interface 0/0"))
    );

    let spine2 = element(&diff, &[("site", "sfo"), ("device", "sfo-spine2")]);
    assert_eq!(spine2.action(), None);
    assert!(spine2.has_diffs(true));
    assert!(!spine2.has_diffs(false));
    let actions: Vec<(&str, Option<DiffAction>)> = spine2
        .children()
        .iter()
        .map(|e| (e.name(), e.action()))
        .collect();
    assert_eq!(
        actions,
        [
            ("eth0", None),
            ("eth1", None),
            ("eth3", Some(DiffAction::Create)),
            ("eth2", Some(DiffAction::Delete)),
        ]
    );
}

#[test]
fn child_types_are_intersected() {
    let a = backend_a();
    let b = backend_b();
    let diff = a.diff_from(&b, SyncFlags::NONE).unwrap();

    // People exist only in A, places only in B
    let nyc = element(&diff, &[("site", "nyc")]);
    assert!(nyc.child_diff().group("place").is_empty());
    let groups: Vec<&str> = nyc.child_diff().groups().collect();
    assert_eq!(groups, ["device"]);

    // A deleted site brings every child type of the destination
    let rdu = element(&diff, &[("site", "rdu")]);
    let person = rdu.child_diff().get("person", "Glenn Matthews").unwrap();
    assert_eq!(person.action(), Some(DiffAction::Delete));
}

#[test]
fn summary_counts_the_whole_tree() {
    let a = backend_a();
    let b = backend_b();
    let summary = a.diff_from(&b, SyncFlags::NONE).unwrap().summary();

    // atl with two devices and four interfaces, plus sfo-spine2 eth3
    assert_eq!(summary.create, 8);
    // sfo-spine1 role and nyc-spine1 eth0 description
    assert_eq!(summary.update, 2);
    // rdu with two devices, four interfaces and a person, plus sfo-spine2 eth2
    assert_eq!(summary.delete, 9);
}

#[test]
fn diff_from_and_diff_to_mirror_each_other() {
    let a = backend_a();
    let b = backend_b();
    let from = a.diff_from(&b, SyncFlags::NONE).unwrap();
    let to = a.diff_to(&b, SyncFlags::NONE).unwrap();
    assert_mirrored(&from, &to);
    assert_eq!(to, b.diff_from(&a, SyncFlags::NONE).unwrap());
}

#[test]
fn skip_unmatched_src() {
    let a = backend_a();
    let extra = backend_a_with_extra_models();
    let minus = backend_a_minus_some_models();

    assert!(a.diff_from(&extra, SyncFlags::NONE).unwrap().has_diffs());
    assert!(!a
        .diff_from(&extra, SyncFlags::SKIP_UNMATCHED_SRC)
        .unwrap()
        .has_diffs());
    // Destination-only records still get deleted
    assert!(a
        .diff_from(&minus, SyncFlags::SKIP_UNMATCHED_SRC)
        .unwrap()
        .has_diffs());
}

#[test]
fn skip_unmatched_dst() {
    let a = backend_a();
    let extra = backend_a_with_extra_models();
    let minus = backend_a_minus_some_models();

    assert!(a.diff_from(&minus, SyncFlags::NONE).unwrap().has_diffs());
    assert!(!a
        .diff_from(&minus, SyncFlags::SKIP_UNMATCHED_DST)
        .unwrap()
        .has_diffs());
    // Source-only records still get created
    assert!(a
        .diff_from(&extra, SyncFlags::SKIP_UNMATCHED_DST)
        .unwrap()
        .has_diffs());
}

#[test]
fn skip_unmatched_both() {
    let a = backend_a();
    let extra = backend_a_with_extra_models();
    let minus = backend_a_minus_some_models();

    for other in [&extra, &minus] {
        assert!(!a
            .diff_from(other, SyncFlags::SKIP_UNMATCHED_BOTH)
            .unwrap()
            .has_diffs());
    }
}

#[test]
fn ignore_flag_on_source_records() {
    let a = backend_a();
    let extra = backend_a_with_extra_models();
    extra
        .get("site", "lax")
        .unwrap()
        .write()
        .insert_flags(ModelFlags::IGNORE);
    // Ignoring nyc extends to its new device
    extra
        .get("site", "nyc")
        .unwrap()
        .write()
        .insert_flags(ModelFlags::IGNORE);

    let diff = a.diff_from(&extra, SyncFlags::NONE).unwrap();
    assert!(!diff.has_diffs());
    assert!(diff.get("site", "nyc").is_none());
}

#[test]
fn ignore_flag_on_destination_records() {
    let a = backend_a();
    let minus = backend_a_minus_some_models();
    for site in ["rdu", "sfo"] {
        a.get("site", site)
            .unwrap()
            .write()
            .insert_flags(ModelFlags::IGNORE);
    }
    assert!(!a.diff_from(&minus, SyncFlags::NONE).unwrap().has_diffs());
}

#[test]
fn child_ordering_rule_reorders_siblings() {
    let a = backend_a();
    let b = backend_b();
    let options = SyncOptions::new().order_children("interface", |elements| {
        elements.sort_by(|x, y| y.name().cmp(x.name()))
    });
    let diff = a.diff_from(&b, options).unwrap();
    let spine2 = element(&diff, &[("site", "sfo"), ("device", "sfo-spine2")]);
    let names: Vec<&str> = spine2.children().iter().map(|e| e.name()).collect();
    assert_eq!(names, ["eth3", "eth2", "eth1", "eth0"]);
}

#[test]
fn default_ordering_rule_yields_to_model_rules() {
    let a = backend_a();
    let b = backend_b();
    let options = SyncOptions::new()
        .order_children_default(|elements| elements.reverse())
        .order_children("site", |_| {});
    let diff = a.diff_from(&b, options).unwrap();

    let sites: Vec<&str> = diff.group("site").iter().map(|e| e.name()).collect();
    assert_eq!(sites, ["nyc", "sfo", "atl", "rdu"]);
    let spine2 = element(&diff, &[("site", "sfo"), ("device", "sfo-spine2")]);
    let names: Vec<&str> = spine2.children().iter().map(|e| e.name()).collect();
    assert_eq!(names, ["eth3", "eth2", "eth1", "eth0"]);
}

#[test]
fn diff_complete_callback_sees_the_finished_diff() {
    let seen: Arc<Mutex<Vec<DiffSummary>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let options = SyncOptions::new().on_diff_complete(move |diff| sink.lock().push(diff.summary()));

    let mut a = backend_a();
    let b = backend_b();
    let diff = a.diff_from(&b, options.clone()).unwrap();
    assert_eq!(*seen.lock(), [diff.summary()]);

    seen.lock().clear();
    a.sync_from(&b, options.clone()).unwrap();
    assert_eq!(*seen.lock(), [diff.summary()]);

    seen.lock().clear();
    a.sync_from(&b, options).unwrap();
    let summaries = seen.lock();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].changes(), 0);
}

#[test]
fn export_and_render_show_only_changes() {
    let a = backend_a();
    let b = backend_b();
    let diff = a.diff_from(&b, SyncFlags::NONE).unwrap();

    let Value::Map(export) = diff.to_value() else {
        panic!("diff export is a map");
    };
    let Some(Value::Map(sites)) = export.get("site") else {
        panic!("sites with changes are exported");
    };
    let names: Vec<&str> = sites.keys().collect();
    assert_eq!(names, ["nyc", "sfo", "atl", "rdu"]);

    let text = diff.render(0);
    assert!(text.contains("site: atl MISSING in BackendA"));
    assert!(text.contains("site: rdu MISSING in backend-b"));
    assert!(text.contains("role    backend-b(\"leaf\")    BackendA(\"spine\")"));
    assert!(!text.contains("nyc-spine2"));
}
