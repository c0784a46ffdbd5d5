//! Applying a diff to a destination store.

use crate::diff::{AttrChange, Diff, DiffAction, DiffElement};
use crate::error::{CoreResult, CrudError};
use crate::flags::{ModelFlags, SyncFlags};
use crate::map::{Fields, OrderedMap};
use crate::model::ModelType;
use crate::options::SyncOptions;
use crate::record::RecordRef;
use crate::store::Store;
use crate::value::Value;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Result of applying one diff element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// The record was created.
    Created,
    /// The record was updated.
    Updated,
    /// The record was deleted.
    Deleted,
    /// Nothing needed to change.
    Unchanged,
    /// A lifecycle hook failed and the failure was tolerated.
    Failed,
    /// A hook reported a soft failure, or the record was missing; its
    /// children were not visited.
    Skipped,
}

impl SyncStatus {
    /// Returns the lowercase status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Deleted => "deleted",
            SyncStatus::Unchanged => "unchanged",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
        }
    }

    /// Returns true if the destination store was changed.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            SyncStatus::Created | SyncStatus::Updated | SyncStatus::Deleted
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one diff element during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementOutcome {
    /// Model name.
    pub model: String,
    /// Unique id of the record.
    pub unique_id: String,
    /// Action the diff asked for.
    pub action: Option<DiffAction>,
    /// What actually happened.
    pub status: SyncStatus,
    /// Failure or skip reason.
    pub message: Option<String>,
}

/// Per-element outcomes of a sync, in visiting order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    outcomes: Vec<ElementOutcome>,
}

impl SyncReport {
    /// Returns every outcome, in visiting order.
    pub fn outcomes(&self) -> &[ElementOutcome] {
        &self.outcomes
    }

    /// Counts outcomes with the given status.
    pub fn count(&self, status: SyncStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Returns the number of records created.
    pub fn created(&self) -> usize {
        self.count(SyncStatus::Created)
    }

    /// Returns the number of records updated.
    pub fn updated(&self) -> usize {
        self.count(SyncStatus::Updated)
    }

    /// Returns the number of records deleted.
    pub fn deleted(&self) -> usize {
        self.count(SyncStatus::Deleted)
    }

    /// Iterates over tolerated failures.
    pub fn failures(&self) -> impl Iterator<Item = &ElementOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == SyncStatus::Failed)
    }

    /// Returns true if at least one record was created, updated or deleted.
    pub fn has_changes(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_change())
    }

    fn push(
        &mut self,
        model: &str,
        unique_id: &str,
        action: Option<DiffAction>,
        status: SyncStatus,
        message: Option<String>,
    ) {
        self.outcomes.push(ElementOutcome {
            model: model.to_string(),
            unique_id: unique_id.to_string(),
            action,
            status,
            message,
        });
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} unchanged={} failed={} skipped={}",
            self.created(),
            self.updated(),
            self.deleted(),
            self.count(SyncStatus::Unchanged),
            self.count(SyncStatus::Failed),
            self.count(SyncStatus::Skipped),
        )
    }
}

/// Walks a diff and applies each element to the destination store.
pub(crate) struct Syncer<'a> {
    source: String,
    dst: &'a mut Store,
    flags: SyncFlags,
    report: SyncReport,
}

impl<'a> Syncer<'a> {
    pub(crate) fn new(source: &Store, dst: &'a mut Store, options: &SyncOptions) -> Self {
        Self {
            source: source.to_string(),
            dst,
            flags: options.flags,
            report: SyncReport::default(),
        }
    }

    pub(crate) fn perform_sync(mut self, diff: &Diff) -> CoreResult<SyncReport> {
        let span = info_span!("sync", src = %self.source, dst = %self.dst, flags = %self.flags);
        let _enter = span.enter();

        info!("Beginning sync");
        for element in diff.children() {
            self.sync_diff_element(element, None)?;
        }
        info!(report = %self.report, "Sync complete");
        Ok(self.report)
    }

    fn sync_diff_element(
        &mut self,
        element: &DiffElement,
        parent: Option<&RecordRef>,
    ) -> CoreResult<()> {
        let model = Arc::clone(self.dst.require_model(element.kind())?);
        let unique_id = model.unique_id(element.keys())?;
        let action = element.action();
        let diffs = element.attrs_diffs();

        let span = info_span!(
            "element",
            action = action.map_or("none", |a| a.as_str()),
            model = model.name(),
            unique_id = %unique_id,
            diffs = %DiffsDisplay(&diffs),
        );
        let _enter = span.enter();

        let existing = self.dst.get(&model, unique_id.as_str());
        let attrs = element.source_changes();

        let record = match self.sync_model(
            action,
            &model,
            &unique_id,
            element.keys(),
            &attrs,
            existing,
        ) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(
                    model = model.name(),
                    unique_id = %unique_id,
                    "No object resulted from sync, will not process child objects."
                );
                self.report.push(
                    model.name(),
                    &unique_id,
                    action,
                    SyncStatus::Skipped,
                    Some("no object resulted from sync".to_string()),
                );
                return Ok(());
            }
            Err(err) => {
                error!(
                    action = action.map_or("none", |a| a.as_str()),
                    model = model.name(),
                    unique_id = %unique_id,
                    status = "error",
                    "{}",
                    err
                );
                self.report.push(
                    model.name(),
                    &unique_id,
                    action,
                    SyncStatus::Failed,
                    Some(err.to_string()),
                );
                if !self.flags.contains(SyncFlags::CONTINUE_ON_FAILURE) {
                    return Err(err.into());
                }
                warn!(
                    model = model.name(),
                    unique_id = %unique_id,
                    "No object resulted from sync, will not process child objects."
                );
                return Ok(());
            }
        };

        let status = match action {
            Some(DiffAction::Create) => {
                if let Some(parent) = parent {
                    let (child_model, child_id) = record.key();
                    parent.write().add_child_id(&child_model, child_id)?;
                }
                self.dst.add(record.clone())?;
                SyncStatus::Created
            }
            Some(DiffAction::Update) => SyncStatus::Updated,
            Some(DiffAction::Delete) => {
                if let Some(parent) = parent {
                    let (child_model, child_id) = record.key();
                    parent.write().remove_child_id(&child_model, &child_id)?;
                }
                let skip_children = record
                    .read()
                    .flags()
                    .contains(ModelFlags::SKIP_CHILDREN_ON_DELETE);
                self.dst.remove(&record, skip_children)?;
                if skip_children {
                    self.report
                        .push(model.name(), &unique_id, action, SyncStatus::Deleted, None);
                    return Ok(());
                }
                SyncStatus::Deleted
            }
            None => SyncStatus::Unchanged,
        };
        self.report
            .push(model.name(), &unique_id, action, status, None);

        for child in element.children() {
            self.sync_diff_element(child, Some(&record))?;
        }
        Ok(())
    }

    /// Runs the lifecycle hook for one element.
    ///
    /// `Ok(None)` means a soft failure (or nothing to work on) and the
    /// element's children must be skipped.
    fn sync_model(
        &self,
        action: Option<DiffAction>,
        model: &Arc<ModelType>,
        unique_id: &str,
        ids: &Fields,
        attrs: &Fields,
        existing: Option<RecordRef>,
    ) -> Result<Option<RecordRef>, CrudError> {
        let Some(action) = action else {
            if self.flags.contains(SyncFlags::LOG_UNCHANGED_RECORDS) {
                debug!(status = "success", "No changes to apply; no action needed");
            }
            return Ok(existing);
        };

        debug!("Attempting model {action}");
        let result = match action {
            DiffAction::Create => {
                if existing.is_some() {
                    return Err(CrudError::NotCreated(format!(
                        "Failed to create {} {ids} - it already exists!",
                        model.name()
                    )));
                }
                model
                    .hooks()
                    .create(model, &*self.dst, ids, attrs)?
                    .map(RecordRef::new)
            }
            DiffAction::Update => {
                let record = existing.ok_or_else(|| {
                    CrudError::NotUpdated(format!(
                        "Failed to update {} {ids} - not found!",
                        model.name()
                    ))
                })?;
                let hooks = Arc::clone(record.read().model());
                let outcome = hooks.hooks().update(&mut record.write(), attrs)?;
                outcome.map(|()| record)
            }
            DiffAction::Delete => {
                let record = existing.ok_or_else(|| {
                    CrudError::NotDeleted(format!(
                        "Failed to delete {} {ids} - not found!",
                        model.name()
                    ))
                })?;
                let hooks = Arc::clone(record.read().model());
                let outcome = hooks.hooks().delete(&mut record.write())?;
                outcome.map(|()| record)
            }
        };

        match &result {
            Some(_) => info!(
                action = action.as_str(),
                model = model.name(),
                unique_id,
                status = "success",
                "{}",
                success_message(action)
            ),
            None => warn!(
                action = action.as_str(),
                model = model.name(),
                unique_id,
                status = "failure",
                "{} {action} did not return the model object.",
                model.name()
            ),
        }
        Ok(result)
    }
}

fn success_message(action: DiffAction) -> &'static str {
    match action {
        DiffAction::Create => "Created successfully",
        DiffAction::Update => "Updated successfully",
        DiffAction::Delete => "Deleted successfully",
    }
}

/// Renders attribute changes as `attr: source -> dest` pairs for logging.
struct DiffsDisplay<'a>(&'a OrderedMap<AttrChange>);

impl fmt::Display for DiffsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (attr, change)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let side = |value: &Option<Value>| {
                value.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
            };
            write!(f, "{attr}: {} -> {}", side(&change.dest), side(&change.source))?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, HookResult};
    use crate::fields;
    use crate::model::{InMemoryHooks, ModelHooks};
    use crate::record::Record;
    use crate::value::Value;

    fn device(hooks: impl ModelHooks + 'static) -> Arc<ModelType> {
        ModelType::builder("device")
            .identifiers(["name"])
            .attributes(["role"])
            .hooks(hooks)
            .build()
            .unwrap()
    }

    fn store(model: &Arc<ModelType>, name: &str, devices: &[(&str, &str)]) -> Store {
        let mut store = Store::builder("backend")
            .name(name)
            .top_level(["device"])
            .model(Arc::clone(model))
            .build()
            .unwrap();
        for (device, role) in devices {
            store
                .add(Record::new(model, fields! { "name" => *device, "role" => *role }).unwrap())
                .unwrap();
        }
        store
    }

    fn sync(src: &Store, dst: &mut Store, flags: SyncFlags) -> CoreResult<SyncReport> {
        let options = SyncOptions::from(flags);
        let diff = dst.diff_from(src, options.clone())?;
        Syncer::new(src, dst, &options).perform_sync(&diff)
    }

    #[test]
    fn applies_create_update_delete() {
        let model = device(InMemoryHooks);
        let src = store(&model, "a", &[("spine1", "spine"), ("leaf1", "leaf")]);
        let mut dst = store(&model, "b", &[("spine1", "leaf"), ("old", "leaf")]);

        let report = sync(&src, &mut dst, SyncFlags::NONE).unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.deleted(), 1);
        assert!(report.has_changes());
        assert_eq!(
            report.to_string(),
            "created=1 updated=1 deleted=1 unchanged=0 failed=0 skipped=0"
        );

        assert!(dst.get("device", "old").is_none());
        let spine = dst.get("device", "spine1").unwrap();
        assert_eq!(spine.read().get("role"), Some(&Value::from("spine")));
        let leaf = dst.get("device", "leaf1").unwrap();
        assert_eq!(leaf.read().store_id(), Some(dst.id()));

        let again = sync(&src, &mut dst, SyncFlags::NONE).unwrap();
        assert!(!again.has_changes());
        assert_eq!(again.count(SyncStatus::Unchanged), 2);
    }

    struct RefuseUpdates;

    impl ModelHooks for RefuseUpdates {
        fn update(&self, _record: &mut Record, _attrs: &Fields) -> HookResult<()> {
            Err(CrudError::NotUpdated("read-only".into()))
        }

        fn delete(&self, _record: &mut Record) -> HookResult<()> {
            Ok(None)
        }
    }

    #[test]
    fn failure_aborts_without_continue_flag() {
        let model = device(RefuseUpdates);
        let src = store(&model, "a", &[("spine1", "spine")]);
        let mut dst = store(&model, "b", &[("spine1", "leaf")]);

        let err = sync(&src, &mut dst, SyncFlags::NONE).unwrap_err();
        assert_eq!(err, CoreError::Crud(CrudError::NotUpdated("read-only".into())));
    }

    #[test]
    fn failure_is_recorded_with_continue_flag() {
        let model = device(RefuseUpdates);
        let src = store(&model, "a", &[("spine1", "spine"), ("leaf1", "leaf")]);
        let mut dst = store(&model, "b", &[("spine1", "leaf"), ("old", "leaf")]);

        let report = sync(&src, &mut dst, SyncFlags::CONTINUE_ON_FAILURE).unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.count(SyncStatus::Failed), 1);
        assert_eq!(report.count(SyncStatus::Skipped), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.unique_id, "spine1");
        assert_eq!(failure.action, Some(DiffAction::Update));
        assert_eq!(
            failure.message.as_deref(),
            Some("object not updated: read-only")
        );

        // The soft-failed delete leaves the record in place
        assert!(dst.get("device", "old").is_some());
    }

    #[test]
    fn unknown_model_in_destination_is_an_error() {
        let model = device(InMemoryHooks);
        let src = store(&model, "a", &[("spine1", "spine")]);
        let mut dst = Store::builder("backend").build().unwrap();
        let mut diff = Diff::new();
        let mut element = DiffElement::new("device", "spine1", fields! { "name" => "spine1" });
        element.add_attrs(Some(fields! { "role" => "spine" }), None);
        diff.add(element).unwrap();

        let err = Syncer::new(&src, &mut dst, &SyncOptions::new())
            .perform_sync(&diff)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownModel { .. }));
    }

    #[test]
    fn status_names() {
        assert_eq!(SyncStatus::Created.to_string(), "created");
        assert!(SyncStatus::Deleted.is_change());
        assert!(!SyncStatus::Skipped.is_change());
    }
}
