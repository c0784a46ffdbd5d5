//! Diff calculation between two stores.

use crate::diff::{ChildOrdering, Diff, DiffElement};
use crate::error::{CoreError, CoreResult};
use crate::flags::{ModelFlags, SyncFlags};
use crate::map::{Fields, OrderedMap};
use crate::options::{DiffCallback, SyncOptions};
use crate::record::RecordRef;
use crate::store::Store;
use std::sync::Arc;
use tracing::{debug, info, info_span};

/// Point-in-time copy of what the differ needs from one record.
///
/// Taken under a short read lock so no lock is held while recursing.
struct Snapshot {
    model: String,
    unique_id: String,
    shortname: String,
    keys: Fields,
    attrs: Fields,
    children: OrderedMap<Vec<String>>,
    flags: ModelFlags,
}

impl Snapshot {
    fn of(record: &RecordRef) -> Self {
        let record = record.read();
        Self {
            model: record.model_name().to_string(),
            unique_id: record.unique_id(),
            shortname: record.shortname(),
            keys: record.identifiers(),
            attrs: record.attrs(),
            children: record.children().clone(),
            flags: record.flags(),
        }
    }

    fn child_ids(&self, child_model: &str) -> &[String] {
        self.children
            .get(child_model)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Walks two stores in parallel and builds the [`Diff`] between them.
pub(crate) struct Differ<'a> {
    src: &'a Store,
    dst: &'a Store,
    flags: SyncFlags,
    ordering: Arc<ChildOrdering>,
    on_complete: Option<DiffCallback>,
}

impl<'a> Differ<'a> {
    pub(crate) fn new(src: &'a Store, dst: &'a Store, options: &SyncOptions) -> Self {
        Self {
            src,
            dst,
            flags: options.flags,
            ordering: Arc::clone(&options.ordering),
            on_complete: options.on_diff_complete.clone(),
        }
    }

    /// Compares the top-level models both stores share, in destination order.
    pub(crate) fn calculate_diffs(&self) -> CoreResult<Diff> {
        let span = info_span!("diff", src = %self.src, dst = %self.dst, flags = %self.flags);
        let _enter = span.enter();

        info!("Beginning diff calculation");
        let mut diff = Diff::with_ordering(Arc::clone(&self.ordering));
        let shared = self
            .dst
            .top_level()
            .iter()
            .filter(|model| self.src.top_level().contains(model));
        for model in shared {
            let elements = self.diff_object_list(self.src.get_all(model), self.dst.get_all(model))?;
            for element in elements {
                diff.add(element)?;
            }
        }
        info!(summary = %diff.summary(), "Diff calculation complete");
        if let Some(callback) = &self.on_complete {
            callback(&diff);
        }
        Ok(diff)
    }

    fn diff_object_list(
        &self,
        src: Vec<RecordRef>,
        dst: Vec<RecordRef>,
    ) -> CoreResult<Vec<DiffElement>> {
        let src: OrderedMap<Snapshot> = src
            .iter()
            .map(Snapshot::of)
            .map(|s| (s.unique_id.clone(), s))
            .collect();
        let dst: OrderedMap<Snapshot> = dst
            .iter()
            .map(Snapshot::of)
            .map(|s| (s.unique_id.clone(), s))
            .collect();

        // Source order first, then whatever only the destination holds
        let mut pairs: Vec<(Option<&Snapshot>, Option<&Snapshot>)> = src
            .iter()
            .map(|(uid, s)| (Some(s), dst.get(uid)))
            .collect();
        pairs.extend(
            dst.iter()
                .filter(|(uid, _)| !src.contains_key(uid))
                .map(|(_, d)| (None, Some(d))),
        );

        for pair in &pairs {
            if let (Some(s), Some(d)) = pair {
                validate_pair(s, d)?;
            }
        }

        let mut elements = Vec::new();
        for (s, d) in pairs {
            if let Some(element) = self.diff_object_pair(s, d)? {
                elements.push(element);
            }
        }
        Ok(elements)
    }

    fn diff_object_pair(
        &self,
        src: Option<&Snapshot>,
        dst: Option<&Snapshot>,
    ) -> CoreResult<Option<DiffElement>> {
        let Some(base) = src.or(dst) else {
            return Ok(None);
        };
        let (model, unique_id) = (base.model.as_str(), base.unique_id.as_str());

        if self.flags.contains(SyncFlags::SKIP_UNMATCHED_SRC) && dst.is_none() {
            debug!(model, unique_id, "Skipping unmatched source object");
            return Ok(None);
        }
        if self.flags.contains(SyncFlags::SKIP_UNMATCHED_DST) && src.is_none() {
            debug!(model, unique_id, "Skipping unmatched dest object");
            return Ok(None);
        }
        if src.is_some_and(|s| s.flags.contains(ModelFlags::IGNORE)) {
            debug!(model, unique_id, "Skipping due to IGNORE flag on source object");
            return Ok(None);
        }
        if dst.is_some_and(|d| d.flags.contains(ModelFlags::IGNORE)) {
            debug!(model, unique_id, "Skipping due to IGNORE flag on dest object");
            return Ok(None);
        }

        let mut element = DiffElement::new(model, base.shortname.as_str(), base.keys.clone())
            .with_labels(self.src.name(), self.dst.name())
            .with_ordering(Arc::clone(&self.ordering));
        element.add_attrs(src.map(|s| s.attrs.clone()), dst.map(|d| d.attrs.clone()));

        self.diff_child_objects(&mut element, src, dst)?;
        Ok(Some(element))
    }

    fn diff_child_objects(
        &self,
        element: &mut DiffElement,
        src: Option<&Snapshot>,
        dst: Option<&Snapshot>,
    ) -> CoreResult<()> {
        let child_models: Vec<&str> = match (src, dst) {
            (Some(s), Some(d)) => s
                .children
                .keys()
                .filter(|child| d.children.contains_key(child))
                .collect(),
            (Some(s), None) => s.children.keys().collect(),
            (None, Some(d)) => d.children.keys().collect(),
            (None, None) => Vec::new(),
        };

        for child_model in child_models {
            let src_children = src.map_or_else(Vec::new, |s| {
                self.src.get_by_uids(s.child_ids(child_model), child_model)
            });
            let dst_children = dst.map_or_else(Vec::new, |d| {
                self.dst.get_by_uids(d.child_ids(child_model), child_model)
            });
            for child in self.diff_object_list(src_children, dst_children)? {
                element.add_child(child)?;
            }
        }
        Ok(())
    }
}

fn validate_pair(src: &Snapshot, dst: &Snapshot) -> CoreResult<()> {
    if src.model != dst.model {
        return Err(CoreError::TypeMismatch {
            source_type: src.model.clone(),
            dest_type: dst.model.clone(),
        });
    }
    if src.shortname != dst.shortname {
        return Err(CoreError::ShortnameMismatch {
            source_name: src.shortname.clone(),
            dest_name: dst.shortname.clone(),
        });
    }
    if src.keys != dst.keys {
        return Err(CoreError::KeysMismatch {
            source_keys: src.keys.to_string(),
            dest_keys: dst.keys.to_string(),
        });
    }
    Ok(())
}
