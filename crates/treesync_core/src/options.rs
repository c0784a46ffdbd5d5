//! Options shared by diff and sync calls.

use crate::diff::{ChildOrdering, Diff, DiffElement};
use crate::flags::SyncFlags;
use std::fmt;
use std::sync::Arc;

/// Callback run with each finished diff.
pub type DiffCallback = Arc<dyn Fn(&Diff) + Send + Sync>;

/// Flags, child ordering and an optional completion callback for one diff
/// or sync call.
///
/// Anything that converts into `SyncOptions` can be passed to the store
/// entry points, so plain [`SyncFlags`] work where no ordering is needed:
///
/// ```
/// use treesync_core::{SyncFlags, SyncOptions};
///
/// let options = SyncOptions::new()
///     .with_flags(SyncFlags::CONTINUE_ON_FAILURE)
///     .order_children("site", |sites| sites.sort_by_key(|s| s.name().to_string()));
/// assert!(options.flags.contains(SyncFlags::CONTINUE_ON_FAILURE));
/// ```
#[derive(Clone, Default)]
pub struct SyncOptions {
    /// Behavioral flags.
    pub flags: SyncFlags,
    /// Child visiting order per model.
    pub ordering: Arc<ChildOrdering>,
    /// Called once the top-level diff has been calculated, before any
    /// sync work starts.
    pub on_diff_complete: Option<DiffCallback>,
}

impl SyncOptions {
    /// Creates options with no flags and insertion ordering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: SyncFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replaces the ordering rules.
    #[must_use]
    pub fn with_ordering(mut self, ordering: ChildOrdering) -> Self {
        self.ordering = Arc::new(ordering);
        self
    }

    /// Adds an ordering rule for elements of `kind`.
    #[must_use]
    pub fn order_children(
        mut self,
        kind: impl Into<String>,
        rule: impl Fn(&mut Vec<&DiffElement>) + Send + Sync + 'static,
    ) -> Self {
        let ordering = ChildOrdering::clone(&self.ordering);
        self.ordering = Arc::new(ordering.with_rule(kind, rule));
        self
    }

    /// Sets the ordering rule for models without one of their own.
    #[must_use]
    pub fn order_children_default(
        mut self,
        rule: impl Fn(&mut Vec<&DiffElement>) + Send + Sync + 'static,
    ) -> Self {
        let ordering = ChildOrdering::clone(&self.ordering);
        self.ordering = Arc::new(ordering.with_default_rule(rule));
        self
    }

    /// Sets the callback run with each finished diff.
    #[must_use]
    pub fn on_diff_complete(mut self, callback: impl Fn(&Diff) + Send + Sync + 'static) -> Self {
        self.on_diff_complete = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("flags", &self.flags)
            .field("ordering", &self.ordering)
            .field("on_diff_complete", &self.on_diff_complete.is_some())
            .finish()
    }
}

impl From<SyncFlags> for SyncOptions {
    fn from(flags: SyncFlags) -> Self {
        Self::new().with_flags(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flags() {
        let options: SyncOptions = SyncFlags::SKIP_UNMATCHED_DST.into();
        assert_eq!(options.flags, SyncFlags::SKIP_UNMATCHED_DST);
        assert!(options.ordering.is_empty());
    }

    #[test]
    fn order_children_accumulates_rules() {
        let options = SyncOptions::new()
            .order_children("site", |_| {})
            .order_children("device", |v| v.reverse());
        assert!(options.ordering.rule("site").is_some());
        assert!(options.ordering.rule("device").is_some());
        assert!(options.ordering.rule("interface").is_none());
        assert_eq!(options.flags, SyncFlags::NONE);
    }

    #[test]
    fn default_rule_and_callback_are_kept() {
        let options = SyncOptions::new()
            .order_children("site", |_| {})
            .order_children_default(|v| v.reverse())
            .on_diff_complete(|_| {});
        assert!(options.ordering.rule("site").is_some());
        assert!(options.ordering.default_rule().is_some());
        assert!(options.on_diff_complete.is_some());
        assert!(format!("{options:?}").contains("on_diff_complete: true"));

        let plain = SyncOptions::from(SyncFlags::NONE);
        assert!(plain.on_diff_complete.is_none());
    }
}
