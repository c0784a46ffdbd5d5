//! Diff trees.
//!
//! A [`Diff`] groups [`DiffElement`]s by model name, in the order groups
//! first appear, and indexes each group by element name. Every element owns
//! a nested `Diff` for its children, so a whole store comparison is a tree
//! mirroring the record hierarchy.

mod element;

pub use element::{AttrChange, DiffAction, DiffElement};

use crate::error::{CoreError, CoreResult};
use crate::map::{Fields, OrderedMap};
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reordering applied to the elements of one group.
pub type OrderRule = Arc<dyn Fn(&mut Vec<&DiffElement>) + Send + Sync>;

/// Per-model rules for the order in which child elements are visited.
///
/// Groups without a rule of their own fall back to the default rule, and
/// keep insertion order when there is none.
#[derive(Clone, Default)]
pub struct ChildOrdering {
    rules: HashMap<String, OrderRule>,
    default: Option<OrderRule>,
}

impl ChildOrdering {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for elements of `kind`.
    #[must_use]
    pub fn with_rule(
        mut self,
        kind: impl Into<String>,
        rule: impl Fn(&mut Vec<&DiffElement>) + Send + Sync + 'static,
    ) -> Self {
        self.rules.insert(kind.into(), Arc::new(rule));
        self
    }

    /// Sets the rule for groups that have no rule of their own.
    #[must_use]
    pub fn with_default_rule(
        mut self,
        rule: impl Fn(&mut Vec<&DiffElement>) + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(Arc::new(rule));
        self
    }

    /// Returns the rule for `kind`, if any.
    pub fn rule(&self, kind: &str) -> Option<&OrderRule> {
        self.rules.get(kind)
    }

    /// Returns the default rule, if any.
    pub fn default_rule(&self) -> Option<&OrderRule> {
        self.default.as_ref()
    }

    /// Returns the rule that applies to `kind`: its own, else the default.
    pub fn resolve(&self, kind: &str) -> Option<&OrderRule> {
        self.rule(kind).or(self.default.as_ref())
    }

    /// Returns true if no rule is defined.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.default.is_none()
    }
}

impl fmt::Debug for ChildOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ChildOrdering")
            .field("rules", &kinds)
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Number of elements per action across a diff tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Records to create.
    pub create: usize,
    /// Records to update.
    pub update: usize,
    /// Records to delete.
    pub delete: usize,
    /// Records that already match.
    #[serde(rename = "no-change")]
    pub no_change: usize,
}

impl DiffSummary {
    /// Returns the number of elements that need a change.
    pub fn changes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "create={} update={} delete={} no-change={}",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// A tree of differences between two stores (or two subtrees).
#[derive(Debug, Clone, Default)]
pub struct Diff {
    groups: OrderedMap<OrderedMap<DiffElement>>,
    ordering: Arc<ChildOrdering>,
}

impl Diff {
    /// Creates an empty diff with insertion ordering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty diff that orders groups with `ordering`.
    pub fn with_ordering(ordering: Arc<ChildOrdering>) -> Self {
        Self {
            groups: OrderedMap::new(),
            ordering,
        }
    }

    /// Returns the ordering rules.
    pub fn ordering(&self) -> &Arc<ChildOrdering> {
        &self.ordering
    }

    /// Adds an element to the group of its model.
    ///
    /// Fails with [`CoreError::AlreadyExists`] if the group already holds an
    /// element with the same name.
    pub fn add(&mut self, element: DiffElement) -> CoreResult<()> {
        let group = self
            .groups
            .get_or_insert_with(element.kind(), OrderedMap::new);
        if group.contains_key(element.name()) {
            return Err(CoreError::already_exists(element.kind(), element.name()));
        }
        group.insert(element.name().to_string(), element);
        Ok(())
    }

    /// Returns the group names, in first-appearance order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys()
    }

    /// Returns the elements of one group, ordered by its rule.
    pub fn group(&self, kind: &str) -> Vec<&DiffElement> {
        let mut elements: Vec<&DiffElement> = self
            .groups
            .get(kind)
            .map(|group| group.values().collect())
            .unwrap_or_default();
        if let Some(rule) = self.ordering.resolve(kind) {
            (**rule)(&mut elements);
        }
        elements
    }

    /// Returns every element, group by group.
    pub fn children(&self) -> Vec<&DiffElement> {
        self.groups().flat_map(|kind| self.group(kind)).collect()
    }

    /// Looks up an element by model and name.
    pub fn get(&self, kind: &str, name: &str) -> Option<&DiffElement> {
        self.groups.get(kind)?.get(name)
    }

    /// Returns the number of top-level elements.
    pub fn len(&self) -> usize {
        self.groups.values().map(OrderedMap::len).sum()
    }

    /// Returns true if the diff holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if any element in the tree needs a change.
    pub fn has_diffs(&self) -> bool {
        self.groups
            .values()
            .flat_map(OrderedMap::values)
            .any(|element| element.has_diffs(true))
    }

    /// Counts elements per action across the whole tree.
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        self.accumulate(&mut summary);
        summary
    }

    fn accumulate(&self, summary: &mut DiffSummary) {
        for element in self.groups.values().flat_map(OrderedMap::values) {
            match element.action() {
                Some(DiffAction::Create) => summary.create += 1,
                Some(DiffAction::Update) => summary.update += 1,
                Some(DiffAction::Delete) => summary.delete += 1,
                None => summary.no_change += 1,
            }
            element.child_diff().accumulate(summary);
        }
    }

    /// Exports the elements that need a change as `{model: {name: element}}`.
    pub fn to_value(&self) -> Value {
        let mut out = Fields::new();
        for kind in self.groups() {
            let group: Fields = self
                .group(kind)
                .into_iter()
                .filter(|element| element.has_diffs(true))
                .map(|element| (element.name(), element.to_value()))
                .collect();
            if !group.is_empty() {
                out.insert(kind, Value::Map(group));
            }
        }
        Value::Map(out)
    }

    /// Renders the elements that need a change, or `(no diffs)`.
    pub fn render(&self, indent: usize) -> String {
        let margin = " ".repeat(indent);
        let mut lines = Vec::new();
        for kind in self.groups() {
            let mut heading = false;
            for element in self.group(kind) {
                if !element.has_diffs(true) {
                    continue;
                }
                if !heading {
                    lines.push(format!("{margin}{kind}"));
                    heading = true;
                }
                lines.push(element.render(indent + 2));
            }
        }
        if lines.is_empty() {
            return format!("{margin}(no diffs)");
        }
        lines.join("\n")
    }
}

impl PartialEq for Diff {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(0))
    }
}
