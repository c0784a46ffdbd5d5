//! A single node of a diff tree.

use crate::diff::{ChildOrdering, Diff};
use crate::error::CoreResult;
use crate::map::{Fields, OrderedMap};
use crate::value::Value;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Change needed to make the destination match the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    /// The record only exists in the source.
    Create,
    /// The record exists on both sides with differing attributes.
    Update,
    /// The record only exists in the destination.
    Delete,
}

impl DiffAction {
    /// Returns the lowercase action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffAction::Create => "create",
            DiffAction::Update => "update",
            DiffAction::Delete => "delete",
        }
    }
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and destination values of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrChange {
    /// Value on the source side, absent if the record is missing there.
    pub source: Option<Value>,
    /// Value on the destination side, absent if the record is missing there.
    pub dest: Option<Value>,
}

/// Differences between one source record and one destination record.
///
/// Either side's attributes may be absent, meaning the record does not
/// exist on that side. Child records are compared into a nested [`Diff`].
#[derive(Debug, Clone)]
pub struct DiffElement {
    kind: String,
    name: String,
    keys: Fields,
    source_name: String,
    dest_name: String,
    source_attrs: Option<Fields>,
    dest_attrs: Option<Fields>,
    child_diff: Diff,
}

impl DiffElement {
    /// Creates an element with no attributes recorded on either side.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, keys: Fields) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            keys,
            source_name: "source".to_string(),
            dest_name: "dest".to_string(),
            source_attrs: None,
            dest_attrs: None,
            child_diff: Diff::new(),
        }
    }

    /// Sets the labels used for each side when rendering.
    #[must_use]
    pub fn with_labels(mut self, source: impl Into<String>, dest: impl Into<String>) -> Self {
        self.source_name = source.into();
        self.dest_name = dest.into();
        self
    }

    /// Sets the ordering rules applied to the child diff.
    #[must_use]
    pub fn with_ordering(mut self, ordering: Arc<ChildOrdering>) -> Self {
        self.child_diff = Diff::with_ordering(ordering);
        self
    }

    /// Returns the model name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the shortname of the compared records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identifier values of the compared records.
    pub fn keys(&self) -> &Fields {
        &self.keys
    }

    /// Returns the source label.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Returns the destination label.
    pub fn dest_name(&self) -> &str {
        &self.dest_name
    }

    /// Returns the source attributes, if the record exists in the source.
    pub fn source_attrs(&self) -> Option<&Fields> {
        self.source_attrs.as_ref()
    }

    /// Returns the destination attributes, if the record exists in the destination.
    pub fn dest_attrs(&self) -> Option<&Fields> {
        self.dest_attrs.as_ref()
    }

    /// Returns the diff of the child records.
    pub fn child_diff(&self) -> &Diff {
        &self.child_diff
    }

    /// Records attributes for either side; `None` leaves that side unchanged.
    pub fn add_attrs(&mut self, source: Option<Fields>, dest: Option<Fields>) {
        if source.is_some() {
            self.source_attrs = source;
        }
        if dest.is_some() {
            self.dest_attrs = dest;
        }
    }

    /// Adds a child element.
    pub fn add_child(&mut self, element: DiffElement) -> CoreResult<()> {
        self.child_diff.add(element)
    }

    /// Returns the child elements, grouped and ordered like [`Diff::children`].
    pub fn children(&self) -> Vec<&DiffElement> {
        self.child_diff.children()
    }

    /// Returns the change needed for this record alone, if any.
    pub fn action(&self) -> Option<DiffAction> {
        match (&self.source_attrs, &self.dest_attrs) {
            (Some(_), None) => Some(DiffAction::Create),
            (None, Some(_)) => Some(DiffAction::Delete),
            (Some(source), Some(dest)) => {
                let differs = self
                    .attrs_keys()
                    .into_iter()
                    .any(|key| source.get(key) != dest.get(key));
                differs.then_some(DiffAction::Update)
            }
            (None, None) => None,
        }
    }

    /// Returns the attribute names relevant to this element.
    ///
    /// When both sides exist these are the names present on both, in
    /// destination order.
    pub fn attrs_keys(&self) -> Vec<&str> {
        match (&self.source_attrs, &self.dest_attrs) {
            (Some(source), Some(dest)) => dest.keys().filter(|k| source.contains_key(k)).collect(),
            (Some(source), None) => source.keys().collect(),
            (None, Some(dest)) => dest.keys().collect(),
            (None, None) => Vec::new(),
        }
    }

    /// Returns the attributes that differ, with each side's value.
    ///
    /// A created record reports every source attribute, a deleted one every
    /// destination attribute.
    pub fn attrs_diffs(&self) -> OrderedMap<AttrChange> {
        match (&self.source_attrs, &self.dest_attrs) {
            (Some(source), Some(dest)) => self
                .attrs_keys()
                .into_iter()
                .filter_map(|key| {
                    let (s, d) = (source.get(key), dest.get(key));
                    (s != d).then(|| {
                        (
                            key,
                            AttrChange {
                                source: s.cloned(),
                                dest: d.cloned(),
                            },
                        )
                    })
                })
                .collect(),
            (Some(source), None) => source
                .iter()
                .map(|(key, value)| {
                    (
                        key,
                        AttrChange {
                            source: Some(value.clone()),
                            dest: None,
                        },
                    )
                })
                .collect(),
            (None, Some(dest)) => dest
                .iter()
                .map(|(key, value)| {
                    (
                        key,
                        AttrChange {
                            source: None,
                            dest: Some(value.clone()),
                        },
                    )
                })
                .collect(),
            (None, None) => OrderedMap::new(),
        }
    }

    /// Returns the source values of the differing attributes.
    pub fn source_changes(&self) -> Fields {
        self.attrs_diffs()
            .into_iter()
            .filter_map(|(key, change)| change.source.map(|value| (key, value)))
            .collect()
    }

    /// Returns true if this element, or optionally any descendant, needs a change.
    pub fn has_diffs(&self, include_children: bool) -> bool {
        self.action().is_some() || (include_children && self.child_diff.has_diffs())
    }

    /// Sort key used when ordering siblings.
    pub fn order_key(&self) -> (&str, &str) {
        (&self.kind, &self.name)
    }

    /// Exports the differing attributes and children.
    ///
    /// Source values appear under `"+"`, destination values under `"-"`,
    /// and children under their model name.
    pub fn to_value(&self) -> Value {
        let mut out = Fields::new();
        let diffs = self.attrs_diffs();
        if self.source_attrs.is_some() {
            let plus: Fields = diffs
                .iter()
                .filter_map(|(k, c)| c.source.clone().map(|v| (k, v)))
                .collect();
            if !plus.is_empty() {
                out.insert("+", Value::Map(plus));
            }
        }
        if self.dest_attrs.is_some() {
            let minus: Fields = diffs
                .iter()
                .filter_map(|(k, c)| c.dest.clone().map(|v| (k, v)))
                .collect();
            if !minus.is_empty() {
                out.insert("-", Value::Map(minus));
            }
        }
        if let Value::Map(children) = self.child_diff.to_value() {
            for (kind, group) in children {
                out.insert(kind, group);
            }
        }
        Value::Map(out)
    }

    /// Renders this element and its differing descendants.
    pub fn render(&self, indent: usize) -> String {
        let margin = " ".repeat(indent);
        let mut output = format!("{margin}{}: {}", self.kind, self.name);
        match (&self.source_attrs, &self.dest_attrs) {
            (Some(_), Some(_)) => {
                for (attr, change) in self.attrs_diffs().iter() {
                    output.push_str(&format!(
                        "\n{margin}  {attr}    {}({})    {}({})",
                        self.source_name,
                        display_side(change.source.as_ref()),
                        self.dest_name,
                        display_side(change.dest.as_ref()),
                    ));
                }
            }
            (None, Some(_)) => output.push_str(&format!(" MISSING in {}", self.source_name)),
            (Some(_), None) => output.push_str(&format!(" MISSING in {}", self.dest_name)),
            (None, None) => {}
        }
        if self.child_diff.has_diffs() {
            output.push('\n');
            output.push_str(&self.child_diff.render(indent + 2));
        } else if self.source_attrs.is_none() && self.dest_attrs.is_none() {
            output.push_str(" (no diffs)");
        }
        output
    }
}

fn display_side(value: Option<&Value>) -> String {
    value.map_or_else(|| "-".to_string(), Value::to_string)
}

impl PartialEq for DiffElement {
    /// Side labels are presentation only and do not take part in equality.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.keys == other.keys
            && self.source_attrs == other.source_attrs
            && self.dest_attrs == other.dest_attrs
            && self.child_diff == other.child_diff
    }
}

/// Elements order by model name, then element name.
///
/// Two different elements that share both names are incomparable, so the
/// ordering stays consistent with `==`. A diff never holds two such
/// siblings.
impl PartialOrd for DiffElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.order_key().cmp(&other.order_key()) {
            Ordering::Equal if self != other => None,
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for DiffElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : {} : {} : {} : {}",
            self.kind, self.name, self.keys, self.source_name, self.dest_name
        )
    }
}
