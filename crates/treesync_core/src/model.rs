//! Model type descriptors and lifecycle hooks.
//!
//! A [`ModelType`] is the static description of one kind of record: which
//! fields identify it, which are compared during diffing, and which hold the
//! unique ids of its children. Descriptors are validated once, when built,
//! so every later diff or sync can rely on their invariants.

use crate::error::{CoreError, CoreResult, CrudError, HookResult};
use crate::flags::ModelFlags;
use crate::map::{Fields, OrderedMap};
use crate::record::Record;
use crate::store::Store;
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Separator used when joining identifier values into a unique id.
pub const ID_SEPARATOR: &str = "__";

/// Lifecycle hooks invoked when a diff is applied to a store.
///
/// The default bodies only touch in-memory state. Implementations that
/// mirror changes into an external system override the hooks they need and
/// can delegate to [`InMemoryHooks`] for the in-memory part.
///
/// Each hook may fail with a [`CrudError`]; returning `Ok(None)` instead is
/// a soft failure that leaves the sync running but skips the descendants of
/// the affected record.
pub trait ModelHooks: Send + Sync {
    /// Builds a new record from its identifiers and attributes.
    ///
    /// Attributes the model does not declare are dropped, since the source
    /// store may describe the same record type with a different shape.
    fn create(
        &self,
        model: &Arc<ModelType>,
        store: &Store,
        ids: &Fields,
        attrs: &Fields,
    ) -> HookResult<Record> {
        let _ = store;
        let mut fields = ids.clone();
        for (name, value) in attrs.iter() {
            match model.field_role(name) {
                Some(FieldRole::Attribute | FieldRole::Extra) => {
                    fields.insert(name, value.clone());
                }
                _ => tracing::debug!(model = model.name(), field = name, "Dropping undeclared attribute"),
            }
        }
        Record::new(model, fields)
            .map(Some)
            .map_err(|e| CrudError::NotCreated(e.to_string()))
    }

    /// Applies changed attribute values to an existing record.
    fn update(&self, record: &mut Record, attrs: &Fields) -> HookResult<()> {
        for (name, value) in attrs.iter() {
            record
                .set(name, value.clone())
                .map_err(|e| CrudError::NotUpdated(e.to_string()))?;
        }
        Ok(Some(()))
    }

    /// Releases whatever backs a record that is about to leave the store.
    fn delete(&self, record: &mut Record) -> HookResult<()> {
        let _ = record;
        Ok(Some(()))
    }
}

/// Hooks with purely in-memory behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryHooks;

impl ModelHooks for InMemoryHooks {}

/// Role a field name plays within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Part of the unique id.
    Identifier,
    /// Compared during diffing.
    Attribute,
    /// Holds unique ids of child records.
    Children,
    /// Stored and exported, never compared.
    Extra,
}

/// Static descriptor of a record type.
pub struct ModelType {
    name: String,
    identifiers: Vec<String>,
    shortname: Vec<String>,
    attributes: Vec<String>,
    /// Child model name -> field name holding the child ids.
    children: OrderedMap<String>,
    extra: Vec<String>,
    defaults: Fields,
    flags: ModelFlags,
    hooks: Arc<dyn ModelHooks>,
}

impl ModelType {
    /// Starts building a descriptor for the model called `name`.
    pub fn builder(name: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            name: name.into(),
            identifiers: Vec::new(),
            shortname: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            extra: Vec::new(),
            defaults: Fields::new(),
            flags: ModelFlags::NONE,
            hooks: Arc::new(InMemoryHooks),
        }
    }

    /// Returns the model name, used to partition stores and diffs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identifier field names, in id order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Returns the shortname field names (empty means "same as unique id").
    pub fn shortname_fields(&self) -> &[String] {
        &self.shortname
    }

    /// Returns the attribute field names considered during diffing.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns the child model name to field name mapping.
    pub fn children(&self) -> &OrderedMap<String> {
        &self.children
    }

    /// Returns the field that stores children of `child_model`, if any.
    pub fn child_field(&self, child_model: &str) -> Option<&str> {
        self.children.get(child_model).map(String::as_str)
    }

    /// Returns the extra (non-compared) field names.
    pub fn extra_fields(&self) -> &[String] {
        &self.extra
    }

    /// Returns the default value declared for a field.
    pub fn default_value(&self, field: &str) -> Option<&Value> {
        self.defaults.get(field)
    }

    /// Returns the flags new records of this type start with.
    pub fn default_flags(&self) -> ModelFlags {
        self.flags
    }

    /// Returns the lifecycle hooks.
    pub fn hooks(&self) -> &dyn ModelHooks {
        self.hooks.as_ref()
    }

    /// Classifies a field name.
    pub fn field_role(&self, field: &str) -> Option<FieldRole> {
        if self.identifiers.iter().any(|f| f == field) {
            Some(FieldRole::Identifier)
        } else if self.attributes.iter().any(|f| f == field) {
            Some(FieldRole::Attribute)
        } else if self.children.values().any(|f| f == field) {
            Some(FieldRole::Children)
        } else if self.extra.iter().any(|f| f == field) {
            Some(FieldRole::Extra)
        } else {
            None
        }
    }

    /// Builds the unique id for a record of this type from its identifiers.
    pub fn unique_id(&self, keys: &Fields) -> CoreResult<String> {
        self.join(&self.identifiers, keys)
    }

    /// Builds the shortname for a record of this type.
    pub fn shortname(&self, fields: &Fields) -> CoreResult<String> {
        if self.shortname.is_empty() {
            self.unique_id(fields)
        } else {
            self.join(&self.shortname, fields)
        }
    }

    fn join(&self, names: &[String], fields: &Fields) -> CoreResult<String> {
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let value = fields
                .get(name)
                .ok_or_else(|| CoreError::MalformedIdentifier {
                    model: self.name.clone(),
                    field: name.clone(),
                })?;
            parts.push(value.to_id_string());
        }
        Ok(parts.join(ID_SEPARATOR))
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("identifiers", &self.identifiers)
            .field("shortname", &self.shortname)
            .field("attributes", &self.attributes)
            .field("children", &self.children)
            .field("extra", &self.extra)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModelType`].
pub struct ModelTypeBuilder {
    name: String,
    identifiers: Vec<String>,
    shortname: Vec<String>,
    attributes: Vec<String>,
    children: Vec<(String, String)>,
    extra: Vec<String>,
    defaults: Fields,
    flags: ModelFlags,
    hooks: Arc<dyn ModelHooks>,
}

impl ModelTypeBuilder {
    /// Sets the identifier fields, in unique-id order.
    #[must_use]
    pub fn identifiers<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the shortname fields.
    #[must_use]
    pub fn shortname<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shortname = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attribute fields compared during diffing.
    #[must_use]
    pub fn attributes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declares that `field` holds the unique ids of `child_model` records.
    #[must_use]
    pub fn child(mut self, child_model: impl Into<String>, field: impl Into<String>) -> Self {
        self.children.push((child_model.into(), field.into()));
        self
    }

    /// Declares an extra field that is stored but never compared.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.extra.push(name.into());
        self
    }

    /// Sets the value an attribute or extra field takes when not given.
    #[must_use]
    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(field, value.into());
        self
    }

    /// Sets the flags new records start with.
    #[must_use]
    pub fn flags(mut self, flags: ModelFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replaces the lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replaces the lifecycle hooks with a shared instance.
    #[must_use]
    pub fn shared_hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates the descriptor.
    ///
    /// Fails with [`CoreError::InvalidSchema`] if a field name appears in
    /// more than one group, a group repeats a name, a shortname field is
    /// not declared, or a default targets an identifier or unknown field.
    pub fn build(self) -> CoreResult<Arc<ModelType>> {
        let invalid = |message: String| CoreError::invalid_schema(self.name.clone(), message);

        if self.name.is_empty() {
            return Err(invalid("model name must not be empty".into()));
        }

        let mut children = OrderedMap::new();
        for (child_model, field) in &self.children {
            if children.insert(child_model.clone(), field.clone()).is_some() {
                return Err(invalid(format!("child model {child_model} declared twice")));
            }
        }
        let child_fields: Vec<String> = children.values().cloned().collect();

        let groups: [(&str, &[String]); 4] = [
            ("identifiers", &self.identifiers),
            ("attributes", &self.attributes),
            ("children", &child_fields),
            ("fields", &self.extra),
        ];

        let mut seen: Vec<(&str, &str)> = Vec::new();
        for (group, names) in groups {
            let mut local = HashSet::new();
            for name in names {
                if !local.insert(name.as_str()) {
                    return Err(invalid(format!("field {name} repeated in {group}")));
                }
                if let Some((other, _)) = seen.iter().find(|(_, n)| *n == name.as_str()) {
                    return Err(invalid(format!(
                        "field {name} is included in both {other} and {group}"
                    )));
                }
            }
            seen.extend(names.iter().map(|n| (group, n.as_str())));
        }

        for name in &self.shortname {
            let declared = self.identifiers.contains(name)
                || self.attributes.contains(name)
                || self.extra.contains(name);
            if !declared {
                return Err(invalid(format!("shortname references missing field {name}")));
            }
        }

        for name in self.defaults.keys() {
            if !self.attributes.iter().chain(&self.extra).any(|f| f == name) {
                return Err(invalid(format!(
                    "default given for {name}, which is not an attribute or extra field"
                )));
            }
        }

        Ok(Arc::new(ModelType {
            name: self.name,
            identifiers: self.identifiers,
            shortname: self.shortname,
            attributes: self.attributes,
            children,
            extra: self.extra,
            defaults: self.defaults,
            flags: self.flags,
            hooks: self.hooks,
        }))
    }
}
