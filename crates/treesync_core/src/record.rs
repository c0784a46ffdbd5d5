//! Record instances and shared record handles.

use crate::error::{CoreError, CoreResult};
use crate::flags::ModelFlags;
use crate::map::{Fields, OrderedMap};
use crate::model::{FieldRole, ModelType, ID_SEPARATOR};
use crate::store::{Store, StoreId};
use crate::value::Value;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// One instance of a [`ModelType`].
///
/// Field values are kept in declaration order: identifiers, then attributes,
/// then extra fields. Children are stored by unique id, one list per child
/// model; the child records themselves live in the store.
#[derive(Clone)]
pub struct Record {
    model: Arc<ModelType>,
    values: Fields,
    children: OrderedMap<Vec<String>>,
    flags: ModelFlags,
    store: Option<StoreId>,
}

impl Record {
    /// Creates a record from a flat field map.
    ///
    /// Every identifier must be present. Attributes and extra fields that
    /// are not given take their declared default, or null. A children field
    /// may be given as an array of unique ids.
    pub fn new(model: &Arc<ModelType>, fields: Fields) -> CoreResult<Self> {
        let mut given = Fields::new();
        let mut children: OrderedMap<Vec<String>> = model
            .children()
            .keys()
            .map(|child| (child, Vec::new()))
            .collect();

        for (name, value) in fields {
            match model.field_role(&name) {
                Some(FieldRole::Children) => {
                    let ids = child_ids_from(model, &name, &value)?;
                    if let Some((child_model, _)) =
                        model.children().iter().find(|(_, field)| **field == name)
                    {
                        children.insert(child_model, ids);
                    }
                }
                Some(_) => {
                    given.insert(name, value);
                }
                None => {
                    return Err(CoreError::UnknownField {
                        model: model.name().to_string(),
                        field: name,
                    })
                }
            }
        }

        let mut values = Fields::new();
        for name in model.identifiers() {
            let value = given
                .remove(name)
                .ok_or_else(|| CoreError::MalformedIdentifier {
                    model: model.name().to_string(),
                    field: name.clone(),
                })?;
            values.insert(name.as_str(), value);
        }
        for name in model.attributes().iter().chain(model.extra_fields()) {
            let value = given
                .remove(name)
                .or_else(|| model.default_value(name).cloned())
                .unwrap_or(Value::Null);
            values.insert(name.as_str(), value);
        }

        Ok(Self {
            model: Arc::clone(model),
            values,
            children,
            flags: model.default_flags(),
            store: None,
        })
    }

    /// Returns the model descriptor.
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    /// Returns the model name.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Returns the unique id, built from the identifier values.
    pub fn unique_id(&self) -> String {
        self.join(self.model.identifiers())
    }

    /// Returns the shortname, which falls back to the unique id.
    pub fn shortname(&self) -> String {
        if self.model.shortname_fields().is_empty() {
            self.unique_id()
        } else {
            self.join(self.model.shortname_fields())
        }
    }

    fn join(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|name| self.values.get(name).map(Value::to_id_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(ID_SEPARATOR)
    }

    /// Returns a field value (identifier, attribute or extra field).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Sets an attribute or extra field.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> CoreResult<()> {
        match self.model.field_role(field) {
            Some(FieldRole::Attribute | FieldRole::Extra) => {
                self.values.insert(field, value.into());
                Ok(())
            }
            Some(FieldRole::Identifier) => Err(CoreError::ImmutableField {
                model: self.model_name().to_string(),
                field: field.to_string(),
            }),
            Some(FieldRole::Children) | None => Err(CoreError::UnknownField {
                model: self.model_name().to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Returns the identifier values.
    pub fn identifiers(&self) -> Fields {
        self.subset(self.model.identifiers())
    }

    /// Returns the attribute values compared during diffing.
    pub fn attrs(&self) -> Fields {
        self.subset(self.model.attributes())
    }

    fn subset(&self, names: &[String]) -> Fields {
        names
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.as_str(), v.clone())))
            .collect()
    }

    /// Returns the unique ids of children of `child_model`, in insertion order.
    pub fn child_ids(&self, child_model: &str) -> &[String] {
        self.children
            .get(child_model)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns all child id lists keyed by child model.
    pub fn children(&self) -> &OrderedMap<Vec<String>> {
        &self.children
    }

    /// Returns the instance flags.
    pub fn flags(&self) -> ModelFlags {
        self.flags
    }

    /// Replaces the instance flags.
    pub fn set_flags(&mut self, flags: ModelFlags) {
        self.flags = flags;
    }

    /// Adds flags to the instance flags.
    pub fn insert_flags(&mut self, flags: ModelFlags) {
        self.flags |= flags;
    }

    /// Builder-style variant of [`Record::insert_flags`].
    #[must_use]
    pub fn with_flags(mut self, flags: ModelFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns the store this record was first added to.
    pub fn store_id(&self) -> Option<StoreId> {
        self.store
    }

    pub(crate) fn set_store(&mut self, store: Option<StoreId>) {
        self.store = store;
    }

    /// Registers `child` as a child of this record.
    pub fn add_child(&mut self, child: &Record) -> CoreResult<()> {
        self.add_child_id(child.model_name(), child.unique_id())
    }

    /// Registers a child by model name and unique id.
    ///
    /// Fails with [`CoreError::WrongChildType`] if this model does not
    /// declare the child model, or [`CoreError::AlreadyExists`] if the id
    /// is already listed.
    pub fn add_child_id(&mut self, child_model: &str, unique_id: String) -> CoreResult<()> {
        let field = self.child_field(child_model)?;
        let ids = self.children.get_or_insert_with(child_model, Vec::new);
        if ids.contains(&unique_id) {
            return Err(CoreError::already_exists(
                child_model,
                format!("{unique_id} in {field} of {}", self.unique_id()),
            ));
        }
        ids.push(unique_id);
        Ok(())
    }

    /// Unregisters `child` from this record.
    pub fn remove_child(&mut self, child: &Record) -> CoreResult<()> {
        self.remove_child_id(child.model_name(), &child.unique_id())
    }

    /// Unregisters a child by model name and unique id.
    ///
    /// Fails with [`CoreError::WrongChildType`] if this model does not
    /// declare the child model, or [`CoreError::NotFound`] if the id is not
    /// listed.
    pub fn remove_child_id(&mut self, child_model: &str, unique_id: &str) -> CoreResult<()> {
        let field = self.child_field(child_model)?;
        let parent = self.unique_id();
        let ids = self
            .children
            .get_mut(child_model)
            .ok_or_else(|| CoreError::not_found(child_model, unique_id))?;
        let pos = ids
            .iter()
            .position(|id| id == unique_id)
            .ok_or_else(|| CoreError::not_found(child_model, format!("{unique_id} in {field} of {parent}")))?;
        ids.remove(pos);
        Ok(())
    }

    /// Empties every child list, returning what it held.
    pub(crate) fn take_children(&mut self) -> Vec<(String, Vec<String>)> {
        let models: Vec<String> = self.children.keys().map(str::to_string).collect();
        models
            .into_iter()
            .zip(self.children.values_mut().map(std::mem::take))
            .collect()
    }

    fn child_field(&self, child_model: &str) -> CoreResult<String> {
        self.model
            .child_field(child_model)
            .map(str::to_string)
            .ok_or_else(|| CoreError::WrongChildType {
                parent: self.model_name().to_string(),
                child: child_model.to_string(),
                valid: self.model.children().keys().map(str::to_string).collect(),
            })
    }

    /// Exports all fields, children included, as a map value.
    pub fn to_value(&self) -> Value {
        let mut map = self.values.clone();
        for (child, ids) in self.children.iter() {
            if let Some(field) = self.model.child_field(child) {
                map.insert(field, Value::from(ids.clone()));
            }
        }
        Value::Map(map)
    }

    /// Renders this record and, optionally, its subtree.
    ///
    /// Children are resolved through `store`; ids that cannot be resolved
    /// print as `(details unavailable)`.
    pub fn render(&self, store: Option<&Store>, include_children: bool, indent: usize) -> String {
        let margin = " ".repeat(indent);
        let mut output = format!(
            "{margin}{}: {}: {}",
            self.model_name(),
            self.shortname(),
            self.attrs()
        );
        if !include_children {
            return output;
        }
        for (child_model, ids) in self.children.iter() {
            let field = self.model.child_field(child_model).unwrap_or(child_model);
            if ids.is_empty() {
                output.push_str(&format!("\n{margin}  {field}: []"));
                continue;
            }
            output.push_str(&format!("\n{margin}  {field}"));
            for id in ids {
                let child = store.and_then(|s| s.get(child_model, id.as_str()));
                match child {
                    Some(child) => {
                        output.push('\n');
                        output.push_str(&child.read().render(store, true, indent + 4));
                    }
                    None => {
                        output.push_str(&format!("\n{margin}    {id} (details unavailable)"));
                    }
                }
            }
        }
        output
    }
}

fn child_ids_from(model: &ModelType, field: &str, value: &Value) -> CoreResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_text().map(str::to_string).ok_or_else(|| {
                    CoreError::invalid_schema(
                        model.name(),
                        format!("children field {field} must hold unique id strings"),
                    )
                })
            })
            .collect(),
        _ => Err(CoreError::invalid_schema(
            model.name(),
            format!("children field {field} must be an array"),
        )),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_id())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model_name())
            .field("values", &self.values)
            .field("children", &self.children)
            .field("flags", &self.flags)
            .field("store", &self.store)
            .finish()
    }
}

/// Shared, lockable handle to a [`Record`].
///
/// Stores hand out clones of the same handle, so an update through one
/// handle is visible through every other. Equality is identity.
#[derive(Clone)]
pub struct RecordRef(Arc<RwLock<Record>>);

impl RecordRef {
    /// Wraps a record in a new handle.
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Locks the record for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read()
    }

    /// Locks the record for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write()
    }

    /// Returns true if both handles point at the same record.
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the model name and unique id of the record.
    pub fn key(&self) -> (String, String) {
        let record = self.read();
        (record.model_name().to_string(), record.unique_id())
    }
}

impl From<Record> for RecordRef {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for RecordRef {}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.read(), f)
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.read(), f)
    }
}
