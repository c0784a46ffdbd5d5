//! Record stores.
//!
//! A [`Store`] holds the records of one system, partitioned by model type
//! and indexed by unique id. Two stores built from the same model types are
//! compared with [`Store::diff_from`] and converged with [`Store::sync_from`].

use crate::diff::Diff;
use crate::differ::Differ;
use crate::error::{CoreError, CoreResult};
use crate::map::{Fields, OrderedMap};
use crate::model::ModelType;
use crate::options::SyncOptions;
use crate::record::{Record, RecordRef};
use crate::syncer::{SyncReport, Syncer};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of a store, recorded on the records it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(Uuid);

impl StoreId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integration points between a store and the system it represents.
pub trait StoreAdapter: Send + Sync {
    /// Populates the store from its backing system.
    fn load(&self, store: &mut Store) -> CoreResult<()> {
        let _ = store;
        Ok(())
    }

    /// Called once after a sync into this store changed at least one record.
    fn sync_complete(&self, store: &Store, report: &SyncReport) {
        let _ = (store, report);
    }
}

struct NoopAdapter;

impl StoreAdapter for NoopAdapter {}

/// Model selector accepted by store lookups.
#[derive(Debug, Clone, Copy)]
pub enum ModelRef<'a> {
    /// A model name.
    Name(&'a str),
    /// A model descriptor.
    Model(&'a ModelType),
}

impl ModelRef<'_> {
    /// Returns the model name.
    pub fn name(&self) -> &str {
        match self {
            ModelRef::Name(name) => name,
            ModelRef::Model(model) => model.name(),
        }
    }
}

impl<'a> From<&'a str> for ModelRef<'a> {
    fn from(name: &'a str) -> Self {
        ModelRef::Name(name)
    }
}

impl<'a> From<&'a String> for ModelRef<'a> {
    fn from(name: &'a String) -> Self {
        ModelRef::Name(name)
    }
}

impl<'a> From<&'a ModelType> for ModelRef<'a> {
    fn from(model: &'a ModelType) -> Self {
        ModelRef::Model(model)
    }
}

impl<'a> From<&'a Arc<ModelType>> for ModelRef<'a> {
    fn from(model: &'a Arc<ModelType>) -> Self {
        ModelRef::Model(model.as_ref())
    }
}

impl<'a> From<&'a Record> for ModelRef<'a> {
    fn from(record: &'a Record) -> Self {
        ModelRef::Model(record.model().as_ref())
    }
}

/// Record selector accepted by store lookups.
#[derive(Debug, Clone, Copy)]
pub enum Identifier<'a> {
    /// A unique id string.
    Uid(&'a str),
    /// Identifier field values, turned into a unique id by the model.
    Keys(&'a Fields),
}

impl<'a> From<&'a str> for Identifier<'a> {
    fn from(uid: &'a str) -> Self {
        Identifier::Uid(uid)
    }
}

impl<'a> From<&'a String> for Identifier<'a> {
    fn from(uid: &'a String) -> Self {
        Identifier::Uid(uid)
    }
}

impl<'a> From<&'a Fields> for Identifier<'a> {
    fn from(keys: &'a Fields) -> Self {
        Identifier::Keys(keys)
    }
}

/// A collection of records of one system.
pub struct Store {
    id: StoreId,
    kind: String,
    name: String,
    top_level: Vec<String>,
    models: OrderedMap<Arc<ModelType>>,
    data: OrderedMap<OrderedMap<RecordRef>>,
    adapter: Arc<dyn StoreAdapter>,
}

impl Store {
    /// Creates an empty store with no registered models.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            id: StoreId::new(),
            name: kind.clone(),
            kind,
            top_level: Vec::new(),
            models: OrderedMap::new(),
            data: OrderedMap::new(),
            adapter: Arc::new(NoopAdapter),
        }
    }

    /// Starts building a store of the given kind.
    pub fn builder(kind: impl Into<String>) -> StoreBuilder {
        StoreBuilder {
            kind: kind.into(),
            name: None,
            top_level: Vec::new(),
            models: Vec::new(),
            adapter: None,
        }
    }

    /// Returns the store id.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Returns the store kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the store name (defaults to the kind).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the top-level model names, in traversal order.
    pub fn top_level(&self) -> &[String] {
        &self.top_level
    }

    /// Registers a model type.
    pub fn register_model(&mut self, model: Arc<ModelType>) -> CoreResult<()> {
        if self.models.contains_key(model.name()) {
            return Err(CoreError::invalid_schema(
                model.name(),
                format!("model registered twice in store {self}"),
            ));
        }
        self.models.insert(model.name().to_string(), model);
        Ok(())
    }

    /// Returns a registered model type.
    pub fn model(&self, name: &str) -> Option<&Arc<ModelType>> {
        self.models.get(name)
    }

    /// Returns a registered model type or [`CoreError::UnknownModel`].
    pub fn require_model(&self, name: &str) -> CoreResult<&Arc<ModelType>> {
        self.models.get(name).ok_or_else(|| CoreError::UnknownModel {
            store: self.to_string(),
            model: name.to_string(),
        })
    }

    /// Iterates over the registered model types.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelType>> {
        self.models.values()
    }

    /// Populates the store through its adapter.
    pub fn load(&mut self) -> CoreResult<()> {
        let adapter = Arc::clone(&self.adapter);
        adapter.load(self)
    }

    /// Looks up a single record.
    ///
    /// Returns `None` if nothing is stored under that id. Looking up by
    /// identifier values only works if the model is known, either because
    /// a descriptor is passed or because one is registered under the name;
    /// otherwise a warning is logged and `None` returned.
    pub fn get<'m, 'i>(
        &self,
        model: impl Into<ModelRef<'m>>,
        identifier: impl Into<Identifier<'i>>,
    ) -> Option<RecordRef> {
        let model: ModelRef<'_> = model.into();
        let name = model.name();
        let identifier: Identifier<'_> = identifier.into();
        let uid = match identifier {
            Identifier::Uid(uid) => uid.to_string(),
            Identifier::Keys(keys) => {
                let descriptor = match model {
                    ModelRef::Model(descriptor) => Some(descriptor),
                    ModelRef::Name(name) => self.models.get(name).map(|m| &**m),
                };
                let Some(descriptor) = descriptor else {
                    warn!(
                        model = name,
                        identifier = %keys,
                        "Tried to look up a record by identifiers, but the model is unknown"
                    );
                    return None;
                };
                match descriptor.unique_id(keys) {
                    Ok(uid) => uid,
                    Err(err) => {
                        warn!(model = name, identifier = %keys, error = %err, "Lookup identifiers are malformed");
                        return None;
                    }
                }
            }
        };
        self.data.get(name)?.get(&uid).cloned()
    }

    /// Returns every record of a model, in insertion order.
    pub fn get_all<'m>(&self, model: impl Into<ModelRef<'m>>) -> Vec<RecordRef> {
        let model: ModelRef<'_> = model.into();
        self.data
            .get(model.name())
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the records of a model stored under any of `uids`.
    ///
    /// Ids with no record are skipped; the result follows the order of `uids`.
    pub fn get_by_uids<'m, S: AsRef<str>>(
        &self,
        uids: &[S],
        model: impl Into<ModelRef<'m>>,
    ) -> Vec<RecordRef> {
        let model: ModelRef<'_> = model.into();
        let Some(records) = self.data.get(model.name()) else {
            return Vec::new();
        };
        uids.iter()
            .filter_map(|uid| records.get(uid.as_ref()).cloned())
            .collect()
    }

    /// Returns the number of records of a model.
    pub fn count<'m>(&self, model: impl Into<ModelRef<'m>>) -> usize {
        let model: ModelRef<'_> = model.into();
        self.data.get(model.name()).map_or(0, OrderedMap::len)
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.data.values().map(OrderedMap::len).sum()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a record.
    ///
    /// Fails with [`CoreError::AlreadyExists`] if a record of the same model
    /// and unique id is stored. The record remembers this store as its
    /// owner unless it already belongs to another one.
    pub fn add(&mut self, record: impl Into<RecordRef>) -> CoreResult<RecordRef> {
        let record = record.into();
        let (model, uid) = record.key();

        let records = self.data.get_or_insert_with(&model, OrderedMap::new);
        if records.contains_key(&uid) {
            return Err(CoreError::already_exists(model, uid));
        }
        {
            let mut guard = record.write();
            if guard.store_id().is_none() {
                guard.set_store(Some(self.id));
            }
        }
        records.insert(uid, record.clone());
        Ok(record)
    }

    /// Removes a record.
    ///
    /// With `remove_children`, descendants are removed recursively too
    /// (without running their delete hooks) and the record's child lists are
    /// emptied; descendants missing from the store are skipped. Fails with
    /// [`CoreError::NotFound`] if the record is not stored.
    pub fn remove(&mut self, record: &RecordRef, remove_children: bool) -> CoreResult<()> {
        let (model, uid) = record.key();
        self.data
            .get_mut(&model)
            .and_then(|records| records.remove(&uid))
            .ok_or_else(|| CoreError::not_found(model.as_str(), uid.as_str()))?;

        let children = {
            let mut guard = record.write();
            if guard.store_id() == Some(self.id) {
                guard.set_store(None);
            }
            if remove_children {
                guard.take_children()
            } else {
                Vec::new()
            }
        };

        for (child_model, ids) in children {
            for id in ids {
                match self.get(child_model.as_str(), id.as_str()) {
                    Some(child) => {
                        debug!(model = %child_model, unique_id = %id, "Removing child along with parent");
                        self.remove(&child, true)?;
                    }
                    None => {
                        debug!(model = %child_model, unique_id = %id, "Child not present, skipping removal");
                    }
                }
            }
        }
        Ok(())
    }

    /// Exports the contents as `{model: {uid: fields}}`.
    pub fn to_value(&self) -> Value {
        let mut out = Fields::new();
        for (model, records) in self.data.iter() {
            let records: Fields = records
                .iter()
                .map(|(uid, record)| (uid, record.read().to_value()))
                .collect();
            out.insert(model, Value::Map(records));
        }
        Value::Map(out)
    }

    /// Exports the contents as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_value())
    }

    /// Renders the record trees below each top-level model.
    pub fn render(&self, indent: usize) -> String {
        let margin = " ".repeat(indent);
        let mut sections = Vec::with_capacity(self.top_level.len());
        for model in &self.top_level {
            let records = self.get_all(model);
            if records.is_empty() {
                sections.push(format!("{margin}{model}: []"));
                continue;
            }
            let mut section = format!("{margin}{model}");
            for record in records {
                section.push('\n');
                section.push_str(&record.read().render(Some(self), true, indent + 2));
            }
            sections.push(section);
        }
        sections.join("\n")
    }

    /// Computes the diff that would make this store match `source`.
    pub fn diff_from(&self, source: &Store, options: impl Into<SyncOptions>) -> CoreResult<Diff> {
        Differ::new(source, self, &options.into()).calculate_diffs()
    }

    /// Computes the diff that would make `target` match this store.
    pub fn diff_to(&self, target: &Store, options: impl Into<SyncOptions>) -> CoreResult<Diff> {
        target.diff_from(self, options)
    }

    /// Makes this store match `source`.
    ///
    /// The adapter's [`StoreAdapter::sync_complete`] runs only if at least
    /// one record was created, updated or deleted.
    pub fn sync_from(
        &mut self,
        source: &Store,
        options: impl Into<SyncOptions>,
    ) -> CoreResult<SyncReport> {
        let options = options.into();
        let diff = self.diff_from(source, options.clone())?;
        let report = Syncer::new(source, self, &options).perform_sync(&diff)?;
        if report.has_changes() {
            let adapter = Arc::clone(&self.adapter);
            adapter.sync_complete(self, &report);
        }
        Ok(report)
    }

    /// Makes `target` match this store.
    pub fn sync_to(
        &self,
        target: &mut Store,
        options: impl Into<SyncOptions>,
    ) -> CoreResult<SyncReport> {
        target.sync_from(self, options)
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == self.name {
            f.write_str(&self.kind)
        } else {
            write!(f, "{} \"{}\"", self.kind, self.name)
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("top_level", &self.top_level)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    kind: String,
    name: Option<String>,
    top_level: Vec<String>,
    models: Vec<Arc<ModelType>>,
    adapter: Option<Arc<dyn StoreAdapter>>,
}

impl StoreBuilder {
    /// Sets the store name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the top-level model names, in traversal order.
    #[must_use]
    pub fn top_level<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.top_level = models.into_iter().map(Into::into).collect();
        self
    }

    /// Registers a model type.
    #[must_use]
    pub fn model(mut self, model: Arc<ModelType>) -> Self {
        self.models.push(model);
        self
    }

    /// Sets the adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: impl StoreAdapter + 'static) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Sets a shared adapter.
    #[must_use]
    pub fn shared_adapter(mut self, adapter: Arc<dyn StoreAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Creates the store.
    ///
    /// Fails with [`CoreError::InvalidSchema`] if a model is registered
    /// twice or a top-level name has no registered model.
    pub fn build(self) -> CoreResult<Store> {
        let mut store = Store::new(self.kind);
        if let Some(name) = self.name {
            store.name = name;
        }
        if let Some(adapter) = self.adapter {
            store.adapter = adapter;
        }
        for model in self.models {
            store.register_model(model)?;
        }
        for model in &self.top_level {
            if !store.models.contains_key(model) {
                return Err(CoreError::invalid_schema(
                    model.as_str(),
                    format!("top-level model is not registered in store {store}"),
                ));
            }
        }
        store.top_level = self.top_level;
        Ok(store)
    }
}
