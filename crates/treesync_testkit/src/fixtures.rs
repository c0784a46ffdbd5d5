//! Test fixtures and store helpers.
//!
//! Two inventory backends describe the same network differently:
//!
//! - Backend A: sites hold devices and people; devices carry a `tag`.
//! - Backend B: sites hold devices and places; devices carry `vlans`.
//!
//! Their data overlaps on purpose so that diffing them exercises every
//! action, attribute-level updates and child-type intersection.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use treesync_core::{
    fields, CoreResult, CrudError, Fields, HookResult, InMemoryHooks, ModelFlags, ModelHooks,
    ModelType, Record, RecordRef, Store, StoreAdapter, SyncReport, Value,
};

/// Interfaces of one device: `(name, description)`.
pub type InterfaceData = &'static [(&'static str, &'static str)];

/// Devices of one site: `(name, role, interfaces)`.
pub type DeviceData = &'static [(&'static str, &'static str, InterfaceData)];

/// Sites of one backend: `(name, devices)`.
pub type SiteData = &'static [(&'static str, DeviceData)];

const TWO_INTERFACES: InterfaceData = &[("eth0", "Interface 0"), ("eth1", "Interface 1")];

/// Inventory loaded into backend A.
pub const BACKEND_A_DATA: SiteData = &[
    (
        "nyc",
        &[
            ("nyc-spine1", "spine", TWO_INTERFACES),
            ("nyc-spine2", "spine", TWO_INTERFACES),
        ],
    ),
    (
        "sfo",
        &[
            ("sfo-spine1", "spine", TWO_INTERFACES),
            (
                "sfo-spine2",
                "spine",
                &[("eth0", "TBD"), ("eth1", "ddd"), ("eth2", "Interface 2")],
            ),
        ],
    ),
    (
        "rdu",
        &[
            ("rdu-spine1", "spine", TWO_INTERFACES),
            ("rdu-spine2", "spine", TWO_INTERFACES),
        ],
    ),
];

/// Inventory loaded into backend B.
pub const BACKEND_B_DATA: SiteData = &[
    (
        "nyc",
        &[
            (
                "nyc-spine1",
                "spine",
                &[("eth0", "Interface 0/0"), ("eth1", "Interface 1")],
            ),
            ("nyc-spine2", "spine", TWO_INTERFACES),
        ],
    ),
    (
        "sfo",
        &[
            ("sfo-spine1", "leaf", TWO_INTERFACES),
            (
                "sfo-spine2",
                "spine",
                &[("eth0", "TBD"), ("eth1", "ddd"), ("eth3", "Interface 3")],
            ),
        ],
    ),
    (
        "atl",
        &[
            ("atl-spine1", "spine", TWO_INTERFACES),
            ("atl-spine2", "spine", TWO_INTERFACES),
        ],
    ),
];

/// Which backend shape a schema follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Sites with people, devices with a tag.
    A,
    /// Sites with places, devices with vlans.
    B,
}

/// Model types of one backend.
#[derive(Debug, Clone)]
pub struct NetworkSchema {
    /// Which backend shape this is.
    pub flavor: Flavor,
    /// Top-level site model.
    pub site: Arc<ModelType>,
    /// Device model, child of site.
    pub device: Arc<ModelType>,
    /// Interface model, child of device.
    pub interface: Arc<ModelType>,
    /// Person (A) or place (B) model, child of site.
    pub extra: Arc<ModelType>,
}

impl NetworkSchema {
    /// Builds the schema of a backend with in-memory hooks.
    pub fn new(flavor: Flavor) -> Self {
        Self::with_hooks(flavor, Arc::new(InMemoryHooks))
    }

    /// Builds the schema with `hooks` on sites, devices and interfaces.
    pub fn with_hooks(flavor: Flavor, hooks: Arc<dyn ModelHooks>) -> Self {
        Self {
            flavor,
            site: site_model(flavor, Arc::clone(&hooks)),
            device: device_model(flavor, Arc::clone(&hooks)),
            interface: interface_model(hooks),
            extra: match flavor {
                Flavor::A => named_model("person"),
                Flavor::B => named_model("place"),
            },
        }
    }

    /// Replaces the interface hooks only.
    #[must_use]
    pub fn with_interface_hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.interface = interface_model(hooks);
        self
    }

    /// Creates an empty store using this schema.
    pub fn store(&self, kind: &str, name: &str) -> Store {
        self.store_with_adapter(kind, name, Arc::new(FixtureAdapter::empty()))
    }

    fn store_with_adapter(&self, kind: &str, name: &str, adapter: Arc<dyn StoreAdapter>) -> Store {
        Store::builder(kind)
            .name(name)
            .top_level(["site"])
            .model(Arc::clone(&self.site))
            .model(Arc::clone(&self.device))
            .model(Arc::clone(&self.interface))
            .model(Arc::clone(&self.extra))
            .shared_adapter(adapter)
            .build()
            .expect("fixture schema is valid")
    }
}

/// Site model for a backend.
pub fn site_model(flavor: Flavor, hooks: Arc<dyn ModelHooks>) -> Arc<ModelType> {
    let builder = ModelType::builder("site")
        .identifiers(["name"])
        .child("device", "devices");
    let builder = match flavor {
        Flavor::A => builder.child("person", "people"),
        Flavor::B => builder.child("place", "places"),
    };
    builder
        .shared_hooks(hooks)
        .build()
        .expect("site model is valid")
}

/// Device model for a backend.
pub fn device_model(flavor: Flavor, hooks: Arc<dyn ModelHooks>) -> Arc<ModelType> {
    let builder = ModelType::builder("device")
        .identifiers(["name"])
        .child("interface", "interfaces")
        .field("site_name");
    let builder = match flavor {
        Flavor::A => builder.attributes(["role", "tag"]).default_value("tag", ""),
        Flavor::B => builder
            .attributes(["role", "vlans"])
            .default_value("vlans", Value::Array(Vec::new())),
    };
    builder
        .shared_hooks(hooks)
        .build()
        .expect("device model is valid")
}

/// Interface model, shared by both backends.
pub fn interface_model(hooks: Arc<dyn ModelHooks>) -> Arc<ModelType> {
    ModelType::builder("interface")
        .identifiers(["device_name", "name"])
        .shortname(["name"])
        .attributes(["interface_type", "description"])
        .default_value("interface_type", "ethernet")
        .shared_hooks(hooks)
        .build()
        .expect("interface model is valid")
}

fn named_model(name: &str) -> Arc<ModelType> {
    ModelType::builder(name)
        .identifiers(["name"])
        .build()
        .expect("named model is valid")
}

/// Adds a site.
pub fn add_site(store: &mut Store, name: &str) -> CoreResult<RecordRef> {
    let model = Arc::clone(store.require_model("site")?);
    store.add(Record::new(&model, fields! { "name" => name })?)
}

/// Adds a device and registers it with its site, if the site is stored.
pub fn add_device(store: &mut Store, site: &str, name: &str, role: &str) -> CoreResult<RecordRef> {
    let model = Arc::clone(store.require_model("device")?);
    let device = store.add(Record::new(
        &model,
        fields! { "name" => name, "role" => role, "site_name" => site },
    )?)?;
    if let Some(site) = store.get("site", site) {
        site.write().add_child_id("device", name.to_string())?;
    }
    Ok(device)
}

/// Adds an interface and registers it with its device, if the device is stored.
pub fn add_interface(
    store: &mut Store,
    device: &str,
    name: &str,
    description: Option<&str>,
) -> CoreResult<RecordRef> {
    let model = Arc::clone(store.require_model("interface")?);
    let interface = store.add(Record::new(
        &model,
        fields! { "device_name" => device, "name" => name, "description" => description },
    )?)?;
    if let Some(device) = store.get("device", device) {
        let uid = interface.read().unique_id();
        device.write().add_child_id("interface", uid)?;
    }
    Ok(interface)
}

/// Adds a person (A) or place (B) to a site.
pub fn add_site_member(
    store: &mut Store,
    site: &str,
    model: &str,
    name: &str,
) -> CoreResult<RecordRef> {
    let descriptor = Arc::clone(store.require_model(model)?);
    let member = store.add(Record::new(&descriptor, fields! { "name" => name })?)?;
    if let Some(site) = store.get("site", site) {
        site.write().add_child_id(model, name.to_string())?;
    }
    Ok(member)
}

/// Loads site/device/interface data into a store.
pub fn load_sites(store: &mut Store, data: SiteData) -> CoreResult<()> {
    for (site, devices) in data {
        add_site(store, site)?;
        for (device, role, interfaces) in devices.iter() {
            add_device(store, site, device, role)?;
            for (interface, description) in interfaces.iter() {
                add_interface(store, device, interface, Some(*description))?;
            }
        }
    }
    Ok(())
}

/// Adapter loading fixture data and counting sync completions.
#[derive(Debug)]
pub struct FixtureAdapter {
    flavor: Option<Flavor>,
    data: SiteData,
    completions: Arc<AtomicUsize>,
}

impl FixtureAdapter {
    /// An adapter that loads nothing.
    pub fn empty() -> Self {
        Self {
            flavor: None,
            data: &[],
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An adapter loading the standard data of a backend.
    pub fn for_flavor(flavor: Flavor) -> Self {
        let data = match flavor {
            Flavor::A => BACKEND_A_DATA,
            Flavor::B => BACKEND_B_DATA,
        };
        Self {
            flavor: Some(flavor),
            data,
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `sync_complete` calls.
    pub fn completions(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completions)
    }
}

impl StoreAdapter for FixtureAdapter {
    fn load(&self, store: &mut Store) -> CoreResult<()> {
        load_sites(store, self.data)?;
        match self.flavor {
            Some(Flavor::A) => {
                add_site_member(store, "rdu", "person", "Glenn Matthews")?;
            }
            Some(Flavor::B) => {
                add_site_member(store, "nyc", "place", "Statue of Liberty")?;
            }
            None => {}
        }
        Ok(())
    }

    fn sync_complete(&self, _store: &Store, _report: &SyncReport) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

/// A loaded backend store plus its schema.
pub struct Fixture {
    /// The store.
    pub store: Store,
    /// The model types the store was built with.
    pub schema: NetworkSchema,
    completions: Arc<AtomicUsize>,
}

impl Fixture {
    /// Builds and loads a backend store.
    pub fn load(schema: NetworkSchema, kind: &str, name: &str) -> Self {
        let adapter = FixtureAdapter::for_flavor(schema.flavor);
        let completions = adapter.completions();
        let mut store = schema.store_with_adapter(kind, name, Arc::new(adapter));
        store.load().expect("fixture data loads");
        Self {
            store,
            schema,
            completions,
        }
    }

    /// Number of syncs into this store that changed something.
    pub fn sync_completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

impl Deref for Fixture {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl DerefMut for Fixture {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Backend A with its standard data.
pub fn backend_a() -> Fixture {
    Fixture::load(NetworkSchema::new(Flavor::A), "BackendA", "BackendA")
}

/// Backend B with its standard data.
pub fn backend_b() -> Fixture {
    Fixture::load(NetworkSchema::new(Flavor::B), "Backend_B", "backend-b")
}

/// Backend A plus site `lax` and device `nyc-spine3` under `nyc`.
pub fn backend_a_with_extra_models() -> Fixture {
    let mut fixture = backend_a();
    add_site(&mut fixture, "lax").expect("lax is new");
    add_device(&mut fixture, "nyc", "nyc-spine3", "spine").expect("nyc-spine3 is new");
    fixture
}

/// Backend A without site `rdu` and without device `sfo-spine2`.
///
/// Only the records themselves are removed; their descendants stay in the
/// store but are no longer reachable from a top-level site.
pub fn backend_a_minus_some_models() -> Fixture {
    let mut fixture = backend_a();
    let rdu = fixture.get("site", "rdu").expect("rdu is loaded");
    fixture.remove(&rdu, false).expect("rdu is stored");

    let spine = fixture.get("device", "sfo-spine2").expect("sfo-spine2 is loaded");
    let sfo = fixture.get("site", "sfo").expect("sfo is loaded");
    sfo.write()
        .remove_child(&spine.read())
        .expect("sfo-spine2 is a child of sfo");
    fixture.remove(&spine, false).expect("sfo-spine2 is stored");
    fixture
}

/// Hooks that fail every third lifecycle call.
///
/// The counter is shared by every model using the same instance, so the
/// failing record shifts from one sync attempt to the next.
#[derive(Debug, Default)]
pub struct ErrorProneHooks {
    counter: AtomicU64,
}

impl ErrorProneHooks {
    /// Creates hooks with a fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    fn should_fail(&self) -> bool {
        (self.counter.fetch_add(1, Ordering::SeqCst) + 1) % 3 == 0
    }
}

impl ModelHooks for ErrorProneHooks {
    fn create(
        &self,
        model: &Arc<ModelType>,
        store: &Store,
        ids: &Fields,
        attrs: &Fields,
    ) -> HookResult<Record> {
        if self.should_fail() {
            return Err(CrudError::NotCreated("Random creation error!".into()));
        }
        InMemoryHooks.create(model, store, ids, attrs)
    }

    fn update(&self, record: &mut Record, attrs: &Fields) -> HookResult<()> {
        if self.should_fail() {
            return Err(CrudError::NotUpdated("Random update error!".into()));
        }
        InMemoryHooks.update(record, attrs)
    }

    fn delete(&self, record: &mut Record) -> HookResult<()> {
        if self.should_fail() {
            return Err(CrudError::NotDeleted("Random deletion error!".into()));
        }
        InMemoryHooks.delete(record)
    }
}

/// Backend A whose sites, devices and interfaces fail every third hook call.
pub fn error_prone_backend_a() -> Fixture {
    let schema = NetworkSchema::with_hooks(Flavor::A, Arc::new(ErrorProneHooks::new()));
    Fixture::load(schema, "ErrorProneBackendA", "ErrorProneBackendA")
}

/// Hooks whose delete always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeleteHooks;

impl ModelHooks for NoDeleteHooks {
    fn delete(&self, record: &mut Record) -> HookResult<()> {
        Err(CrudError::Other(format!("refusing to delete {record}")))
    }
}

/// Backend A plus device `nyc-spine3` (flagged to skip children on delete)
/// holding interface `eth0`, whose model refuses direct deletion.
pub fn backend_a_with_undeletable_interface() -> Fixture {
    let schema = NetworkSchema::new(Flavor::A).with_interface_hooks(Arc::new(NoDeleteHooks));
    let mut fixture = Fixture::load(schema, "BackendA", "BackendA");
    let spine = add_device(&mut fixture, "nyc", "nyc-spine3", "spine").expect("nyc-spine3 is new");
    spine
        .write()
        .insert_flags(ModelFlags::SKIP_CHILDREN_ON_DELETE);
    add_interface(&mut fixture, "nyc-spine3", "eth0", None).expect("eth0 is new");
    fixture
}
