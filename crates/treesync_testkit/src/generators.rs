//! Property-based test generators using proptest.
//!
//! Generated networks keep the invariants the fixtures rely on: site names
//! are unique, device names are prefixed with their site, and interface
//! names are unique within a device.

use crate::fixtures::{add_device, add_interface, add_site, Flavor, NetworkSchema};
use proptest::prelude::*;
use std::collections::BTreeSet;
use treesync_core::{CoreResult, Store};

/// A generated interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    /// Interface name, `eth0` to `eth3`.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// A generated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Device name, `<site>-spine<n>`.
    pub name: String,
    /// `spine` or `leaf`.
    pub role: String,
    /// Interfaces in name order.
    pub interfaces: Vec<InterfaceSpec>,
}

/// A generated site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    /// Site name.
    pub name: String,
    /// Devices in name order.
    pub devices: Vec<DeviceSpec>,
}

/// A generated network inventory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkSpec {
    /// Sites in name order.
    pub sites: Vec<SiteSpec>,
}

impl NetworkSpec {
    /// Number of records the network loads into a store.
    pub fn record_count(&self) -> usize {
        self.sites
            .iter()
            .map(|site| {
                1 + site
                    .devices
                    .iter()
                    .map(|device| 1 + device.interfaces.len())
                    .sum::<usize>()
            })
            .sum()
    }

    /// Loads the network into an existing store.
    pub fn load_into(&self, store: &mut Store) -> CoreResult<()> {
        for site in &self.sites {
            add_site(store, &site.name)?;
            for device in &site.devices {
                add_device(store, &site.name, &device.name, &device.role)?;
                for interface in &device.interfaces {
                    add_interface(
                        store,
                        &device.name,
                        &interface.name,
                        interface.description.as_deref(),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Builds a store of the given backend shape holding this network.
    pub fn build(&self, flavor: Flavor, kind: &str) -> Store {
        let mut store = NetworkSchema::new(flavor).store(kind, kind);
        self.load_into(&mut store)
            .expect("Failed to load generated network");
        store
    }
}

/// Strategy for generating site names.
pub fn site_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{3}").expect("Invalid regex")
}

/// Strategy for generating device roles.
pub fn role_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("spine".to_string()), Just("leaf".to_string())]
}

/// Strategy for generating a device with the given name.
pub fn device_strategy(name: String) -> impl Strategy<Value = DeviceSpec> {
    (
        role_strategy(),
        prop::collection::btree_set(0u8..4, 0..4),
        prop::collection::vec(
            prop::option::of(prop::string::string_regex("[A-Z][a-z]{0,6}").expect("Invalid regex")),
            4,
        ),
    )
        .prop_map(move |(role, ports, descriptions)| DeviceSpec {
            name: name.clone(),
            role,
            interfaces: ports
                .into_iter()
                .map(|port| InterfaceSpec {
                    name: format!("eth{port}"),
                    description: descriptions[usize::from(port)].clone(),
                })
                .collect(),
        })
}

/// Strategy for generating a site with the given name.
pub fn site_strategy(name: String) -> impl Strategy<Value = SiteSpec> {
    prop::collection::btree_set(1u8..5, 0..4).prop_flat_map(move |indices: BTreeSet<u8>| {
        let site = name.clone();
        let devices: Vec<_> = indices
            .into_iter()
            .map(|index| device_strategy(format!("{site}-spine{index}")))
            .collect();
        devices.prop_map(move |devices| SiteSpec {
            name: site.clone(),
            devices,
        })
    })
}

/// Strategy for generating a network of up to `max_sites` sites.
pub fn network_strategy(max_sites: usize) -> impl Strategy<Value = NetworkSpec> {
    prop::collection::btree_set(site_name_strategy(), 0..=max_sites).prop_flat_map(|names| {
        let sites: Vec<_> = names.into_iter().map(site_strategy).collect();
        sites.prop_map(|sites| NetworkSpec { sites })
    })
}
