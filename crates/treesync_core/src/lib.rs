//! # Treesync Core
//!
//! State reconciliation between hierarchical record stores.
//!
//! This crate provides:
//! - Model type descriptors with identifier, attribute and child fields
//! - Record stores indexed by model and unique id
//! - Diff trees describing create/update/delete actions per record
//! - A syncer that applies a diff through per-model lifecycle hooks
//!
//! ## Workflow
//!
//! 1. Describe each record type once with [`ModelType::builder`]
//! 2. Load two [`Store`]s with records from the systems being compared
//! 3. Call [`Store::diff_from`] to inspect, or [`Store::sync_from`] to apply
//!
//! ## Key Invariants
//!
//! - A unique id is the `__`-joined identifier values and never changes
//! - A store holds at most one record per (model, unique id)
//! - Records are paired by unique id; mismatched pairs abort the diff
//! - Parents are synced before their children, children in diff order
//! - A failed or skipped record never has its children synced

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod diff;
mod differ;
mod error;
mod flags;
#[cfg(feature = "console")]
pub mod logging;
mod map;
mod model;
mod options;
mod record;
mod store;
mod syncer;
mod value;

pub use diff::{AttrChange, ChildOrdering, Diff, DiffAction, DiffElement, DiffSummary, OrderRule};
pub use error::{CoreError, CoreResult, CrudError, HookResult};
pub use flags::{ModelFlags, SyncFlags};
pub use map::{Fields, OrderedMap};
pub use model::{FieldRole, InMemoryHooks, ModelHooks, ModelType, ModelTypeBuilder, ID_SEPARATOR};
pub use options::{DiffCallback, SyncOptions};
pub use record::{Record, RecordRef};
pub use store::{Identifier, ModelRef, Store, StoreAdapter, StoreBuilder, StoreId};
pub use syncer::{ElementOutcome, SyncReport, SyncStatus};
pub use value::Value;
