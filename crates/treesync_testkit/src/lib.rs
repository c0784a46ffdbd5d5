//! # Treesync Testkit
//!
//! Test utilities for treesync.
//!
//! This crate provides:
//! - Two network inventory backends with overlapping data
//! - Variants of those backends with extra, missing or failing records
//! - Property-based network generators using proptest
//! - A `tracing` layer that captures events for assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use treesync_testkit::prelude::*;
//!
//! #[test]
//! fn backends_converge() {
//!     let mut a = backend_a();
//!     let b = backend_b();
//!     a.sync_from(&b, SyncFlags::NONE).unwrap();
//!     assert!(!a.diff_from(&b, SyncFlags::NONE).unwrap().has_diffs());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logs;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logs::*;
    pub use treesync_core::{ModelFlags, SyncFlags, SyncOptions};
}

pub use fixtures::*;
pub use generators::*;
pub use logs::*;
