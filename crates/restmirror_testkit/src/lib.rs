//! # RestMirror Testkit
//!
//! Test utilities for RestMirror.
//!
//! This crate provides:
//! - A wired-up harness (registry, mirrors, mock remote, outbox, overlay)
//!   driven by a manual clock
//! - Record builders for every sync state
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use restmirror_testkit::prelude::*;
//!
//! #[test]
//! fn replays_a_create() {
//!     let h = MirrorHarness::new(&["items"]);
//!     h.mirror("items").create("t", "/items/1/", json!({})).unwrap();
//!     h.remote.respond(Method::Post, "/items/", json!({"id": 1}));
//!     assert_eq!(h.outbox.sync().unwrap().replayed, 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use restmirror_store::Method;
    pub use serde_json::json;
}

pub use fixtures::*;
pub use generators::*;
