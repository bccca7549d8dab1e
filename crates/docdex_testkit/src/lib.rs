//! # Docdex Testkit
//!
//! Test utilities for Docdex.
//!
//! This crate provides:
//! - Fixtures that wire a document store to an index
//! - Crash simulation for journals and index writers
//! - Property-based generators for document batches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docdex_testkit::prelude::*;
//!
//! #[test]
//! fn drains_users() {
//!     let fixture = IndexFixture::in_memory(users_definition(), fast_config(2));
//!     fixture.seed("Users", 3);
//!     fixture.start();
//!     assert!(fixture.drain());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
