//! # ent testkit
//!
//! Test utilities for ent.
//!
//! This crate provides:
//! - Entity fixtures written like generated code, with typed lookups
//! - An in-process Redis for exercising the Redis backend without a server
//! - Property-based test generators using proptest
//! - Helpers running one scenario against every backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ent_testkit::prelude::*;
//!
//! #[test]
//! fn test_on_every_backend() {
//!     for_each_backend(|name, storage| {
//!         let mut a = Account::new("ann", "ann@example.com", 1);
//!         a.create(&storage).unwrap();
//!         // ... assertions, labelled with `name`
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backends;
pub mod fake_redis;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::*;
    pub use crate::fake_redis::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use backends::*;
pub use fake_redis::*;
pub use fixtures::*;
pub use generators::*;
