//! # ent storage
//!
//! [`ent_core::Storage`] backends.
//!
//! - [`MemoryStorage`]: an ordered in-process keyspace, for tests and
//!   ephemeral data
//! - [`RedisStorage`]: entities as Redis hashes with `WATCH`/`MULTI`
//!   optimistic transactions
//!
//! Both follow the same write protocol: load the stored index fields and
//! version, compute index edits, reject unique collisions, then commit the
//! payload and every index edit at once.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ent_core::StorageRef;
//! use ent_storage::MemoryStorage;
//!
//! let storage: StorageRef = Arc::new(MemoryStorage::new());
//! assert!(storage.iterate_ids("user").next().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod memory;
pub mod redis;
mod scoped;

#[cfg(test)]
mod test_ent;

pub use memory::MemoryStorage;
pub use redis::{RedisConfig, RedisStorage, TcpTransport, Transport};
pub use scoped::{Changes, Keyspace, ScopedMap};
