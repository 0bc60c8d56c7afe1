//! Running one scenario against every storage backend.

use std::sync::Arc;

use ent_core::StorageRef;
use ent_storage::MemoryStorage;

use crate::fake_redis::FakeRedisServer;

/// A fresh instance of every backend, by name.
pub fn backends() -> Vec<(&'static str, StorageRef)> {
    vec![
        ("memory", Arc::new(MemoryStorage::new())),
        ("redis", Arc::new(FakeRedisServer::new().storage())),
    ]
}

/// Calls `f` with a fresh instance of every backend.
pub fn for_each_backend(mut f: impl FnMut(&'static str, StorageRef)) {
    for (name, storage) in backends() {
        f(name, storage);
    }
}
