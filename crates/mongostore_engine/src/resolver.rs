//! Entity kind to collection resolution.

use crate::connection::LiveConnection;
use crate::driver::DriverCollection;
use mongostore_core::EntityKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct ResolverCache {
    generation: u64,
    handles: HashMap<String, Arc<dyn DriverCollection>>,
}

/// Memoizes collection handles for the current connection.
///
/// The cache is tagged with the generation of the connection that produced
/// it. A lookup against a different generation starts from an empty cache, so
/// a handle bound to a replaced connection is never served.
#[derive(Default)]
pub struct CollectionResolver {
    cache: Mutex<ResolverCache>,
}

impl CollectionResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collection for `kind` on `live`.
    ///
    /// The collection name is `base_name`, or `name` when the kind has no base.
    pub fn resolve(&self, live: &LiveConnection, kind: &EntityKind) -> Arc<dyn DriverCollection> {
        let name = kind.collection_name();
        let mut cache = self.cache.lock();

        if cache.generation != live.generation() {
            cache.handles.clear();
            cache.generation = live.generation();
        }

        Arc::clone(
            cache
                .handles
                .entry(name)
                .or_insert_with_key(|name| live.handle().collection(name)),
        )
    }

    /// Drops every cached handle.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock();
        cache.handles.clear();
        cache.generation = 0;
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.cache.lock().handles.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
