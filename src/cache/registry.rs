//! Region Registry Module
//!
//! Maps region names to regions, creating each region exactly once.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::cache::region::{CacheKey, Region};

type RegionSlot = Arc<dyn Any + Send + Sync>;

// == Registry ==
/// Directory of regions keyed by name.
///
/// A region is identified by its name together with its key and value types,
/// so `"users"` holding `String -> u64` and `"users"` holding `u32 -> String`
/// are two independent regions. Regions are never removed once created.
#[derive(Default)]
pub struct Registry {
    regions: RwLock<HashMap<(String, TypeId), RegionSlot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns the region called `name`, creating it on first use.
    ///
    /// Concurrent first calls for the same name all receive the same instance.
    pub fn region<K, V>(&self, name: &str) -> Arc<Region<K, V>>
    where
        K: CacheKey,
        V: Send + Sync + 'static,
    {
        let slot = (name.to_string(), TypeId::of::<Region<K, V>>());

        if let Some(region) = lookup::<K, V>(&self.regions.read(), &slot) {
            return region;
        }

        let mut regions = self.regions.write();
        // Another caller may have created it between the two locks.
        if let Some(region) = lookup::<K, V>(&regions, &slot) {
            return region;
        }

        let region = Region::<K, V>::new(name);
        regions.insert(slot, Arc::clone(&region) as RegionSlot);
        region
    }

    /// Number of regions created so far.
    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.read().is_empty()
    }
}

fn lookup<K, V>(
    regions: &HashMap<(String, TypeId), RegionSlot>,
    slot: &(String, TypeId),
) -> Option<Arc<Region<K, V>>>
where
    K: CacheKey,
    V: Send + Sync + 'static,
{
    regions
        .get(slot)
        .and_then(|region| Arc::clone(region).downcast::<Region<K, V>>().ok())
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Returns the process-wide region called `name`, creating it on first use.
pub fn cache<K, V>(name: &str) -> Arc<Region<K, V>>
where
    K: CacheKey,
    V: Send + Sync + 'static,
{
    REGISTRY.get_or_init(Registry::new).region(name)
}
