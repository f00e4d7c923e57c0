//! Structural object cache.
//!
//! Layouts and pipelines are looked up by their full descriptor. Cached
//! objects belong to the cache and are destroyed when it is cleared.

use crate::{
    BindGroupLayout, BindGroupLayoutDesc, ComputePipeline, ComputePipelineDesc, GraphicsError,
    PipelineLayout, PipelineLayoutDesc, RenderPipeline, RenderPipelineDesc,
};
use std::collections::hash_map::{Entry, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub(crate) struct ObjectCache {
    pub bind_group_layouts: HashMap<BindGroupLayoutDesc, BindGroupLayout>,
    pub pipeline_layouts: HashMap<PipelineLayoutDesc, PipelineLayout>,
    pub render_pipelines: HashMap<RenderPipelineDesc, RenderPipeline>,
    pub compute_pipelines: HashMap<ComputePipelineDesc, ComputePipeline>,
    pub stats: CacheStats,
}

/// Objects drained from the cache, in destruction order.
pub(crate) struct Evicted {
    pub render_pipelines: Vec<RenderPipeline>,
    pub compute_pipelines: Vec<ComputePipeline>,
    pub pipeline_layouts: Vec<PipelineLayout>,
    pub bind_group_layouts: Vec<BindGroupLayout>,
}

/// Looks `key` up in the map `select` picks out of `cache`, creating the
/// value on a miss.
///
/// The lock is not held while `create` runs. When another thread fills the
/// slot first, the fresh value goes to `discard` and the cached one wins.
pub(crate) fn get_or_create<T, K, V>(
    cache: &Mutex<T>,
    select: impl Fn(&mut T) -> (&mut CacheStats, &mut HashMap<K, V>),
    key: &K,
    create: impl FnOnce() -> Result<V, GraphicsError>,
    discard: impl FnOnce(V),
) -> Result<V, GraphicsError>
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    {
        let mut guard = lock(cache);
        let (stats, map) = select(&mut *guard);
        if let Some(&value) = map.get(key) {
            stats.hits += 1;
            return Ok(value);
        }
    }

    let value = create()?;
    let mut guard = lock(cache);
    let (stats, map) = select(&mut *guard);
    match map.entry(key.clone()) {
        Entry::Occupied(entry) => {
            stats.hits += 1;
            let cached = *entry.get();
            drop(guard);
            discard(value);
            Ok(cached)
        }
        Entry::Vacant(entry) => {
            stats.misses += 1;
            entry.insert(value);
            Ok(value)
        }
    }
}

/// Locks the cache, recovering it if a panic poisoned the lock.
pub(crate) fn lock<T>(cache: &Mutex<T>) -> MutexGuard<'_, T> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ObjectCache {
    pub fn len(&self) -> usize {
        self.bind_group_layouts.len()
            + self.pipeline_layouts.len()
            + self.render_pipelines.len()
            + self.compute_pipelines.len()
    }

    pub fn drain(&mut self) -> Evicted {
        Evicted {
            render_pipelines: self.render_pipelines.drain().map(|(_, v)| v).collect(),
            compute_pipelines: self.compute_pipelines.drain().map(|(_, v)| v).collect(),
            pipeline_layouts: self.pipeline_layouts.drain().map(|(_, v)| v).collect(),
            bind_group_layouts: self.bind_group_layouts.drain().map(|(_, v)| v).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Slots = (CacheStats, HashMap<&'static str, u32>);

    fn slots(cache: &mut Slots) -> (&mut CacheStats, &mut HashMap<&'static str, u32>) {
        (&mut cache.0, &mut cache.1)
    }

    #[test]
    fn lookup_creates_once() {
        let cache = Mutex::new(Slots::default());
        let mut created = 0;
        for _ in 0..3 {
            let value = get_or_create(
                &cache,
                slots,
                &"key",
                || {
                    created += 1;
                    Ok(7u32)
                },
                |_| unreachable!(),
            );
            assert_eq!(value, Ok(7));
        }
        assert_eq!(created, 1);
        assert_eq!(lock(&cache).0, CacheStats { hits: 2, misses: 1 });
    }

    #[test]
    fn failed_creation_is_not_cached() {
        let cache = Mutex::new(Slots::default());
        let err = GraphicsError::native(crate::Backend::Null, 1, "boom");
        let result = get_or_create(&cache, slots, &"key", || Err(err.clone()), |_| {});
        assert_eq!(result, Err(err));
        assert!(lock(&cache).1.is_empty());
    }

    #[test]
    fn creation_runs_without_the_lock() {
        let cache = Mutex::new(Slots::default());
        let value = get_or_create(
            &cache,
            slots,
            &"key",
            || {
                assert!(cache.try_lock().is_ok());
                Ok(3)
            },
            |_| {},
        );
        assert_eq!(value, Ok(3));
    }

    #[test]
    fn racing_creation_keeps_the_first_value() {
        let cache = Mutex::new(Slots::default());
        let mut discarded = None;
        let value = get_or_create(
            &cache,
            slots,
            &"key",
            || {
                lock(&cache).1.insert("key", 1);
                Ok(2)
            },
            |value| discarded = Some(value),
        );
        assert_eq!(value, Ok(1));
        assert_eq!(discarded, Some(2));
    }

    #[test]
    fn poisoned_cache_is_recovered() {
        let cache = Mutex::new(Slots::default());
        let _ = std::panic::catch_unwind(|| {
            let _guard = cache.lock().unwrap();
            panic!("usage error");
        });
        assert!(cache.is_poisoned());
        let value = get_or_create(&cache, slots, &"key", || Ok(5), |_| {});
        assert_eq!(value, Ok(5));
    }
}
