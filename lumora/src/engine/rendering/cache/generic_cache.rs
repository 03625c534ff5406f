use dashmap::DashMap;
use log::warn;
use lumora_utils::RateLimiter;
use std::fmt::Debug;
use std::sync::Arc;

const MISS_REPORT_INTERVAL: usize = 1000;

pub trait CacheType: Debug + Send + Sync + 'static {
    fn name() -> &'static str;
}

/// GPU-side objects keyed by the id of the handle they were uploaded for.
#[derive(Debug)]
pub struct ResourceCache<T: CacheType> {
    data: DashMap<u32, Arc<T>>,
    misses: RateLimiter,
}

impl<T: CacheType> Default for ResourceCache<T> {
    fn default() -> Self {
        Self {
            data: DashMap::new(),
            misses: RateLimiter::new(MISS_REPORT_INTERVAL),
        }
    }
}

impl<T: CacheType> ResourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<Arc<T>> {
        let hit = self.data.get(&id).map(|v| v.clone());
        if hit.is_some() {
            return hit;
        }
        if let Some(misses) = self.misses.hit() {
            warn!("[{} Cache] No entry for handle #{id}, Misses: {misses}", T::name());
        }
        None
    }

    pub fn contains(&self, id: u32) -> bool {
        self.data.contains_key(&id)
    }

    pub fn insert(&self, id: u32, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.data.insert(id, value.clone());
        value
    }

    /// Returns the entry for `id`, creating it with `upload` if there is none yet. Racing
    /// callers for the same id wait for the first upload instead of doing their own.
    pub fn get_or_try_insert_with<E>(
        &self,
        id: u32,
        upload: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        self.data
            .entry(id)
            .or_try_insert_with(|| upload().map(Arc::new))
            .map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
