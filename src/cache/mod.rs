//! Decomposition cache
//!
//! LRU map from rank to eigendecomposition for one (X, σ, configuration)
//! combination, so rank sweeps and repeated fits do not redo the O(N²k)
//! decomposition. A cached exact decomposition serves every lower rank by
//! truncation: the leading eigenpairs of an exact solve do not depend on how
//! many were kept.

use crate::core::Result;
use crate::decomposition::Eigendecomposition;
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache of decompositions keyed by rank
pub struct DecompositionCache {
    cache: LruCache<usize, Arc<Eigendecomposition>>,
    hits: u64,
    misses: u64,
}

impl DecompositionCache {
    /// Create a cache holding at most `capacity` decompositions
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a decomposition of exactly `rank`, or truncate a larger exact one
    pub fn get(&mut self, rank: usize) -> Option<Arc<Eigendecomposition>> {
        if let Some(found) = self.cache.get(&rank) {
            self.hits += 1;
            return Some(Arc::clone(found));
        }

        let source = self
            .cache
            .iter()
            .filter(|&(&cached_rank, d)| cached_rank > rank && d.method().is_exact())
            .min_by_key(|&(&cached_rank, _)| cached_rank)
            .map(|(_, d)| Arc::clone(d));

        match source.and_then(|d| d.truncate(rank).ok()) {
            Some(truncated) => {
                debug!("Serving rank {rank} by truncating a cached exact decomposition");
                self.hits += 1;
                let truncated = Arc::new(truncated);
                self.cache.put(rank, Arc::clone(&truncated));
                Some(truncated)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, decomposition: Eigendecomposition) -> Arc<Eigendecomposition> {
        let entry = Arc::new(decomposition);
        self.cache.put(entry.rank(), Arc::clone(&entry));
        entry
    }

    /// Return the cached decomposition for `rank` or build it with `compute`
    pub fn get_or_compute<F>(&mut self, rank: usize, compute: F) -> Result<Arc<Eigendecomposition>>
    where
        F: FnOnce(usize) -> Result<Eigendecomposition>,
    {
        if let Some(found) = self.get(rank) {
            return Ok(found);
        }
        let decomposition = compute(rank)?;
        Ok(self.put(decomposition))
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}
