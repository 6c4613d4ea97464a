use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

/// Default cache capacity in number of decoded blocks.
///
/// A point lookup touches at most a 3×3 neighbourhood, which can straddle
/// four tiles per channel for planar files; 64 blocks keeps a few channels'
/// worth of neighbourhoods resident.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 64;

/// Identifies one tile or strip of one sub-image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// Index of the sub-image (IFD) in file order
    pub ifd_index: u32,
    /// Tile or strip number within that sub-image
    pub block_id: u64,
}

impl BlockKey {
    pub const fn new(ifd_index: u32, block_id: u64) -> Self {
        Self {
            ifd_index,
            block_id,
        }
    }
}

/// LRU cache of decoded tiles/strips for one tagged-raster resource.
///
/// Consecutive point queries mostly land in the same block, and biquadratic
/// lookups read nine neighbouring samples; without this cache every sample
/// would cost a read plus a decompression.
///
/// Features:
/// - Keyed by (sub-image, block), so sibling grids of one file share it
/// - LRU eviction when the cache reaches capacity
/// - Entries are only ever invalidated by eviction
pub struct BlockCache {
    /// Decoded blocks indexed by key
    cache: LruCache<BlockKey, Bytes>,
    /// Lookups served from the cache
    hits: u64,
    /// Lookups that required a decode
    misses: u64,
}

impl BlockCache {
    /// Create a new BlockCache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// Create a new BlockCache holding at most `capacity` blocks.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a block, refreshing its recency on a hit.
    pub fn get(&mut self, key: BlockKey) -> Option<Bytes> {
        match self.cache.get(&key) {
            Some(data) => {
                self.hits += 1;
                Some(data.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a decoded block, evicting the least recently used one if full.
    pub fn insert(&mut self, key: BlockKey, data: Bytes) {
        self.cache.put(key, data);
    }

    /// Return the cached block or decode it with `decode` and cache the result.
    ///
    /// Decode failures are returned as-is and nothing is cached.
    pub fn get_or_decode<E>(
        &mut self,
        key: BlockKey,
        decode: impl FnOnce() -> Result<Bytes, E>,
    ) -> Result<Bytes, E> {
        if let Some(data) = self.get(key) {
            return Ok(data);
        }
        let data = decode()?;
        self.insert(key, data.clone());
        Ok(data)
    }

    /// Whether a block is resident (does not touch recency).
    pub fn contains(&self, key: BlockKey) -> bool {
        self.cache.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}
