//! LRU cache for inflated chunks.

use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::ElementBuffer;
use crate::context::ObjectId;

/// Cache key for chunks: (variable, chunk coordinates).
pub type ChunkKey = (ObjectId, Vec<u64>);

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of inflated chunks with memory-bounded eviction.
pub struct ChunkCache {
    cache: LruCache<ChunkKey, ElementBuffer>,
    memory_limit: usize,
    current_memory: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ChunkCache {
    /// Create a new chunk cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns `Some(chunk)` on a hit and records the miss otherwise.
    pub fn get(&mut self, key: &ChunkKey) -> Option<&ElementBuffer> {
        if let Some(data) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(data)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or replace a chunk, evicting least recently used entries to
    /// stay under the memory limit. Chunks larger than the limit are not cached.
    pub fn insert(&mut self, key: ChunkKey, data: ElementBuffer) {
        self.invalidate(&key);
        let data_size = data.memory_bytes();
        if data_size > self.memory_limit {
            return;
        }

        while self.current_memory + data_size > self.memory_limit {
            match self.cache.pop_lru() {
                Some((_, evicted)) => {
                    self.current_memory = self.current_memory.saturating_sub(evicted.memory_bytes());
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        self.cache.put(key, data);
        self.current_memory += data_size;
    }

    /// Drop one chunk, if cached.
    pub fn invalidate(&mut self, key: &ChunkKey) {
        if let Some(old) = self.cache.pop(key) {
            self.current_memory = self.current_memory.saturating_sub(old.memory_bytes());
        }
    }

    /// Drop every cached chunk of one variable.
    pub fn invalidate_variable(&mut self, id: ObjectId) {
        let keys: Vec<ChunkKey> = self
            .cache
            .iter()
            .filter(|((var, _), _)| *var == id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;

    fn chunk(values: &[f32]) -> ElementBuffer {
        ElementBuffer::packed(4, values.iter().flat_map(|v| v.to_le_bytes()).collect()).unwrap()
    }

    fn var_id(ctx: &EngineContext) -> ObjectId {
        let engine = ctx.next_engine_id();
        ctx.next_object_id(engine)
    }

    #[test]
    fn test_cache_insert_and_get() {
        let ctx = EngineContext::new();
        let mut cache = ChunkCache::new(1024 * 1024);
        let key = (var_id(&ctx), vec![0, 0]);
        let data = chunk(&[1.0, 2.0, 3.0, 4.0]);

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), data.clone());
        assert_eq!(cache.get(&key), Some(&data));
    }

    #[test]
    fn test_cache_lru_eviction() {
        let ctx = EngineContext::new();
        let id = var_id(&ctx);
        // 64 bytes = four 16-byte chunks
        let mut cache = ChunkCache::new(64);
        for i in 0..10u64 {
            cache.insert((id, vec![i]), chunk(&[i as f32; 4]));
        }

        assert!(cache.get(&(id, vec![0])).is_none());
        assert!(cache.get(&(id, vec![9])).is_some());
        assert!(cache.stats().evictions > 0);
        assert!(cache.memory_usage() <= 64);
    }

    #[test]
    fn test_replacing_a_chunk_keeps_memory_accurate() {
        let ctx = EngineContext::new();
        let key = (var_id(&ctx), vec![3]);
        let mut cache = ChunkCache::new(1024);
        cache.insert(key.clone(), chunk(&[1.0; 8]));
        cache.insert(key.clone(), chunk(&[2.0; 8]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 32);
    }

    #[test]
    fn test_cache_stats() {
        let ctx = EngineContext::new();
        let id = var_id(&ctx);
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert((id, vec![0]), chunk(&[1.0, 2.0]));

        cache.get(&(id, vec![0]));
        cache.get(&(id, vec![1]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidate_variable() {
        let ctx = EngineContext::new();
        let (a, b) = (var_id(&ctx), var_id(&ctx));
        let mut cache = ChunkCache::new(1024 * 1024);
        cache.insert((a, vec![0]), chunk(&[1.0]));
        cache.insert((a, vec![1]), chunk(&[2.0]));
        cache.insert((b, vec![0]), chunk(&[3.0]));

        cache.invalidate_variable(a);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 4);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_chunk_is_not_cached() {
        let ctx = EngineContext::new();
        let mut cache = ChunkCache::new(8);
        cache.insert((var_id(&ctx), vec![0]), chunk(&[1.0; 4]));
        assert!(cache.is_empty());
        assert_eq!(cache.memory_limit(), 8);
    }
}
