//! In-memory object cache and bump allocator
//!
//! Decompressed object bytes are expensive to reproduce (zlib inflate plus
//! a filesystem read) so recently-read objects are kept in a bounded LRU
//! cache, keyed by hash, and tracked for hit rate. Large compressed files
//! are read via `mmap` instead of a buffered read when the `mmap` feature
//! is enabled, avoiding a full copy into the page cache for objects that
//! are read once and discarded. [`SlabAllocator`] is a separate bump-pointer
//! arena, grounded on the original engine's `MemoryPool`, for short-lived
//! scratch buffers (tree diffing, delta building) that would otherwise
//! churn the system allocator once per object.

use crate::hash::Hash;
use bytes::Bytes;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Objects larger than this on disk are read via `mmap` rather than
/// `std::fs::read`, when the `mmap` feature is enabled.
pub const MMAP_THRESHOLD_BYTES: u64 = 64 * 1024;

/// Bounded cache of decompressed object bytes, by hash.
pub struct ObjectCache {
    entries: Mutex<clru::CLruCache<Hash, Bytes>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity must be nonzero");
        ObjectCache {
            entries: Mutex::new(clru::CLruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<Bytes> {
        let mut entries = self.entries.lock().expect("object cache poisoned");
        let found = entries.get(hash).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, hash: Hash, content: Bytes) {
        let mut entries = self.entries.lock().expect("object cache poisoned");
        entries.put(hash, content);
    }

    pub fn invalidate(&self, hash: &Hash) {
        let mut entries = self.entries.lock().expect("object cache poisoned");
        entries.pop(hash);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("object cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of `get` calls that found their hash already cached, in
    /// `[0.0, 1.0]`. `0.0` before any lookup has happened.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Read a file's raw bytes, using `mmap` for files at or above
/// [`MMAP_THRESHOLD_BYTES`] when the `mmap` feature is compiled in.
pub fn read_object_file(path: &Path) -> std::io::Result<Vec<u8>> {
    #[cfg(feature = "mmap")]
    {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() >= MMAP_THRESHOLD_BYTES {
            let file = std::fs::File::open(path)?;
            // SAFETY: the object store never mutates committed object files in
            // place (writes land via temp-file-then-rename), so the mapped
            // region cannot change out from under us while it's borrowed.
            let mmap = unsafe { memmap2::Mmap::map(&file)? };
            return Ok(mmap.to_vec());
        }
    }

    std::fs::read(path)
}

/// A file mapped read-only into memory, identified by the SHA-1 hash of
/// its contents.
///
/// Used where the caller wants to compare or hash large files without
/// copying them into a `Vec` first (e.g. checking a worktree file against
/// a blob already in the index).
pub struct MappedFile {
    mmap: memmap2::Mmap,
}

impl MappedFile {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        // SAFETY: the caller owns a read-only view; this type is only ever
        // used against worktree files that the current process isn't also
        // writing to concurrently.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(MappedFile { mmap })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn hash(&self) -> Hash {
        crate::hash::hash_bytes(&self.mmap)
    }

    /// Word-sized chunked content comparison, avoiding the byte-by-byte
    /// `PartialEq` on `[u8]` falling back to SIMD the platform may not have.
    pub fn content_eq(&self, other: &MappedFile) -> bool {
        mapped_content_eq(self.as_bytes(), other.as_bytes())
    }
}

fn mapped_content_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    const WORD: usize = std::mem::size_of::<usize>();
    let chunks = a.len() / WORD;
    let (a_words, a_rest) = a.split_at(chunks * WORD);
    let (b_words, b_rest) = b.split_at(chunks * WORD);

    for i in 0..chunks {
        let a_word = usize::from_ne_bytes(a_words[i * WORD..(i + 1) * WORD].try_into().unwrap());
        let b_word = usize::from_ne_bytes(b_words[i * WORD..(i + 1) * WORD].try_into().unwrap());
        if a_word != b_word {
            return false;
        }
    }

    a_rest == b_rest
}

/// One 64 KiB arena owned by a [`SlabAllocator`]. The backing `Box<[u8]>`
/// never moves or reallocates once pushed, so raw pointers into it stay
/// valid for the allocator's lifetime even as `blocks` itself grows.
struct Block {
    data: Box<[u8]>,
    used: std::sync::atomic::AtomicUsize,
}

impl Block {
    fn new(size: usize) -> Self {
        Block {
            data: vec![0u8; size].into_boxed_slice(),
            used: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

/// Bump-pointer arena allocator for short-lived scratch buffers, grounded
/// on the original engine's `MemoryPool` (`performance_engine.h`): requests
/// are served by advancing a cursor through 64 KiB blocks, new blocks are
/// appended on overflow, and `reset` rewinds every block's cursor to the
/// start without freeing the underlying allocations so they can be reused
/// by the next batch of work. A request larger than one block bypasses the
/// pool and is served (and, matching the original's no-op `deallocate`,
/// never reclaimed) straight from the system allocator.
pub struct SlabAllocator {
    block_size: usize,
    blocks: Mutex<Vec<Block>>,
}

/// Default block size, matching the original engine's `MemoryPool` default.
pub const SLAB_BLOCK_SIZE: usize = 64 * 1024;

impl SlabAllocator {
    pub fn new(block_size: usize) -> Self {
        SlabAllocator {
            block_size,
            blocks: Mutex::new(vec![Block::new(block_size)]),
        }
    }

    /// Allocate `size` zero-initialized bytes. Requests larger than the
    /// block size are leaked to a standalone buffer rather than consuming
    /// pool capacity; callers calling `reset` are expected to have stopped
    /// using buffers from the previous round, exactly as with the original
    /// pool's no-op `deallocate`.
    pub fn allocate(&self, size: usize) -> &mut [u8] {
        if size > self.block_size {
            return Box::leak(vec![0u8; size].into_boxed_slice());
        }

        let mut blocks = self.blocks.lock().expect("slab allocator poisoned");
        if blocks
            .last()
            .map(|block| block.used.load(Ordering::Relaxed) + size > block.data.len())
            .unwrap_or(true)
        {
            blocks.push(Block::new(self.block_size));
        }

        let current = blocks.last().expect("slab allocator always has a block");
        let start = current.used.fetch_add(size, Ordering::Relaxed);
        let ptr = current.data.as_ptr() as *mut u8;
        // SAFETY: `[start, start + size)` was just reserved by the
        // `fetch_add` above and no other call can observe the same range
        // until the next `reset`; `data`'s heap allocation is immovable for
        // the allocator's lifetime since `blocks` is only ever appended to.
        unsafe { std::slice::from_raw_parts_mut(ptr.add(start), size) }
    }

    /// Rewind every block's bump cursor to zero, making their bytes
    /// available for reuse by the next batch of allocations. Any slice
    /// previously returned by `allocate` must not be touched afterward.
    pub fn reset(&self) {
        let blocks = self.blocks.lock().expect("slab allocator poisoned");
        for block in blocks.iter() {
            block.used.store(0, Ordering::Relaxed);
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().expect("slab allocator poisoned").len()
    }
}

impl Default for SlabAllocator {
    fn default() -> Self {
        Self::new(SLAB_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = ObjectCache::new(4);
        let hash = crate::hash::hash_bytes(b"hello");
        cache.insert(hash, Bytes::from_static(b"hello"));
        assert_eq!(cache.get(&hash), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = ObjectCache::new(1);
        let a = crate::hash::hash_bytes(b"a");
        let b = crate::hash::hash_bytes(b"b");
        cache.insert(a, Bytes::from_static(b"a"));
        cache.insert(b, Bytes::from_static(b"b"));
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(Bytes::from_static(b"b")));
    }

    #[test]
    fn read_object_file_reads_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj");
        std::fs::write(&path, b"payload").unwrap();
        assert_eq!(read_object_file(&path).unwrap(), b"payload");
    }

    #[test]
    fn hit_rate_reflects_hits_and_misses() {
        let cache = ObjectCache::new(4);
        let hash = crate::hash::hash_bytes(b"tracked");
        assert_eq!(cache.hit_rate(), 0.0);

        cache.get(&hash);
        assert_eq!(cache.misses(), 1);

        cache.insert(hash, Bytes::from_static(b"tracked"));
        cache.get(&hash);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn mapped_file_hash_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj");
        std::fs::write(&path, b"mapped content").unwrap();

        let mapped = MappedFile::open(&path).unwrap();
        assert_eq!(mapped.hash(), crate::hash::hash_bytes(b"mapped content"));
    }

    #[test]
    fn mapped_file_content_eq_detects_a_single_byte_difference() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a");
        let path_b = dir.path().join("b");
        std::fs::write(&path_a, b"abcdefgh").unwrap();
        std::fs::write(&path_b, b"abcdefgx").unwrap();

        let a = MappedFile::open(&path_a).unwrap();
        let b = MappedFile::open(&path_b).unwrap();
        assert!(!a.content_eq(&b));

        std::fs::write(&path_b, b"abcdefgh").unwrap();
        let b = MappedFile::open(&path_b).unwrap();
        assert!(a.content_eq(&b));
    }

    #[test]
    fn slab_allocator_serves_allocations_from_one_block() {
        let pool = SlabAllocator::new(SLAB_BLOCK_SIZE);
        let a = pool.allocate(16);
        a.copy_from_slice(&[7u8; 16]);
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn slab_allocator_grows_a_new_block_on_overflow() {
        let pool = SlabAllocator::new(64);
        let _ = pool.allocate(48);
        let _ = pool.allocate(48);
        assert_eq!(pool.block_count(), 2);
    }

    #[test]
    fn slab_allocator_reset_reuses_existing_blocks() {
        let pool = SlabAllocator::new(64);
        let _ = pool.allocate(48);
        let _ = pool.allocate(48);
        assert_eq!(pool.block_count(), 2);

        pool.reset();
        let _ = pool.allocate(16);
        assert_eq!(pool.block_count(), 2);
    }

    #[test]
    fn slab_allocator_oversized_request_bypasses_the_pool() {
        let pool = SlabAllocator::new(64);
        let big = pool.allocate(128);
        assert_eq!(big.len(), 128);
        assert_eq!(pool.block_count(), 1);
    }
}
