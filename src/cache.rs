// This file is part of the egtb library.
// Copyright (C) 2017-2025 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! A bounded cache of fixed size table chunks, shared by all probing
//! threads.
//!
//! Slots live in an arena and are linked into two lists at once: the global
//! LRU list, and the list of the bucket their chunk hashes to. Buckets are
//! per table and side, so finding a cached chunk only scans a handful of
//! slots. Evicting takes the tail of the global list.
//!
//! Locks are always taken in the order bucket, global list, slot data. File
//! reads happen with only the slot data lock held.

use std::{
    fmt,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tracing::trace;

use crate::{color::Color, errors::ProbeResult};

/// Extra bytes per slot beyond the chunk size, available to decoders.
pub const DECODE_HEADROOM: usize = 256;

/// Cache dimensions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CacheConfig {
    /// Total bytes of chunk buffers.
    pub capacity: usize,
    /// Bytes per chunk. Compressed tables must use the same block size.
    pub chunk_size: usize,
    /// Buckets per table and side.
    pub buckets: usize,
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            capacity: 8 * 1024 * 1024,
            chunk_size: 8192,
            buckets: 16,
        }
    }
}

impl CacheConfig {
    /// Number of slots that fit into the capacity.
    pub fn slots(&self) -> usize {
        if self.capacity == 0 {
            0
        } else {
            (self.capacity / (self.chunk_size + DECODE_HEADROOM)).max(1)
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Chunks read or decoded from files, cached or not.
    pub reads: u64,
    pub io_errors: u64,
    pub bytes_allocated: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    reads: AtomicU64,
    io_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Identity of a chunk: table id, side to move and chunk number.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChunkKey {
    pub table: u16,
    pub side: Color,
    pub chunk: u64,
}

impl ChunkKey {
    const EMPTY: u64 = u64::MAX;
    const CHUNK_BITS: u32 = 47;

    fn pack(self) -> u64 {
        debug_assert!(self.chunk < 1 << ChunkKey::CHUNK_BITS);
        u64::from(self.table) << (ChunkKey::CHUNK_BITS + 1)
            | (self.side.index() as u64) << ChunkKey::CHUNK_BITS
            | self.chunk
    }

    fn unpack(packed: u64) -> ChunkKey {
        ChunkKey {
            table: (packed >> (ChunkKey::CHUNK_BITS + 1)) as u16,
            side: Color::from_white(packed >> ChunkKey::CHUNK_BITS & 1 == 0),
            chunk: packed & ((1 << ChunkKey::CHUNK_BITS) - 1),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct SlotId(u32);

impl SlotId {
    const NONE: u32 = u32::MAX;

    fn index(self) -> usize {
        self.0 as usize
    }

    fn load(link: &AtomicU32) -> Option<SlotId> {
        match link.load(Ordering::Relaxed) {
            SlotId::NONE => None,
            id => Some(SlotId(id)),
        }
    }

    fn store(link: &AtomicU32, id: Option<SlotId>) {
        link.store(id.map_or(SlotId::NONE, |id| id.0), Ordering::Relaxed);
    }
}

struct Slot {
    /// Packed [`ChunkKey`]. Changed only while holding the lock of the
    /// bucket the slot is (or will be) linked into.
    key: AtomicU64,
    /// Bucket list links, protected by the bucket lock.
    bucket_prev: AtomicU32,
    bucket_next: AtomicU32,
    data: Mutex<Box<[u8]>>,
}

#[derive(Debug, Copy, Clone, Default)]
struct Links {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Global LRU list, most recently used at the head, and the free stack.
struct Lru {
    links: Vec<Links>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    free: Vec<SlotId>,
}

impl Lru {
    fn unlink(&mut self, id: SlotId) {
        let Links { prev, next } = self.links[id.index()];
        match prev {
            Some(prev) => self.links[prev.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.links[next.index()].prev = prev,
            None => self.tail = prev,
        }
        self.links[id.index()] = Links::default();
    }

    fn push_front(&mut self, id: SlotId) {
        self.links[id.index()] = Links {
            prev: None,
            next: self.head,
        };
        match self.head {
            Some(head) => self.links[head.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn touch(&mut self, id: SlotId) {
        if self.head != Some(id) {
            self.unlink(id);
            self.push_front(id);
        }
    }
}

#[derive(Default)]
struct BucketList {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

/// The chunk cache.
pub struct BlockCache {
    config: CacheConfig,
    tables: usize,
    slots: Box<[Slot]>,
    lru: Mutex<Lru>,
    buckets: Box<[Mutex<BucketList>]>,
    counters: Counters,
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("config", &self.config)
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl BlockCache {
    /// Allocates all slots for table ids `0..tables`.
    pub fn new(config: CacheConfig, tables: usize) -> BlockCache {
        let n = config.slots();
        let slots: Box<[Slot]> = (0..n)
            .map(|_| Slot {
                key: AtomicU64::new(ChunkKey::EMPTY),
                bucket_prev: AtomicU32::new(SlotId::NONE),
                bucket_next: AtomicU32::new(SlotId::NONE),
                data: Mutex::new(vec![0; config.chunk_size + DECODE_HEADROOM].into_boxed_slice()),
            })
            .collect();

        let buckets = (0..tables * 2 * config.buckets.max(1))
            .map(|_| Mutex::new(BucketList::default()))
            .collect();

        trace!(slots = n, chunk_size = config.chunk_size, "allocated chunk cache");

        BlockCache {
            config,
            tables,
            slots,
            lru: Mutex::new(Lru {
                links: vec![Links::default(); n],
                head: None,
                tail: None,
                // Pop the lowest slots first.
                free: (0..n as u32).rev().map(SlotId).collect(),
            }),
            buckets,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            reads: self.counters.reads.load(Ordering::Relaxed),
            io_errors: self.counters.io_errors.load(Ordering::Relaxed),
            bytes_allocated: (self.slots.len() * (self.config.chunk_size + DECODE_HEADROOM)) as u64,
        }
    }

    fn bucket(&self, key: ChunkKey) -> &Mutex<BucketList> {
        let table = usize::from(key.table) % self.tables.max(1);
        let n = self.config.buckets.max(1);
        &self.buckets[(table * 2 + key.side.index()) * n + (key.chunk % n as u64) as usize]
    }

    fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    fn bucket_unlink(&self, list: &mut BucketList, id: SlotId) {
        let slot = self.slot(id);
        let prev = SlotId::load(&slot.bucket_prev);
        let next = SlotId::load(&slot.bucket_next);
        match prev {
            Some(prev) => SlotId::store(&self.slot(prev).bucket_next, next),
            None => list.head = next,
        }
        match next {
            Some(next) => SlotId::store(&self.slot(next).bucket_prev, prev),
            None => list.tail = prev,
        }
        SlotId::store(&slot.bucket_prev, None);
        SlotId::store(&slot.bucket_next, None);
    }

    fn bucket_push_front(&self, list: &mut BucketList, id: SlotId) {
        let slot = self.slot(id);
        SlotId::store(&slot.bucket_prev, None);
        SlotId::store(&slot.bucket_next, list.head);
        match list.head {
            Some(head) => SlotId::store(&self.slot(head).bucket_prev, Some(id)),
            None => list.tail = Some(id),
        }
        list.head = Some(id);
    }

    fn bucket_find(&self, list: &BucketList, packed: u64) -> Option<SlotId> {
        let mut cursor = list.head;
        while let Some(id) = cursor {
            let slot = self.slot(id);
            if slot.key.load(Ordering::Relaxed) == packed {
                return Some(id);
            }
            cursor = SlotId::load(&slot.bucket_next);
        }
        None
    }

    /// Reads `N` bytes at `offset` within the chunk `key`.
    ///
    /// On a miss, `fill` is called to read the chunk into a buffer of
    /// [`CacheConfig::chunk_size`] bytes (plus headroom), returning the
    /// number of valid bytes.
    ///
    /// # Errors
    ///
    /// Errors from `fill` are passed through. The slot is returned to the
    /// free list.
    pub fn read<const N: usize, F>(&self, key: ChunkKey, offset: usize, fill: F) -> ProbeResult<[u8; N]>
    where
        F: FnOnce(&mut [u8]) -> ProbeResult<usize>,
    {
        let packed = key.pack();
        let bucket = self.bucket(key);

        {
            let mut list = bucket.lock();
            if let Some(id) = self.bucket_find(&list, packed) {
                if list.head != Some(id) {
                    self.bucket_unlink(&mut list, id);
                    self.bucket_push_front(&mut list, id);
                }
                self.lru.lock().touch(id);
                Counters::bump(&self.counters.hits);
                let data = self.slot(id).data.lock();
                return Ok(extract(&data, offset));
            }
        }

        Counters::bump(&self.counters.misses);
        trace!(table = key.table, side = %key.side, chunk = key.chunk, "chunk cache miss");

        let Some(id) = self.acquire_slot() else {
            // Caching disabled.
            let mut buf = vec![0; self.config.chunk_size + DECODE_HEADROOM];
            let filled = self.fill(&mut buf, fill)?;
            ensure!(offset + N <= filled);
            return Ok(extract(&buf, offset));
        };

        let result = {
            let mut data = self.slot(id).data.lock();
            self.fill(&mut data, fill).and_then(|filled| {
                ensure!(offset + N <= filled);
                Ok(extract(&data, offset))
            })
        };

        match result {
            Ok(bytes) => {
                let mut list = bucket.lock();
                self.slot(id).key.store(packed, Ordering::Relaxed);
                self.bucket_push_front(&mut list, id);
                self.lru.lock().push_front(id);
                Ok(bytes)
            }
            Err(error) => {
                self.lru.lock().free.push(id);
                Err(error)
            }
        }
    }

    fn fill<F>(&self, buf: &mut [u8], fill: F) -> ProbeResult<usize>
    where
        F: FnOnce(&mut [u8]) -> ProbeResult<usize>,
    {
        Counters::bump(&self.counters.reads);
        fill(buf).inspect_err(|_| Counters::bump(&self.counters.io_errors))
    }

    /// Takes a slot from the free stack, or evicts the least recently used
    /// slot. Returns `None` if there are no slots at all.
    fn acquire_slot(&self) -> Option<SlotId> {
        loop {
            let (tail, packed) = {
                let mut lru = self.lru.lock();
                if let Some(id) = lru.free.pop() {
                    return Some(id);
                }
                let tail = lru.tail?;
                (tail, self.slot(tail).key.load(Ordering::Relaxed))
            };

            // Relock in order. Someone else may have evicted or touched the
            // tail in the meantime.
            let key = ChunkKey::unpack(packed);
            let mut list = self.bucket(key).lock();
            let mut lru = self.lru.lock();
            if lru.tail != Some(tail) || self.slot(tail).key.load(Ordering::Relaxed) != packed {
                continue;
            }

            self.bucket_unlink(&mut list, tail);
            lru.unlink(tail);
            self.slot(tail).key.store(ChunkKey::EMPTY, Ordering::Relaxed);
            Counters::bump(&self.counters.evictions);
            trace!(table = key.table, side = %key.side, chunk = key.chunk, "evicted chunk");
            return Some(tail);
        }
    }

    /// Number of chunks currently cached.
    pub fn resident(&self) -> usize {
        self.slots.len() - self.lru.lock().free.len()
    }

    /// Checks whether a chunk is cached, without touching it.
    pub fn contains(&self, key: ChunkKey) -> bool {
        let list = self.bucket(key).lock();
        self.bucket_find(&list, key.pack()).is_some()
    }
}

fn extract<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0; N];
    bytes.copy_from_slice(&data[offset..offset + N]);
    bytes
}
