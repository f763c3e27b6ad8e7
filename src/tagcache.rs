#![allow(dead_code)]

use log::*;
use modular_bitfield::prelude::*;
use std::collections::{HashMap, HashSet};

/// Packed valid/dirty state of a single [`CacheRecord`].
///
/// Only two bits are meaningful; the rest is padding so the record's state
/// machine (Invalid -> Clean -> Dirty) fits in a byte.
#[bitfield(bits = 8)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RecordFlags {
    pub valid: bool,
    pub dirty: bool,
    #[skip]
    __: B6,
}

/// A single resident line in the tag cache.
///
/// `tableaddr` identifies which `(level, line_number)` this record caches;
/// `data_line_accessed` tracks the 64-byte sub-regions touched while this
/// record has been resident, and is only consulted when spatial/temporal
/// accounting is enabled.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    flags: RecordFlags,
    pub tableaddr: (usize, u64),
    pub data_line_accessed: HashSet<u64>,
}

impl CacheRecord {
    fn empty() -> CacheRecord {
        CacheRecord {
            flags: RecordFlags::new(),
            tableaddr: (0, 0),
            data_line_accessed: HashSet::new(),
        }
    }

    pub fn valid(&self) -> bool {
        self.flags.valid()
    }

    pub fn dirty(&self) -> bool {
        self.flags.dirty()
    }
}

/// A set-associative cache fronting every level of a [`crate::tagmemory::TagMemory`].
///
/// Replacement is a single global round-robin counter shared across every
/// set: a real LRU is explicitly not part of this model.
pub struct TagCache {
    assoc: usize,
    waylines: usize,
    line_shift: u32,
    spatial_temporal: bool,
    records: Vec<Vec<CacheRecord>>,
    next_way: usize,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_writebacks: u64,
    pub spatial_hits: HashMap<usize, u64>,
    pub temporal_hits: HashMap<usize, u64>,
}

impl TagCache {
    /// Builds an empty cache. `linesize` is in bits and must be a power of
    /// two; `waylines = (size / assoc) / (linesize / 8)`.
    pub fn new(size: usize, assoc: usize, linesize: usize, spatial_temporal: bool) -> TagCache {
        let waylines = (size / assoc) / (linesize / 8);
        TagCache {
            assoc,
            waylines,
            line_shift: linesize.trailing_zeros(),
            spatial_temporal,
            records: vec![vec![CacheRecord::empty(); assoc]; waylines],
            next_way: 0,
            cache_hits: 0,
            cache_misses: 0,
            cache_writebacks: 0,
            spatial_hits: HashMap::new(),
            temporal_hits: HashMap::new(),
        }
    }

    fn line_number(&self, bit_addr: u64) -> u64 {
        bit_addr >> self.line_shift
    }

    fn find(&self, lvl: usize, line_number: u64) -> Option<(usize, usize)> {
        let set = (line_number % self.waylines as u64) as usize;
        for (way, record) in self.records[set].iter().enumerate() {
            if record.valid() && record.tableaddr == (lvl, line_number) {
                return Some((set, way));
            }
        }
        None
    }

    /// Probes the cache for `(lvl, bitAddr)`. `create` only affects miss
    /// accounting: a miss triggered by creating a subtree that didn't exist
    /// before is not counted as an ordinary cache miss.
    pub fn access(&mut self, lvl: usize, bit_addr: u64, write: bool, data_line_addr: u64, count_access: bool, create: bool) {
        let line_number = self.line_number(bit_addr);
        let set = (line_number % self.waylines as u64) as usize;
        trace!("cache access: lvl={lvl} bitAddr={bit_addr:#x} lineNumber={line_number:#x}");

        match self.find(lvl, line_number) {
            Some((_, way)) => {
                self.cache_hits += 1;
                if count_access && self.spatial_temporal {
                    let sub_region = data_line_addr >> 6;
                    let record = &mut self.records[set][way];
                    if record.data_line_accessed.contains(&sub_region) {
                        *self.temporal_hits.entry(lvl).or_insert(0) += 1;
                    } else {
                        *self.spatial_hits.entry(lvl).or_insert(0) += 1;
                        record.data_line_accessed.insert(sub_region);
                    }
                }
                if write {
                    self.records[set][way].flags.set_dirty(true);
                }
            }
            None => {
                self.next_way += 1;
                let victim = self.next_way % self.assoc;
                if self.records[set][victim].dirty() {
                    self.cache_writebacks += 1;
                }
                if !create {
                    self.cache_misses += 1;
                }
                let mut record = CacheRecord::empty();
                record.flags.set_valid(true);
                record.tableaddr = (lvl, line_number);
                if write {
                    record.flags.set_dirty(true);
                }
                self.records[set][victim] = record;
            }
        }
    }

    /// Clears the dirty bit of a resident line without accounting a
    /// writeback. No-op if the line is not currently cached. Used by the
    /// empty-leaf optimisation to discard a subtree that has just collapsed
    /// to all zeros.
    pub fn clean(&mut self, lvl: usize, bit_addr: u64) {
        let line_number = self.line_number(bit_addr);
        if let Some((set, way)) = self.find(lvl, line_number) {
            self.records[set][way].flags.set_dirty(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache() -> TagCache {
        // 64 bytes / 2-way / 64-bit lines -> waylines = (64/2)/(64/8) = 4
        TagCache::new(64, 2, 64, false)
    }

    #[test]
    fn first_access_to_a_line_is_always_a_miss() {
        let mut cache = small_cache();
        cache.access(0, 0, false, 0, true, false);
        assert_eq!(cache.cache_misses, 1);
        assert_eq!(cache.cache_hits, 0);
    }

    #[test]
    fn repeat_access_to_a_resident_line_hits() {
        let mut cache = small_cache();
        cache.access(0, 0, false, 0, true, false);
        cache.access(0, 0, false, 0, true, false);
        assert_eq!(cache.cache_misses, 1);
        assert_eq!(cache.cache_hits, 1);
    }

    #[test]
    fn create_flag_suppresses_only_miss_accounting() {
        let mut cache = small_cache();
        cache.access(0, 0, false, 0, false, true);
        assert_eq!(cache.cache_misses, 0);
        assert_eq!(cache.cache_hits, 0);
        // the line was still installed: a second access to it is a hit.
        cache.access(0, 0, false, 0, true, false);
        assert_eq!(cache.cache_hits, 1);
    }

    #[test]
    fn write_then_evict_counts_a_writeback() {
        let mut cache = small_cache();
        // line numbers 0, 4, 8 all map to set 0 (waylines == 4); bit addresses
        // are line_number << 6 since linesize == 64 bits.
        cache.access(0, 0, true, 0, true, false); // way 1 (next_way=1)
        cache.access(0, 4 << 6, true, 0, true, false); // same set, way 0
        cache.access(0, 8 << 6, true, 0, true, false); // evicts way 1, which was dirty
        assert_eq!(cache.cache_writebacks, 1);
    }

    #[test]
    fn clean_clears_dirty_without_writeback_accounting() {
        let mut cache = small_cache();
        cache.access(0, 0, true, 0, true, false);
        cache.clean(0, 0);
        cache.access(0, 4 << 6, true, 0, true, false);
        cache.access(0, 8 << 6, true, 0, true, false);
        assert_eq!(cache.cache_writebacks, 0);
    }

    #[test]
    fn spatial_then_temporal_hit_classification() {
        let mut cache = TagCache::new(64, 2, 64, true);
        cache.access(0, 0, false, 0, true, false); // miss, installs line
        cache.access(0, 0, false, 0x40, true, false); // hit, new sub-region -> spatial
        cache.access(0, 0, false, 0x80, true, false); // hit, new sub-region -> spatial
        cache.access(0, 0, false, 0, true, false); // hit, seen sub-region -> temporal
        assert_eq!(*cache.spatial_hits.get(&0).unwrap(), 2);
        assert_eq!(*cache.temporal_hits.get(&0).unwrap(), 1);
    }
}
