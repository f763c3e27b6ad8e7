#![allow(dead_code)]

use bitflags::bitflags;
use log::*;

use crate::tagcache::TagCache;

bitflags! {
    /// The three orthogonal optimisations a [`TagMemory`] can be configured
    /// with. Each is independent of the others.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TagOptions: u8 {
        /// Track which 64-byte sub-region of a cached line each access
        /// touches, splitting hits into spatial vs. temporal.
        const SPATIAL_TEMPORAL = 0b0000_0001;
        /// Skip the memory read that would otherwise back a freshly-created
        /// subtree, and skip the writeback when that subtree collapses to
        /// all zeros again.
        const EMPTY_LEAF_OPT   = 0b0000_0010;
        /// Leave a cached leaf line clean when a write's payload equals what
        /// is already stored.
        const NON_DIRTY_WRITES = 0b0000_0100;
    }
}

/// One level of the tag table: a flat, one-byte-per-bit backing store plus
/// the right-shift that turns a byte address into a bit-index for this
/// level. One byte per bit wastes seven bits per cell; packing eight cells
/// per byte would not change observable behaviour and is left as a possible
/// future optimisation.
struct Level {
    storage: Vec<u8>,
    addr_shift: u32,
}

/// A tag-memory read or write request. Ephemeral: consumed by
/// [`TagMemory::put_req`] and not retained.
#[derive(Debug, Clone)]
pub struct Request {
    pub write: bool,
    pub addr: u64,
    /// One bit (stored as 0/1) per tagged 8-byte word in the 64-byte granule
    /// being written. Ignored for reads.
    pub tags: Vec<u8>,
}

impl Request {
    pub fn read(addr: u64) -> Request {
        Request { write: false, addr, tags: Vec::new() }
    }

    pub fn write(addr: u64, tags: Vec<u8>) -> Request {
        Request { write: true, addr, tags }
    }
}

/// Owns the tag-table hierarchy and the cache that fronts it.
pub struct TagMemory {
    tables: Vec<Level>,
    tablestruct: Vec<u32>,
    memstart: u64,
    memsize: u64,
    options: TagOptions,
    cache: TagCache,
    report_index: u64,

    pub table_hits: Vec<u64>,
    pub total_mem_transactions: u64,
}

impl TagMemory {
    /// Builds a tag memory. Panics if `tablestruct.len() > 1` and
    /// `tablestruct[1] < 8`: grouping factors below 8 are not guaranteed to
    /// be garbage collected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cachesize: usize,
        cacheassoc: usize,
        cachelinesize: usize,
        tablestruct: &[u32],
        memstart: u64,
        memsize: u64,
        options: TagOptions,
    ) -> TagMemory {
        if tablestruct.len() > 1 {
            assert!(
                tablestruct[1] >= 8,
                "leaf grouping factors below 8 are not guaranteed to be garbage collected"
            );
        }

        let mut tables = Vec::with_capacity(tablestruct.len());
        tables.push(Level { storage: vec![0u8; (memsize / 8) as usize], addr_shift: 3 });
        debug!(
            "table lvl 0 size = {} bits, addrShift: {}",
            tables[0].storage.len(),
            tables[0].addr_shift
        );
        for (k, &gf) in tablestruct.iter().enumerate().skip(1) {
            let prev = &tables[k - 1];
            let storage = vec![0u8; prev.storage.len() / gf as usize];
            let addr_shift = prev.addr_shift + gf.trailing_zeros();
            debug!("table lvl {} size = {} bits, addrShift: {}", k, storage.len(), addr_shift);
            tables.push(Level { storage, addr_shift });
        }

        let table_hits = vec![0u64; tables.len()];
        let spatial_temporal = options.contains(TagOptions::SPATIAL_TEMPORAL);

        TagMemory {
            tables,
            tablestruct: tablestruct.to_vec(),
            memstart,
            memsize,
            options,
            cache: TagCache::new(cachesize, cacheassoc, cachelinesize, spatial_temporal),
            report_index: 0,
            table_hits,
            total_mem_transactions: 0,
        }
    }

    /// For every level, the bit-index into that level's storage that `addr`
    /// (already relative to `memstart`) maps to.
    fn lookup_addrs(&self, addr: u64) -> Vec<(usize, u64)> {
        self.tables
            .iter()
            .enumerate()
            .map(|(lvl, level)| (lvl, addr >> level.addr_shift))
            .collect()
    }

    /// Routes one request through the table hierarchy, updating the cache
    /// and table storage along the way.
    pub fn put_req(&mut self, req: Request) {
        self.total_mem_transactions += 1;

        let addr = req.addr.wrapping_sub(self.memstart);
        if addr >= self.memsize {
            warn!("memory out-of-range access: addr={:#x}", req.addr);
            return;
        }

        let lookup = self.lookup_addrs(addr);
        let mut response_level = self.tables.len() - 1;

        if req.write {
            response_level = self.put_write(addr, &req.tags, &lookup, response_level);
        } else {
            response_level = self.put_read(addr, &lookup, response_level);
        }

        self.table_hits[response_level] += 1;
    }

    fn put_write(&mut self, addr: u64, tags: &[u8], lookup: &[(usize, u64)], mut response_level: usize) -> usize {
        let zero_tags = tags.iter().all(|&b| b == 0);
        let mut keep_going = true;
        let mut create_next = false;

        // root (L-1) down to, but not including, the leaf.
        for &(lvl, bit_addr) in lookup.iter().skip(1).rev() {
            let create_me = create_next;
            create_next = false;
            if !keep_going {
                continue;
            }
            let idx = bit_addr as usize;
            if zero_tags && self.tables[lvl].storage[idx] == 0 {
                self.cache.access(lvl, bit_addr, false, addr, true, create_me);
                keep_going = false;
            } else {
                let do_cache_update = self.tables[lvl].storage[idx] != 1;
                if do_cache_update && self.options.contains(TagOptions::EMPTY_LEAF_OPT) {
                    create_next = true;
                }
                self.cache.access(lvl, bit_addr, do_cache_update, addr, false, create_me);
                self.tables[lvl].storage[idx] = 1;
                response_level -= 1;
            }
        }

        let mut leaf_changed = false;
        if keep_going {
            let (lvl, bit_addr) = lookup[0];
            let create_me = create_next;
            let start = bit_addr as usize;
            let end = start + tags.len();
            let mut do_cache_update = !self.options.contains(TagOptions::NON_DIRTY_WRITES);
            if self.tables[0].storage[start..end] != *tags {
                do_cache_update = true;
                self.tables[0].storage[start..end].copy_from_slice(tags);
                leaf_changed = true;
            }
            self.cache.access(lvl, bit_addr, do_cache_update, addr, true, create_me);

            if zero_tags && do_cache_update {
                self.collapse_zero_groups(addr);
            }
            let _ = leaf_changed;
        }

        response_level
    }

    /// Walks leaf-to-root clearing any subtree that has gone all-zero,
    /// propagating the clear one level further each time a whole group is
    /// found to be zero. The root is visited (to keep the zipped iteration
    /// the same length as the table) but never cleared.
    fn collapse_zero_groups(&mut self, addr: u64) {
        let mut clear_next = false;
        let mut group_factors: Vec<u32> = self.tablestruct[1..].to_vec();
        group_factors.push(1);

        for (lvl, &group_factor) in group_factors.iter().enumerate() {
            let addr_shift = self.tables[lvl].addr_shift;
            let ent_addr = (addr >> addr_shift) as usize;
            if clear_next {
                self.tables[lvl].storage[ent_addr] = 0;
            }
            let group_factor = group_factor as usize;
            let group_addr = ent_addr - (ent_addr % group_factor);
            let all_zero = group_factor != 1
                && self.tables[lvl].storage[group_addr..group_addr + group_factor].iter().all(|&b| b == 0);
            if all_zero {
                clear_next = true;
                if self.options.contains(TagOptions::EMPTY_LEAF_OPT) {
                    self.cache.clean(lvl, ent_addr as u64);
                }
            } else {
                clear_next = false;
            }
        }
    }

    fn put_read(&mut self, addr: u64, lookup: &[(usize, u64)], mut response_level: usize) -> usize {
        let mut keep_going = true;
        for &(lvl, bit_addr) in lookup.iter().rev() {
            if !keep_going {
                continue;
            }
            let idx = bit_addr as usize;
            if self.tables[lvl].storage[idx] == 0 || lvl == 0 {
                keep_going = false;
            } else {
                response_level -= 1;
            }
            self.cache.access(lvl, bit_addr, false, addr, !keep_going, false);
        }
        response_level
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.cache_hits
    }
    pub fn cache_misses(&self) -> u64 {
        self.cache.cache_misses
    }
    pub fn cache_writebacks(&self) -> u64 {
        self.cache.cache_writebacks
    }
    pub fn spatial_hits(&self, lvl: usize) -> u64 {
        *self.cache.spatial_hits.get(&lvl).unwrap_or(&0)
    }
    pub fn temporal_hits(&self, lvl: usize) -> u64 {
        *self.cache.temporal_hits.get(&lvl).unwrap_or(&0)
    }
    pub fn levels(&self) -> usize {
        self.tables.len()
    }

    #[cfg(test)]
    fn table_cell(&self, lvl: usize, idx: usize) -> u8 {
        self.tables[lvl].storage[idx]
    }

    /// Produces one report period: a `tableHits` line followed by the
    /// comma-separated counter summary consumed by the result-aggregation
    /// collaborator.
    pub fn report(&mut self) -> TagMemoryReport {
        self.report_index += 1;

        let total_accesses = self.cache.cache_misses + self.cache.cache_writebacks;
        let denom = self.cache.cache_hits + self.cache.cache_misses;
        let hit_rate = if denom == 0 { 0.0 } else { self.cache.cache_hits as f64 / denom as f64 };

        let mut summary_line = format!(
            "{}: HitRate: {:.6}, totalAccesses: {}, hits: {}",
            self.report_index, hit_rate, total_accesses, self.cache.cache_hits
        );
        for lvl in 0..self.tables.len() {
            summary_line.push_str(&format!(
                ", spatialHits[{lvl}]: {}, temporalHits[{lvl}]: {}",
                self.spatial_hits(lvl),
                self.temporal_hits(lvl)
            ));
        }
        summary_line.push_str(&format!(
            ", misses: {}, writebacks: {}, totalMemTransactions: {}",
            self.cache.cache_misses, self.cache.cache_writebacks, self.total_mem_transactions
        ));

        TagMemoryReport { table_hits: self.table_hits.clone(), summary_line }
    }
}

/// The textual contract of one report period.
pub struct TagMemoryReport {
    pub table_hits: Vec<u64>,
    pub summary_line: String,
}

impl std::fmt::Display for TagMemoryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{:?}", self.table_hits)?;
        write!(f, "{}", self.summary_line)
    }
}
