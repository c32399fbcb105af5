//! The segregated free list.
//!
//! Free blocks are kept in [`BUCKETS`] doubly linked lists, one per size
//! class. Class `i` covers sizes up to `2^(i + 4)` bytes and the last class
//! absorbs everything larger, so the smallest class starts exactly at the
//! minimum block size. Insertion pushes at the head; a search scans the
//! fitting class front to back and then climbs into the larger classes, so
//! the first fit found is taken.
//!
//! Only the bucket heads live here. The links themselves are stored inside
//! the free blocks, compressed to four bytes each (see [`crate::link`]).

use crate::block::Block;
use crate::link::Link;
use crate::region::Region;

/// The number of size classes.
pub const BUCKETS: usize = 16;

/// The heads of the size-class lists.
pub struct SegList {
    heads: [Link; BUCKETS],
}

impl SegList {
    /// An empty list in every size class.
    pub const fn new() -> SegList {
        SegList {
            heads: [Link::NONE; BUCKETS],
        }
    }

    /// The size class a block of `size` bytes belongs to.
    pub fn bucket_of(size: usize) -> usize {
        let mut bucket = 0;
        while bucket < BUCKETS - 1 {
            if size <= 1 << (bucket + 4) {
                break;
            }
            bucket += 1;
        }

        bucket
    }

    /// The head of `bucket`'s list.
    pub fn head(&self, bucket: usize) -> Link {
        self.heads[bucket]
    }

    /// Push a free block at the head of its size class.
    ///
    /// The block's tags must already mark it free with its final size; the
    /// link words are overwritten here, whatever they held before.
    pub fn insert(&mut self, region: &mut Region, block: Block) {
        debug_assert!(!block.is_allocated(region), "inserting an allocated block");

        let bucket = SegList::bucket_of(block.size(region));
        let old_head = self.heads[bucket];

        block.set_prev_free(region, Link::NONE);
        block.set_next_free(region, old_head);
        if let Some(head) = old_head.get() {
            head.set_prev_free(region, Link::to(block));
        }

        self.heads[bucket] = Link::to(block);
    }

    /// Unlink a block from its size class.
    ///
    /// The block must currently be listed; its own link words are left
    /// stale, to be overwritten by the next insertion.
    pub fn remove(&mut self, region: &mut Region, block: Block) {
        let bucket = SegList::bucket_of(block.size(region));
        let prev = block.prev_free(region);
        let next = block.next_free(region);

        match (prev.get(), next.get()) {
            (None, None) => {
                debug_assert!(
                    self.heads[bucket].get() == Some(block),
                    "removing an unlisted block"
                );
                self.heads[bucket] = Link::NONE;
            }
            (None, Some(next)) => {
                debug_assert!(
                    self.heads[bucket].get() == Some(block),
                    "removing an unlisted block"
                );
                self.heads[bucket] = Link::to(next);
                next.set_prev_free(region, Link::NONE);
            }
            (Some(prev), None) => {
                prev.set_next_free(region, Link::NONE);
            }
            (Some(prev), Some(next)) => {
                prev.set_next_free(region, Link::to(next));
                next.set_prev_free(region, Link::to(prev));
            }
        }
    }

    /// Find a free block of at least `size` bytes.
    ///
    /// Scans the fitting size class front to back, then each larger class in
    /// turn, and takes the first block large enough. The block stays listed;
    /// the caller decides what to do with it.
    pub fn find_fit(&self, region: &Region, size: usize) -> Option<Block> {
        for bucket in SegList::bucket_of(size)..BUCKETS {
            let mut cursor = self.heads[bucket].get();

            while let Some(block) = cursor {
                if block.size(region) >= size {
                    return Some(block);
                }
                cursor = block.next_free(region).get();
            }
        }

        None
    }
}
