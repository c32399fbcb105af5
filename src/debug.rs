//! Heap introspection.
//!
//! Two diagnostic windows into a live heap: [`Bookkeeper::blocks`], an
//! iterator over the physical block sequence, and [`Bookkeeper::check`],
//! a full consistency audit. Neither is on any hot path, and both are
//! written to survive a heap that is already corrupt: every read is bounds
//! guarded, every walk is budgeted, and the worst a mangled heap gets out
//! of them is a sad report.

use log::{debug, error};

use crate::block::Block;
use crate::bookkeeper::{Bookkeeper, BOTTOM, PROLOGUE, SENTINELS};
use crate::region::Region;
use crate::seglist::{SegList, BUCKETS};
use crate::tag::{Tag, ALIGNMENT, MIN_BLOCK, OVERHEAD};

/// A summary of one block, as yielded by [`Bookkeeper::blocks`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockInfo {
    /// The payload offset from the region base.
    pub payload: usize,
    /// The total block size in bytes, tags included.
    pub size: usize,
    /// Whether the block is currently allocated.
    pub allocated: bool,
}

/// An iterator over the physical block sequence, bottom to top.
///
/// Yields every real block in address order. The sentinels are skipped;
/// iteration ends at the epilogue, or early at the first sign of mangled
/// metadata.
pub struct Blocks<'a> {
    region: &'a Region,
    at: Block,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let block = self.at;
        if !readable(self.region, block) {
            return None;
        }

        let header = block.header(self.region);
        if header.size() == 0 {
            // The epilogue.
            return None;
        }
        if !sane(self.region, block) {
            return None;
        }

        self.at = Block::at(block.payload() + header.size());

        Some(BlockInfo {
            payload: block.payload(),
            size: header.size(),
            allocated: header.is_allocated(),
        })
    }
}

/// Can `block`'s header be read without leaving the region?
fn readable(region: &Region, block: Block) -> bool {
    let payload = block.payload();
    payload >= BOTTOM && payload <= region.len() && payload % ALIGNMENT == 0
}

/// Could `block` possibly be a real block? Shape and bounds only; the
/// contents may still be nonsense.
fn sane(region: &Region, block: Block) -> bool {
    if !readable(region, block) {
        return false;
    }

    let size = block.header(region).size();
    size >= MIN_BLOCK
        && size % ALIGNMENT == 0
        && block
            .payload()
            .checked_add(size)
            .map_or(false, |end| end <= region.len())
}

impl<S> Bookkeeper<S> {
    /// Iterate over the physical block sequence, bottom to top.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            region: &self.region,
            at: Block::at(BOTTOM),
        }
    }

    /// Audit the whole heap and return the number of violations found.
    ///
    /// Checks, in order: the sentinels; every block's shape (alignment,
    /// minimum size, matching tags, staying inside the region); that no
    /// two free blocks touch; that the blocks tile the region exactly; and
    /// that the segregated list agrees with the physical sequence on which
    /// blocks are free, with consistent links and every block in the class
    /// its size puts it in.
    ///
    /// Violations are reported through `log::error!`, and `verbose` adds a
    /// `log::debug!` line per block. A healthy heap returns zero. The audit
    /// never changes the heap, so it can be sprinkled through tests freely.
    pub fn check(&self, verbose: bool) -> usize {
        let region = &self.region;
        let mut violations = 0;

        // Sentinels.
        let prologue = Block::at(PROLOGUE);
        let want = Tag::new(OVERHEAD, true);
        if prologue.header(region) != want || prologue.footer(region) != want {
            error!("Mangled prologue.");
            violations += 1;
        }

        // The physical sequence.
        let mut at = Block::at(BOTTOM);
        let mut free_seen = 0;
        let mut bytes = 0;
        let mut below_free = false;

        loop {
            if !readable(region, at) {
                error!("Traversal left the region at offset {:#x}.", at.payload());
                violations += 1;
                break;
            }

            let header = at.header(region);
            if header.size() == 0 {
                // The epilogue; it must be allocated and sit at the top.
                if !header.is_allocated() {
                    error!("Epilogue not marked allocated.");
                    violations += 1;
                }
                if at.payload() != region.len() {
                    error!("Epilogue at offset {:#x}, below the region top.", at.payload());
                    violations += 1;
                }
                break;
            }

            if verbose {
                debug!(
                    "{:#x}: {} bytes, {}.",
                    at.payload(),
                    header.size(),
                    if header.is_allocated() { "allocated" } else { "free" }
                );
            }

            if !sane(region, at) {
                error!(
                    "Mangled block at offset {:#x} (size {}).",
                    at.payload(),
                    header.size()
                );
                violations += 1;
                // The size cannot be trusted to advance by.
                break;
            }

            if header != at.footer(region) {
                error!("Header and footer disagree at offset {:#x}.", at.payload());
                violations += 1;
            }

            if !header.is_allocated() {
                if below_free {
                    error!("Adjacent free blocks at offset {:#x}.", at.payload());
                    violations += 1;
                }
                free_seen += 1;
            }
            below_free = !header.is_allocated();

            bytes += header.size();
            at = Block::at(at.payload() + header.size());
        }

        // The blocks and the sentinels must tile the region exactly.
        if SENTINELS + bytes != region.len() {
            error!(
                "Blocks cover {} bytes of a {} byte region.",
                SENTINELS + bytes,
                region.len()
            );
            violations += 1;
        }

        // The list must agree with the traversal on the set of free
        // blocks. A corrupt chain could cycle, so the walk is budgeted: no
        // healthy chain holds more blocks than the traversal counted free.
        let mut listed = 0;
        'buckets: for bucket in 0..BUCKETS {
            let mut cursor = self.seglist.head(bucket).get();
            let mut prev: Option<Block> = None;

            while let Some(block) = cursor {
                if listed > free_seen {
                    error!("Free list walk overran the free block count; stray link or cycle.");
                    violations += 1;
                    break 'buckets;
                }

                if !sane(region, block) {
                    error!("Listed block at offset {:#x} is not a block.", block.payload());
                    violations += 1;
                    // The rest of this chain cannot be trusted.
                    break;
                }

                let header = block.header(region);
                if header.is_allocated() {
                    error!(
                        "Allocated block at offset {:#x} sits in the free list.",
                        block.payload()
                    );
                    violations += 1;
                }
                if SegList::bucket_of(header.size()) != bucket {
                    error!(
                        "Block at offset {:#x} ({} bytes) listed in class {}.",
                        block.payload(),
                        header.size(),
                        bucket
                    );
                    violations += 1;
                }
                if block.prev_free(region).get() != prev {
                    error!("Backward link astray at offset {:#x}.", block.payload());
                    violations += 1;
                }

                listed += 1;
                prev = Some(block);
                cursor = block.next_free(region).get();
            }
        }

        if listed != free_seen {
            error!(
                "{} blocks listed free, {} found free in the region.",
                listed, free_seen
            );
            violations += 1;
        }

        violations
    }
}
