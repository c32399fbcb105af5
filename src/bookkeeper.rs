//! Memory bookkeeping.
//!
//! This is the heart of the crate: one structure owning a heap region and
//! every decision about it. The region it manages is shaped like so:
//!
//! ```text
//!      pad   prologue    block    block   ...    block   epilogue
//!     +-----+----+----+---------+-------+- - - -+-------+----+
//!     |     | 8|1| 8|1|         |       |       |       | 0|1|
//!     +-----+----+----+---------+-------+- - - -+-------+----+
//!     0     4         16                                 len-4
//! ```
//!
//! The pad word keeps the first payload on the granularity. The prologue (a
//! payload-less allocated block) and the epilogue (a lone allocated header)
//! never go away; they bound every traversal and spare the coalescer from
//! worrying about the region's edges, since both edges always read as
//! "allocated neighbour".
//!
//! Policy, in one breath: allocation takes the first fit out of the
//! segregated list, splits off what it does not need, and grows the region
//! by granules when nothing fits; freeing merges with both neighbours
//! immediately, so two adjacent free blocks never outlive a single
//! bookkeeping call.

use core::{cmp, ptr};

use log::{error, trace};

use crate::block::Block;
use crate::brk::HeapSource;
use crate::error::AllocError;
use crate::region::Region;
use crate::seglist::SegList;
use crate::tag::{align_up, Tag, ALIGNMENT, MIN_BLOCK, OVERHEAD, WORD};

/// The default growth granule in bytes.
///
/// Growth is always a whole number of granules, so a bigger granule means
/// rarer trips to the heap source at the price of a bigger high-water mark.
/// [`Bookkeeper::with_chunk`] tunes it per heap.
pub const CHUNK: usize = 4096;

/// A cap on the growth granule. Keeps the granule arithmetic comfortably
/// clear of overflow on any target.
const MAX_CHUNK: usize = 1 << 30;

/// The bytes of sentinel scaffolding at the bottom of the region: the pad
/// word, the prologue's two tags, and the first epilogue.
pub(crate) const SENTINELS: usize = 4 * WORD;

/// The payload offset of the prologue block.
pub(crate) const PROLOGUE: usize = 2 * WORD;

/// The payload offset of the first real block.
pub(crate) const BOTTOM: usize = 4 * WORD;

/// The memory bookkeeper.
///
/// Owns a [`HeapSource`], the region grown out of it, and the segregated
/// free list over that region. All the C-shaped entry points (`alloc`,
/// `free`, `realloc`, `calloc`) live here; the [`Locked`](crate::Locked)
/// wrapper merely adds a lock on top.
///
/// Guarantees, assuming the `unsafe` contracts are upheld:
///
/// 1. Every block is inside the region, tagged front and back, and at least
///    the minimum size. Blocks tile the region exactly; nothing overlaps.
/// 2. A free block is in the list of its size class exactly once, and never
///    borders another free block.
/// 3. Handed-out payloads are aligned to the granularity and disjoint from
///    all bookkeeping, so user writes and heap metadata cannot collide.
///
/// [`check`](Self::check) verifies all of this on demand.
pub struct Bookkeeper<S> {
    /// Where new memory comes from.
    source: S,
    /// The span every offset points into.
    pub(crate) region: Region,
    /// The free blocks, bucketed by size class.
    pub(crate) seglist: SegList,
    /// The growth granule.
    chunk: usize,
    /// How many times the source has grown the region.
    grows: usize,
}

impl<S: HeapSource> Bookkeeper<S> {
    /// Set up a heap over `source` with the default granule.
    pub fn new(source: S) -> Result<Bookkeeper<S>, AllocError> {
        Bookkeeper::with_chunk(source, CHUNK)
    }

    /// Set up a heap over `source`, growing by granules of `chunk` bytes.
    ///
    /// The granule is clamped to a sane range and rounded to the alignment
    /// granularity. Setup grows the source twice: once for the sentinel
    /// scaffolding, once for the initial granule, so the heap opens with a
    /// single free block ready to serve.
    pub fn with_chunk(source: S, chunk: usize) -> Result<Bookkeeper<S>, AllocError> {
        let mut keeper = Bookkeeper {
            source,
            region: Region::empty(),
            seglist: SegList::new(),
            chunk: align_up(chunk.clamp(MIN_BLOCK, MAX_CHUNK)),
            grows: 0,
        };

        let at = keeper.grow(SENTINELS)?;
        debug_assert!(at == 0, "sentinels not at the region bottom");

        keeper.region.set_word(0, 0);
        Block::at(PROLOGUE).stamp(&mut keeper.region, Tag::new(OVERHEAD, true));
        Block::at(BOTTOM).set_header(&mut keeper.region, Tag::EPILOGUE);

        keeper.extend(keeper.chunk)?;

        Ok(keeper)
    }

    /// Allocate `size` bytes.
    ///
    /// The returned pointer is aligned to the granularity and points at
    /// `size` usable bytes. Null is returned when `size` is zero or when
    /// the heap cannot be grown far enough.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }

        // Room for both tags, rounded to the granularity, floored at the
        // minimum block. Checked so an absurd `size` fails instead of
        // wrapping into a tiny block.
        let asize = match size.checked_add(OVERHEAD + ALIGNMENT - 1) {
            Some(n) => cmp::max(MIN_BLOCK, n & !(ALIGNMENT - 1)),
            None => return ptr::null_mut(),
        };

        let fit = match self.seglist.find_fit(&self.region, asize) {
            Some(block) => block,
            None => match self.extend(cmp::max(asize, self.chunk)) {
                Ok(block) => block,
                Err(err) => {
                    error!("Failed to grow the heap for {} bytes: {}.", asize, err);
                    return ptr::null_mut();
                }
            },
        };

        let block = self.place(fit, asize);
        trace!("Allocated {} bytes at offset {:#x}.", size, block.payload());

        self.region.at(block.payload())
    }

    /// Free the allocation behind `ptr`.
    ///
    /// A null `ptr` is a no-op. The freed block is merged with any free
    /// neighbour on the spot and listed in its size class.
    ///
    /// # Safety
    ///
    /// `ptr` must have come out of this very heap's [`alloc`](Self::alloc),
    /// [`realloc`](Self::realloc) or [`calloc`](Self::calloc), and must not
    /// have been freed since. Anything else corrupts the heap; debug builds
    /// catch the obvious offenders through the boundary tags.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let block = self.block_of(ptr);
        self.assert_sane(block);

        trace!(
            "Freeing {} bytes at offset {:#x}.",
            block.capacity(&self.region),
            block.payload()
        );

        let size = block.size(&self.region);
        block.stamp(&mut self.region, Tag::new(size, false));

        let merged = self.coalesce(block);
        self.seglist.insert(&mut self.region, merged);
    }

    /// Reallocate the allocation behind `ptr` to `size` bytes.
    ///
    /// The data always moves: a new block is allocated, the payload copied
    /// over (truncated when shrinking) and the old block freed. On failure
    /// null is returned and the old allocation is left exactly as it was.
    ///
    /// A null `ptr` behaves as `alloc(size)`; a zero `size` frees `ptr` and
    /// returns null.
    ///
    /// # Safety
    ///
    /// Same contract as [`free`](Self::free).
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(size);
        }
        if size == 0 {
            self.free(ptr);
            return ptr::null_mut();
        }

        let old = self.block_of(ptr);
        self.assert_sane(old);
        let keep = cmp::min(old.capacity(&self.region), size);

        let new = self.alloc(size);
        if new.is_null() {
            return ptr::null_mut();
        }

        // The old block is still allocated, so the two spans are disjoint.
        ptr::copy_nonoverlapping(ptr, new, keep);
        self.free(ptr);

        new
    }

    /// Allocate zeroed room for `count` items of `size` bytes each.
    ///
    /// The product is taken the way the classic C interface takes it:
    /// unguarded. A product that wraps yields a shorter (but zeroed)
    /// allocation; guarding against that is the caller's job, as it always
    /// has been over `calloc`.
    pub fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        let total = count.wrapping_mul(size);
        let ptr = self.alloc(total);

        if !ptr.is_null() {
            // SAFETY: a successful alloc hands us `total` writable bytes.
            unsafe { ptr::write_bytes(ptr, 0, total) };
        }

        ptr
    }

    /// Grow the region by `size` bytes through the source.
    ///
    /// On success the offset of the new span is returned. Refuses to grow
    /// past what the compressed links can address.
    fn grow(&mut self, size: usize) -> Result<usize, AllocError> {
        if self
            .region
            .len()
            .checked_add(size)
            .map_or(true, |n| n > u32::MAX as usize)
        {
            return Err(AllocError::Exhausted);
        }

        let start = self.source.grow(size).ok_or(AllocError::Exhausted)?;
        let at = self
            .region
            .append(start, size)
            .map_err(|()| AllocError::Discontiguous)?;
        self.grows += 1;

        trace!("Grew the region by {} bytes to {}.", size, self.region.len());

        Ok(at)
    }

    /// Grow the heap and carve the new span into one free block.
    ///
    /// The old epilogue's word becomes the new block's header and a fresh
    /// epilogue is laid down at the new top. The block is merged with a
    /// free block right below it, if any, and listed in its size class.
    fn extend(&mut self, size: usize) -> Result<Block, AllocError> {
        let size = align_up(size);
        let at = self.grow(size)?;

        let block = Block::at(at);
        block.stamp(&mut self.region, Tag::new(size, false));
        block
            .next(&self.region)
            .set_header(&mut self.region, Tag::EPILOGUE);

        let merged = self.coalesce(block);
        self.seglist.insert(&mut self.region, merged);

        Ok(merged)
    }

    /// Merge `block` with its free neighbours into one free block.
    ///
    /// Boundary tags make all four cases constant time: the lower
    /// neighbour is reached through the footer right under our header, the
    /// upper one starts right after our footer. Absorbed neighbours are
    /// unlinked from their size classes.
    ///
    /// The merged block is deliberately NOT listed here. Every caller
    /// inserts the block it ends up with exactly once, which is what keeps
    /// a block from ever appearing in two lists.
    fn coalesce(&mut self, block: Block) -> Block {
        debug_assert!(
            !block.is_allocated(&self.region),
            "coalescing an allocated block"
        );

        let below_free = !block.prev_footer(&self.region).is_allocated();
        let above = block.next(&self.region);
        let above_free = !above.header(&self.region).is_allocated();

        let size = block.size(&self.region);

        match (below_free, above_free) {
            (false, false) => block,
            (false, true) => {
                self.seglist.remove(&mut self.region, above);
                let total = size + above.size(&self.region);
                block.stamp(&mut self.region, Tag::new(total, false));
                block
            }
            (true, false) => {
                let below = block.prev(&self.region);
                self.seglist.remove(&mut self.region, below);
                let total = below.size(&self.region) + size;
                below.stamp(&mut self.region, Tag::new(total, false));
                below
            }
            (true, true) => {
                let below = block.prev(&self.region);
                self.seglist.remove(&mut self.region, below);
                self.seglist.remove(&mut self.region, above);

                let total = below.size(&self.region) + size + above.size(&self.region);
                below.stamp(&mut self.region, Tag::new(total, false));
                below
            }
        }
    }

    /// Carve an allocation of `size` bytes out of a listed free block.
    ///
    /// The block is unlinked and marked allocated. When the cut would leave
    /// at least a minimum block behind, the remainder becomes a free block
    /// in its own size class; otherwise the allocation simply keeps the
    /// slack.
    fn place(&mut self, block: Block, size: usize) -> Block {
        self.seglist.remove(&mut self.region, block);

        let whole = block.size(&self.region);
        debug_assert!(whole >= size, "placing into a block too small");

        if whole - size >= MIN_BLOCK {
            block.stamp(&mut self.region, Tag::new(size, true));

            let rest = block.next(&self.region);
            rest.stamp(&mut self.region, Tag::new(whole - size, false));
            self.seglist.insert(&mut self.region, rest);
        } else {
            block.stamp(&mut self.region, Tag::new(whole, true));
        }

        block
    }

    /// The block whose payload `ptr` points at.
    fn block_of(&self, ptr: *mut u8) -> Block {
        Block::at(ptr as usize - self.region.base() as usize)
    }

    /// Boundary-tag sanity checks on a caller-supplied pointer.
    ///
    /// Debug builds only. The release build trusts the caller completely,
    /// as the `unsafe` contracts say it may.
    fn assert_sane(&self, block: Block) {
        if cfg!(debug_assertions) {
            let payload = block.payload();
            assert!(
                payload >= BOTTOM && payload < self.region.len(),
                "pointer outside the heap"
            );
            assert!(payload % ALIGNMENT == 0, "pointer off the granularity");

            let header = block.header(&self.region);
            assert!(
                header.is_allocated(),
                "double free, or a pointer into a free block"
            );
            assert!(
                header.size() >= MIN_BLOCK && payload + header.size() <= self.region.len(),
                "mangled block size"
            );
            assert!(
                header == block.footer(&self.region),
                "header and footer disagree"
            );
        }
    }
}

impl<S> Bookkeeper<S> {
    /// The current size of the region in bytes, sentinels included.
    pub fn heap_size(&self) -> usize {
        self.region.len()
    }

    /// How many times the heap source has grown the region, setup included.
    pub fn grows(&self) -> usize {
        self.grows
    }

    /// The growth granule in bytes.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// The heap source backing this heap.
    pub fn source(&self) -> &S {
        &self.source
    }
}
