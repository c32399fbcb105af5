//! Boundary tags.
//!
//! Every block in the heap is bracketed by two copies of a _boundary tag_: a
//! header word just before the payload and a footer word in the block's last
//! four bytes. A tag packs the block's total size together with its allocated
//! bit, so the heap can be walked forwards (header to header) and backwards
//! (through the footer of the block just below), which is what makes constant
//! time coalescing possible.

/// The width in bytes of a single tag word.
pub const WORD: usize = 4;

/// The alignment granularity.
///
/// Every payload address and every block size is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// The tag overhead carried by every block: one header and one footer.
pub const OVERHEAD: usize = 2 * WORD;

/// The smallest block the heap will carve out.
///
/// A free block must hold its header, its footer, and the two link words of
/// the free list, so nothing below 16 bytes is representable.
pub const MIN_BLOCK: usize = 16;

/// Round `n` up to the alignment granularity.
///
/// The caller is responsible for `n` being far enough from the end of the
/// address space that the rounding cannot overflow.
#[inline]
pub fn align_up(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// A boundary tag: a block size packed with the allocated bit.
///
/// Sizes are always multiples of the alignment granularity, leaving the low
/// three bits of the word free. The lowest of them carries the allocated
/// flag; the other two are kept zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tag(u32);

impl Tag {
    /// The epilogue tag: size zero, marked allocated.
    ///
    /// A single copy of this tag sits at the very top of the region and
    /// terminates every forward traversal.
    pub const EPILOGUE: Tag = Tag(1);

    /// Pack a size and an allocated flag into a tag.
    ///
    /// `size` must be aligned and fit the tag word; both are programming
    /// errors on our side and are caught in debug builds.
    #[inline]
    pub fn new(size: usize, allocated: bool) -> Tag {
        debug_assert!(size % ALIGNMENT == 0, "unaligned tag size: {}", size);
        debug_assert!(size <= u32::MAX as usize, "tag size overflows the word: {}", size);

        Tag(size as u32 | allocated as u32)
    }

    /// Reinterpret a raw word as a tag.
    #[inline]
    pub fn from_raw(raw: u32) -> Tag {
        Tag(raw)
    }

    /// The raw word of this tag.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// The total size of the tagged block, tags included.
    #[inline]
    pub fn size(self) -> usize {
        (self.0 & !0x7) as usize
    }

    /// Is the tagged block allocated?
    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & 0x1 != 0
    }
}
