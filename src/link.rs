//! Compressed free-list links.
//!
//! Free blocks are threaded through their size class in a doubly linked
//! list, with both link words stored inside the payload area the block is
//! not using anyway. Full-width pointers would force the minimum block up
//! to 24 bytes, so links are stored compressed into four bytes each: the
//! linked block's payload offset from the region base. Offset zero is the
//! pad word at the bottom of the region and is never a payload, which
//! leaves the zero word free to mean "no link".
//!
//! The encoding holds as long as the region stays below 4 GiB; the
//! bookkeeper refuses to grow past that.

use crate::block::Block;

/// A compressed link word, exactly as stored inside a free block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Link(u32);

impl Link {
    /// The absent link.
    pub const NONE: Link = Link(0);

    /// Compress a handle to `block`.
    #[inline]
    pub fn to(block: Block) -> Link {
        debug_assert!(block.payload() != 0, "compressing the pad word");
        debug_assert!(
            block.payload() <= u32::MAX as usize,
            "payload offset overflows the link word: {}",
            block.payload()
        );

        Link(block.payload() as u32)
    }

    /// Decompress this link, with `None` for the absent link.
    #[inline]
    pub fn get(self) -> Option<Block> {
        if self.0 == 0 {
            None
        } else {
            Some(Block::at(self.0 as usize))
        }
    }

    /// Reinterpret a raw word as a link.
    #[inline]
    pub fn from_raw(raw: u32) -> Link {
        Link(raw)
    }

    /// The raw word of this link.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// Is this the absent link?
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}
