//! Memory blocks.
//!
//! Blocks are the unit of bookkeeping. A block occupies a run of the region
//! shaped like so (all words four bytes wide):
//!
//! ```text
//!      header       payload                              footer
//!     +--------+-------------------------------------+--------+
//!     | size|a |  ...                                | size|a |
//!     +--------+-------------------------------------+--------+
//!      ^        ^
//!      |        `- the block's offset points here
//!      `- payload - 4
//! ```
//!
//! A free block keeps its two list links in the first eight payload bytes,
//! which is why nothing smaller than [`MIN_BLOCK`](crate::tag::MIN_BLOCK)
//! exists. An allocated block's payload is the caller's, up to the footer.
//!
//! A block handle is just the payload offset. It carries no borrow of the
//! heap, so every accessor takes the region explicitly; which handles are
//! meaningful at any moment is the bookkeeper's burden.

use crate::link::Link;
use crate::region::Region;
use crate::tag::{Tag, OVERHEAD, WORD};

/// A handle to a block: the offset of its payload from the region base.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Block(usize);

impl Block {
    /// The block whose payload sits at `payload`.
    #[inline]
    pub fn at(payload: usize) -> Block {
        Block(payload)
    }

    /// The payload offset of this block.
    #[inline]
    pub fn payload(self) -> usize {
        self.0
    }

    /// Read the header tag.
    #[inline]
    pub fn header(self, region: &Region) -> Tag {
        Tag::from_raw(region.word(self.0 - WORD))
    }

    /// Write the header tag.
    #[inline]
    pub fn set_header(self, region: &mut Region, tag: Tag) {
        region.set_word(self.0 - WORD, tag.to_raw());
    }

    /// Read the footer tag.
    #[inline]
    pub fn footer(self, region: &Region) -> Tag {
        Tag::from_raw(region.word(self.0 + self.size(region) - OVERHEAD))
    }

    /// Write both tags of this block at once.
    ///
    /// The footer lands where `tag.size()` says it should, so stamping is
    /// also how a block is resized.
    #[inline]
    pub fn stamp(self, region: &mut Region, tag: Tag) {
        region.set_word(self.0 - WORD, tag.to_raw());
        region.set_word(self.0 + tag.size() - OVERHEAD, tag.to_raw());
    }

    /// The total size of this block in bytes, tags included.
    #[inline]
    pub fn size(self, region: &Region) -> usize {
        self.header(region).size()
    }

    /// The bytes of payload an allocation in this block may use.
    #[inline]
    pub fn capacity(self, region: &Region) -> usize {
        self.size(region) - OVERHEAD
    }

    /// Is this block marked allocated?
    #[inline]
    pub fn is_allocated(self, region: &Region) -> bool {
        self.header(region).is_allocated()
    }

    /// The block immediately above this one.
    #[inline]
    pub fn next(self, region: &Region) -> Block {
        Block(self.0 + self.size(region))
    }

    /// The block immediately below this one.
    ///
    /// Found through the lower neighbour's footer, which sits right under
    /// our header.
    #[inline]
    pub fn prev(self, region: &Region) -> Block {
        Block(self.0 - self.prev_footer(region).size())
    }

    /// Read the footer tag of the block immediately below.
    #[inline]
    pub fn prev_footer(self, region: &Region) -> Tag {
        Tag::from_raw(region.word(self.0 - OVERHEAD))
    }

    /// Read the forward list link. Only meaningful while the block is free.
    #[inline]
    pub fn next_free(self, region: &Region) -> Link {
        Link::from_raw(region.word(self.0))
    }

    /// Read the backward list link. Only meaningful while the block is free.
    #[inline]
    pub fn prev_free(self, region: &Region) -> Link {
        Link::from_raw(region.word(self.0 + WORD))
    }

    /// Write the forward list link.
    #[inline]
    pub fn set_next_free(self, region: &mut Region, link: Link) {
        region.set_word(self.0, link.to_raw());
    }

    /// Write the backward list link.
    #[inline]
    pub fn set_prev_free(self, region: &mut Region, link: Link) {
        region.set_word(self.0 + WORD, link.to_raw());
    }
}
