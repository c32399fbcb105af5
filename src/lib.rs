//! **segfit:** a segregated-fit memory allocator.
//!
//! A drop-in heap in the classic malloc shape: one contiguous region that
//! only ever grows, blocks bracketed by boundary tags, free blocks bucketed
//! into power-of-two size classes, first-fit allocation with splitting, and
//! immediate coalescing on free. The whole heap state lives in one
//! [`Bookkeeper`] value; nothing is global unless you put it in a `static`
//! yourself through [`Locked`].
//!
//! Memory comes from a pluggable [`HeapSource`]: the program break
//! ([`Sbrk`]) or a span you already own ([`Arena`]).
//!
//! ```
//! use segfit::{Arena, Bookkeeper};
//!
//! let span = Box::leak(vec![0u8; 64 * 1024].into_boxed_slice());
//! let mut heap = Bookkeeper::new(Arena::new(span)).unwrap();
//!
//! let p = heap.alloc(100);
//! assert!(!p.is_null());
//! assert_eq!(p as usize % segfit::ALIGNMENT, 0);
//!
//! unsafe {
//!     p.write_bytes(0x5a, 100);
//!     heap.free(p);
//! }
//! assert_eq!(heap.check(false), 0);
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "global")]
mod allocator;
mod block;
mod bookkeeper;
mod brk;
mod debug;
mod error;
mod link;
mod region;
mod seglist;
mod tag;

#[cfg(feature = "global")]
pub use crate::allocator::Locked;
pub use crate::bookkeeper::{Bookkeeper, CHUNK};
#[cfg(unix)]
pub use crate::brk::Sbrk;
pub use crate::brk::{Arena, HeapSource};
pub use crate::debug::{BlockInfo, Blocks};
pub use crate::error::AllocError;
pub use crate::seglist::BUCKETS;
pub use crate::tag::{ALIGNMENT, MIN_BLOCK, OVERHEAD};
