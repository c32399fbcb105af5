//! The heap region.
//!
//! All heap metadata speaks in _offsets_: byte distances from the region
//! base. Offsets survive region growth unchanged, compress into four-byte
//! link words, and make the bounds checks in debug builds trivial. This
//! module owns the one place where offsets meet actual memory.

use core::ptr::NonNull;

use crate::tag::{ALIGNMENT, WORD};

/// A single contiguous span of heap memory.
///
/// The region only ever grows, and it grows in place: every appended span
/// must continue the previous one, so `base` is fixed for the region's whole
/// life and an offset means the same byte forever.
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

// The region is the sole owner of the memory behind `base`.
unsafe impl Send for Region {}

impl Region {
    /// A region of length zero.
    ///
    /// The base is adopted from the first appended span.
    pub const fn empty() -> Region {
        Region {
            base: NonNull::dangling(),
            len: 0,
        }
    }

    /// Append a freshly grown span to the region.
    ///
    /// The first append fixes the region base; every later one must start
    /// exactly at the current end, and is refused with `Err` otherwise. On
    /// success the offset of the new span (the old length) is returned.
    pub fn append(&mut self, start: NonNull<u8>, size: usize) -> Result<usize, ()> {
        debug_assert!(start.as_ptr() as usize % ALIGNMENT == 0, "unaligned span");
        debug_assert!(size % ALIGNMENT == 0, "unaligned span length: {}", size);

        if self.len == 0 {
            self.base = start;
        } else if self.end() != start.as_ptr() {
            return Err(());
        }

        let at = self.len;
        self.len = self.len.checked_add(size).ok_or(())?;

        Ok(at)
    }

    /// The current length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// The lowest address of the region.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest address of the region.
    #[inline]
    pub fn end(&self) -> *mut u8 {
        // SAFETY: `len` bytes past `base` are inside (or one past) the span.
        unsafe { self.base.as_ptr().add(self.len) }
    }

    /// The address of the byte at `offset`.
    #[inline]
    pub fn at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.len, "offset {} out of region", offset);

        // SAFETY: bounds are the caller's burden, checked in debug builds.
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Read the tag word at `offset`.
    ///
    /// Offsets handed in here are word-aligned by construction, since block
    /// sizes and the region length are multiples of the granularity.
    #[inline]
    pub fn word(&self, offset: usize) -> u32 {
        debug_assert!(offset % WORD == 0, "unaligned word offset: {}", offset);
        debug_assert!(offset + WORD <= self.len, "word at {} out of region", offset);

        // SAFETY: in bounds and aligned per the assertions above.
        unsafe { (self.base.as_ptr().add(offset) as *const u32).read() }
    }

    /// Write the tag word at `offset`.
    #[inline]
    pub fn set_word(&mut self, offset: usize, word: u32) {
        debug_assert!(offset % WORD == 0, "unaligned word offset: {}", offset);
        debug_assert!(offset + WORD <= self.len, "word at {} out of region", offset);

        // SAFETY: in bounds and aligned per the assertions above.
        unsafe { (self.base.as_ptr().add(offset) as *mut u32).write(word) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn span(len: usize) -> NonNull<u8> {
        NonNull::new(Box::leak(vec![0u8; len].into_boxed_slice()).as_mut_ptr()).unwrap()
    }

    #[test]
    fn append_adopts_base() {
        let start = span(64);
        let mut region = Region::empty();

        assert_eq!(region.append(start, 64), Ok(0));
        assert_eq!(region.base(), start.as_ptr());
        assert_eq!(region.len(), 64);
    }

    #[test]
    fn append_continues() {
        let start = span(64);
        let mut region = Region::empty();

        region.append(start, 32).unwrap();
        let more = NonNull::new(unsafe { start.as_ptr().add(32) }).unwrap();
        assert_eq!(region.append(more, 32), Ok(32));
        assert_eq!(region.len(), 64);
    }

    #[test]
    fn append_refuses_gap() {
        let start = span(128);
        let mut region = Region::empty();

        region.append(start, 64).unwrap();
        let skipped = NonNull::new(unsafe { start.as_ptr().add(96) }).unwrap();
        assert_eq!(region.append(skipped, 32), Err(()));
        // A refused span must leave the region untouched.
        assert_eq!(region.len(), 64);
    }

    #[test]
    fn words_roundtrip() {
        let mut region = Region::empty();
        region.append(span(32), 32).unwrap();

        region.set_word(0, 0xdead_beef);
        region.set_word(28, 0x5a5a_5a5a);

        assert_eq!(region.word(0), 0xdead_beef);
        assert_eq!(region.word(28), 0x5a5a_5a5a);
    }
}
