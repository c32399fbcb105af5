//! Heap sources.
//!
//! The bookkeeper does not care where its memory comes from. It consumes a
//! single "give me `n` more bytes" operation through the [`HeapSource`]
//! trait, and two sources ship with the crate: [`Sbrk`], which moves the
//! program break, and [`Arena`], which hands out slices of a span the
//! caller provided up front.

use core::ptr::NonNull;

use crate::tag::ALIGNMENT;

/// A growable backing store for a heap region.
///
/// Implementors promise that every successful [`grow`](Self::grow) returns a
/// span starting exactly where the previously returned span ended, so that
/// the grown memory forms one contiguous region. A source which cannot keep
/// that promise (say, because someone else moved the program break in the
/// meantime) should still return what it got; the bookkeeper notices the gap
/// and rejects the span.
pub trait HeapSource {
    /// Grow the heap by exactly `size` bytes.
    ///
    /// Returns the start of the newly grown span, or `None` if the source
    /// cannot grow any further. A failed grow is not fatal: a later, smaller
    /// request may well succeed.
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>>;
}

/// A heap source backed by the program break.
///
/// Each grow pushes the break upwards through `sbrk`. The break is shared
/// process state, so mixing this with anything else that moves it (libc's
/// own allocator included) produces discontiguous spans, which the
/// bookkeeper rejects rather than corrupting the heap.
#[cfg(unix)]
#[derive(Default)]
pub struct Sbrk;

#[cfg(unix)]
impl Sbrk {
    /// Create a handle to the program break.
    pub const fn new() -> Sbrk {
        Sbrk
    }
}

#[cfg(unix)]
impl HeapSource for Sbrk {
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>> {
        // `sbrk` reports failure by returning -1 cast to a pointer.
        const FAILED: *mut libc::c_void = usize::MAX as *mut libc::c_void;

        unsafe {
            let cur = libc::sbrk(0);
            if cur == FAILED {
                return None;
            }

            // The OS does not promise an aligned break, so pad the first
            // grow up to the alignment granularity. Later grows resume at
            // the end of the previous one and get a zero pad.
            let pad = (ALIGNMENT - cur as usize % ALIGNMENT) % ALIGNMENT;

            // Important! The conversion is failable to avoid arithmetic
            // overflow on absurd sizes.
            let increment = libc::intptr_t::try_from(size.checked_add(pad)?).ok()?;

            let old = libc::sbrk(increment);
            if old == FAILED {
                return None;
            }

            NonNull::new((old as *mut u8).add(pad))
        }
    }
}

/// A heap source carved out of a span the caller already owns.
///
/// The arena hands out consecutive slices of its span until it runs dry, at
/// which point every grow fails. Nothing is ever handed back: the span is
/// spoken for until the program ends, which is why construction demands a
/// `'static` borrow.
pub struct Arena {
    base: NonNull<u8>,
    cap: usize,
    brk: usize,
}

impl Arena {
    /// Create an arena over `span`.
    ///
    /// The usable capacity is trimmed to the aligned part of the span, so a
    /// few leading and trailing bytes may go unused.
    pub fn new(span: &'static mut [u8]) -> Arena {
        // SAFETY: a `'static` exclusive borrow is ours for good.
        unsafe { Arena::from_raw(span.as_mut_ptr(), span.len()) }
    }

    /// Create an arena over the `size` bytes starting at `base`.
    ///
    /// # Safety
    ///
    /// The span must be valid for reads and writes, must not overlap another
    /// arena, and must not be touched by anything else for as long as the
    /// arena (or a heap built on it) is in use.
    pub unsafe fn from_raw(base: *mut u8, size: usize) -> Arena {
        let pad = (ALIGNMENT - base as usize % ALIGNMENT) % ALIGNMENT;
        let cap = size.saturating_sub(pad) & !(ALIGNMENT - 1);

        Arena {
            base: NonNull::new_unchecked(base.add(pad)),
            cap,
            brk: 0,
        }
    }

    /// The usable capacity of the span in bytes.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The number of bytes grown so far.
    pub fn used(&self) -> usize {
        self.brk
    }
}

impl HeapSource for Arena {
    fn grow(&mut self, size: usize) -> Option<NonNull<u8>> {
        let new_brk = self.brk.checked_add(size)?;
        if new_brk > self.cap {
            return None;
        }

        // SAFETY: the span is ours, and `brk` never leaves `cap`.
        let start = unsafe { self.base.as_ptr().add(self.brk) };
        self.brk = new_brk;

        NonNull::new(start)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaked(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn arena_grows_contiguously() {
        let mut arena = Arena::new(leaked(256));

        let first = arena.grow(64).unwrap();
        let second = arena.grow(32).unwrap();

        assert_eq!(unsafe { first.as_ptr().add(64) }, second.as_ptr());
        assert_eq!(arena.used(), 96);
    }

    #[test]
    fn arena_runs_dry() {
        let mut arena = Arena::new(leaked(64));
        let cap = arena.capacity();

        assert!(arena.grow(cap).is_some());
        assert!(arena.grow(1).is_none());
        // A failed grow must not consume capacity.
        assert_eq!(arena.used(), cap);
    }

    #[test]
    fn arena_trims_to_alignment() {
        let span = leaked(128);
        // SAFETY: still within the leaked span, just deliberately skewed.
        let mut arena = unsafe { Arena::from_raw(span.as_mut_ptr().add(1), 65) };

        assert!(arena.capacity() <= 64);
        assert_eq!(arena.capacity() % ALIGNMENT, 0);

        let p = arena.grow(8).unwrap();
        assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn arena_rejects_overflow() {
        let mut arena = Arena::new(leaked(64));

        assert!(arena.grow(usize::MAX).is_none());
        assert_eq!(arena.used(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn sbrk_grows_aligned() {
        let mut sbrk = Sbrk::new();
        let p = sbrk.grow(64).unwrap();

        assert_eq!(p.as_ptr() as usize % ALIGNMENT, 0);
        // The span must be ours to write.
        unsafe {
            p.as_ptr().write_bytes(0x5a, 64);
            assert_eq!(*p.as_ptr().add(63), 0x5a);
        }
    }
}
