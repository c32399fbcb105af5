//! The global allocator.
//!
//! [`Locked`] wraps a heap in a spin lock, which is all it takes to serve
//! `GlobalAlloc` from it. The wrapper is `const`-constructible, so it can sit
//! in a `static` the way `#[global_allocator]` demands, and the heap inside
//! is set up on first touch: a global allocator gets hit well before `main`,
//! long before anyone could call [`init`](Locked::init) by hand.
//!
//! The engine only ever hands out granularity-aligned payloads. Layouts that
//! ask for more get the classic treatment: over-allocate, slide forward to
//! the first fitting address, and stash the backstep right under the pointer
//! handed out so `dealloc` can find its way home.
//!
//! One caveat while this serves as the global allocator: the heap emits
//! `log` records with the lock held, so a logger that allocates would
//! re-enter the lock and spin forever. Install a non-allocating logger, or
//! none.

use core::alloc::{GlobalAlloc, Layout};
use core::{cmp, ptr};

use spin::Mutex;

use crate::bookkeeper::Bookkeeper;
use crate::brk::HeapSource;
#[cfg(unix)]
use crate::brk::Sbrk;
use crate::error::AllocError;
use crate::tag::{ALIGNMENT, WORD};

/// A heap behind a spin lock.
///
/// The allocator itself is single-threaded; this wrapper adds the lock that
/// makes it shareable, and with an [`Sbrk`] source, a `#[global_allocator]`.
pub struct Locked<S> {
    inner: Mutex<Option<Bookkeeper<S>>>,
}

impl<S> Locked<S> {
    /// An empty slot. The heap inside is set up by [`init`](Self::init), or
    /// lazily on first allocation where the source allows it.
    pub const fn new() -> Locked<S> {
        Locked {
            inner: Mutex::new(None),
        }
    }
}

impl<S> Default for Locked<S> {
    fn default() -> Locked<S> {
        Locked::new()
    }
}

impl<S: HeapSource> Locked<S> {
    /// Set up the heap over `source` ahead of first use.
    ///
    /// A second call is a no-op: whoever got there first owns the slot, and
    /// the later source is dropped.
    pub fn init(&self, source: S) -> Result<(), AllocError> {
        let mut slot = self.inner.lock();
        if slot.is_none() {
            *slot = Some(Bookkeeper::new(source)?);
        }

        Ok(())
    }

    /// Run `f` on the heap under the lock, if the heap has been set up.
    pub fn with<R>(&self, f: impl FnOnce(&mut Bookkeeper<S>) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }
}

/// Set up the program-break heap on first touch.
#[cfg(unix)]
fn ensure(slot: &mut Option<Bookkeeper<Sbrk>>) -> Option<&mut Bookkeeper<Sbrk>> {
    if slot.is_none() {
        *slot = Bookkeeper::new(Sbrk::new()).ok();
    }

    slot.as_mut()
}

#[cfg(unix)]
unsafe impl GlobalAlloc for Locked<Sbrk> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut slot = self.inner.lock();
        let keeper = match ensure(&mut slot) {
            Some(keeper) => keeper,
            None => return ptr::null_mut(),
        };

        if layout.align() <= ALIGNMENT {
            keeper.alloc(layout.size())
        } else {
            alloc_overaligned(keeper, layout)
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut slot = self.inner.lock();
        if let Some(keeper) = slot.as_mut() {
            if layout.align() <= ALIGNMENT {
                keeper.free(ptr);
            } else {
                free_overaligned(keeper, ptr);
            }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            let mut slot = self.inner.lock();
            match slot.as_mut() {
                Some(keeper) => keeper.realloc(ptr, new_size),
                None => ptr::null_mut(),
            }
        } else {
            // The engine knows nothing of the stash; move by hand.
            let new = self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()));
            if !new.is_null() {
                ptr::copy_nonoverlapping(ptr, new, cmp::min(layout.size(), new_size));
                self.dealloc(ptr, layout);
            }

            new
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() <= ALIGNMENT {
            let mut slot = self.inner.lock();
            match ensure(&mut slot) {
                Some(keeper) => keeper.calloc(1, layout.size()),
                None => ptr::null_mut(),
            }
        } else {
            let ptr = self.alloc(layout);
            if !ptr.is_null() {
                ptr::write_bytes(ptr, 0, layout.size());
            }

            ptr
        }
    }
}

/// Serve a layout over-aligned for the engine.
///
/// Allocates `size + align + 4` bytes, returns the first `align`-multiple
/// far enough in to leave room for the stash word, and writes the backstep
/// (the distance back to the payload the engine knows) right under the
/// returned pointer.
unsafe fn alloc_overaligned<S: HeapSource>(keeper: &mut Bookkeeper<S>, layout: Layout) -> *mut u8 {
    let (size, align) = (layout.size(), layout.align());

    let request = match size.checked_add(align).and_then(|n| n.checked_add(WORD)) {
        Some(request) => request,
        None => return ptr::null_mut(),
    };

    let raw = keeper.alloc(request);
    if raw.is_null() {
        return ptr::null_mut();
    }

    // The first align-multiple past the stash word.
    let skew = match (raw as usize + WORD).checked_add(align - 1) {
        Some(n) => (n & !(align - 1)) - raw as usize,
        None => {
            keeper.free(raw);
            return ptr::null_mut();
        }
    };
    debug_assert!(skew >= WORD && skew + size <= request, "skew out of bounds");

    let aligned = raw.add(skew);
    (aligned.sub(WORD) as *mut u32).write(skew as u32);

    aligned
}

/// Free an allocation served by [`alloc_overaligned`].
unsafe fn free_overaligned<S: HeapSource>(keeper: &mut Bookkeeper<S>, ptr: *mut u8) {
    let skew = (ptr.sub(WORD) as *const u32).read();
    keeper.free(ptr.sub(skew as usize));
}
