//! Test automation.

use segfit::{Arena, Bookkeeper};

/// A heap over a fresh arena of `cap` bytes, growing by `chunk`-byte
/// granules.
#[allow(dead_code)]
pub fn heap_with(cap: usize, chunk: usize) -> Bookkeeper<Arena> {
    let span = Box::leak(vec![0u8; cap].into_boxed_slice());
    Bookkeeper::with_chunk(Arena::new(span), chunk).unwrap()
}

/// A heap over a megabyte arena with the default granule.
#[allow(dead_code)]
pub fn heap() -> Bookkeeper<Arena> {
    heap_with(1 << 20, segfit::CHUNK)
}

/// Fill an allocation with `byte`.
///
/// # Safety
///
/// `ptr` must point at `len` writable bytes.
#[allow(dead_code)]
pub unsafe fn stamp(ptr: *mut u8, len: usize, byte: u8) {
    ptr.write_bytes(byte, len);
}

/// Assert a span still carries its fill, byte for byte.
///
/// If the allocator ever hands out overlapping spans, someone else's fill
/// tears ours; this is what catches it.
///
/// # Safety
///
/// `ptr` must point at `len` readable bytes.
#[allow(dead_code)]
pub unsafe fn verify(ptr: *const u8, len: usize, byte: u8) {
    for i in 0..len {
        assert_eq!(*ptr.add(i), byte, "byte {} of the span torn", i);
    }
}

/// Assert that the given `(address, length)` spans are pairwise disjoint.
#[allow(dead_code)]
pub fn assert_disjoint(spans: &mut Vec<(usize, usize)>) {
    spans.sort();
    for pair in spans.windows(2) {
        assert!(
            pair[0].0 + pair[0].1 <= pair[1].0,
            "allocations at {:#x} and {:#x} overlap",
            pair[0].0,
            pair[1].0
        );
    }
}
