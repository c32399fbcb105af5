//! Zeroed allocation.

mod util;

#[test]
fn calloc_hands_out_zeroes() {
    let mut heap = util::heap();

    let p = heap.calloc(25, 4);
    assert!(!p.is_null());
    unsafe { util::verify(p, 100, 0) };
}

#[test]
fn a_recycled_dirty_block_is_zeroed_again() {
    let mut heap = util::heap();

    // Dirty a block, free it, and ask calloc for the same spot.
    let p = heap.alloc(100);
    unsafe {
        util::stamp(p, 100, 0xff);
        heap.free(p);
    }

    let q = heap.calloc(10, 10);
    assert_eq!(q, p);
    unsafe { util::verify(q, 100, 0) };
}

#[test]
fn zero_counts_yield_null() {
    let mut heap = util::heap();

    assert!(heap.calloc(0, 8).is_null());
    assert!(heap.calloc(8, 0).is_null());
    assert_eq!(heap.check(false), 0);
}

#[test]
fn the_product_wraps_like_c() {
    let mut heap = util::heap();

    // An overflowing product is taken modulo the address space, exactly
    // like the C interface this mirrors. This one wraps to a huge value
    // that cannot be served.
    assert!(heap.calloc(usize::MAX, 2).is_null());

    // And this one wraps all the way down to 8, which is served (zeroed).
    let p = heap.calloc(usize::MAX / 2 + 5, 2);
    assert!(!p.is_null());
    unsafe { util::verify(p, 8, 0) };

    assert_eq!(heap.check(false), 0);
}
