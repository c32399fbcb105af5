//! Freed memory must come back.

mod util;

#[test]
fn a_freed_block_is_reused() {
    let mut heap = util::heap();

    let p = heap.alloc(100);
    assert!(!p.is_null());
    unsafe { heap.free(p) };

    // The freed span merged back into the open block at the bottom, so the
    // next fit lands on the very same payload.
    let q = heap.alloc(100);
    assert_eq!(p, q);
}

#[test]
fn reuse_needs_no_growth() {
    let mut heap = util::heap();
    let before = heap.grows();

    // Churn within what the heap already owns.
    for _ in 0..100 {
        let p = heap.alloc(128);
        let q = heap.alloc(512);
        assert!(!p.is_null() && !q.is_null());
        unsafe {
            heap.free(p);
            heap.free(q);
        }
    }

    assert_eq!(heap.grows(), before);
    assert_eq!(heap.check(false), 0);
}

#[test]
fn a_big_hole_serves_smaller_requests() {
    let mut heap = util::heap();

    let big = heap.alloc(1000);
    let fence = heap.alloc(24);
    assert!(!big.is_null() && !fence.is_null());
    unsafe { heap.free(big) };

    // The hole is split over and over instead of growing the heap.
    let before = heap.grows();
    let mut spans = Vec::new();
    for _ in 0..4 {
        let p = heap.alloc(200);
        assert!(!p.is_null());
        spans.push((p as usize, 200));
    }

    assert_eq!(heap.grows(), before);
    util::assert_disjoint(&mut spans);
    assert!(spans.iter().all(|&(at, _)| at >= big as usize && at < fence as usize));
}

#[test]
fn holes_are_found_in_their_classes() {
    // Three holes in three different size classes, kept apart by live
    // fence allocations so they cannot merge. Every hole must be found
    // again by a request of its size.
    let mut heap = util::heap_with(1 << 16, 8192);

    let small = heap.alloc(20);
    let f1 = heap.alloc(8);
    let medium = heap.alloc(120);
    let f2 = heap.alloc(8);
    let large = heap.alloc(2000);
    let f3 = heap.alloc(8);
    assert!(!f1.is_null() && !f2.is_null() && !f3.is_null());

    unsafe {
        heap.free(small);
        heap.free(medium);
        heap.free(large);
    }
    assert_eq!(heap.check(false), 0);

    // Each request rounds to exactly its hole's size, so the hole is
    // reused in place, biggest to smallest, with no growth at all.
    let before = heap.grows();
    assert_eq!(heap.alloc(2000), large);
    assert_eq!(heap.alloc(120), medium);
    assert_eq!(heap.alloc(20), small);
    assert_eq!(heap.grows(), before);
}
