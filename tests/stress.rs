//! Randomized churn against a shadow model.

mod util;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One live allocation: address, length, fill byte.
type Span = (usize, usize, u8);

fn verify_span(span: Span) {
    unsafe { util::verify(span.0 as *const u8, span.1, span.2) };
}

#[test]
fn random_churn_holds_up() {
    let mut heap = util::heap_with(8 << 20, segfit::CHUNK);
    let mut rng = StdRng::seed_from_u64(0x5e6f17);
    let mut live: Vec<Span> = Vec::new();

    for op in 0..4000 {
        let roll: u32 = rng.gen_range(0..100);

        if live.is_empty() || roll < 55 {
            // Allocate and fill.
            let len = rng.gen_range(1..700);
            let byte = rng.gen();
            let p = heap.alloc(len);
            assert!(!p.is_null());
            unsafe { util::stamp(p, len, byte) };
            live.push((p as usize, len, byte));
        } else if roll < 80 {
            // Free a random survivor, checking its fill on the way out.
            let victim = live.swap_remove(rng.gen_range(0..live.len()));
            verify_span(victim);
            unsafe { heap.free(victim.0 as *mut u8) };
        } else if roll < 95 {
            // Reallocate a random survivor.
            let at = rng.gen_range(0..live.len());
            let (addr, len, byte) = live[at];
            let new_len = rng.gen_range(1..900);

            let q = unsafe { heap.realloc(addr as *mut u8, new_len) };
            assert!(!q.is_null());
            // The common prefix survives the move; then refill.
            unsafe {
                util::verify(q, len.min(new_len), byte);
                let fresh = rng.gen();
                util::stamp(q, new_len, fresh);
                live[at] = (q as usize, new_len, fresh);
            }
        } else {
            // Calloc must hand out zeroes no matter what was there before.
            let len = rng.gen_range(1..300);
            let p = heap.calloc(1, len);
            assert!(!p.is_null());
            unsafe { util::verify(p, len, 0) };
            let byte = rng.gen();
            unsafe { util::stamp(p, len, byte) };
            live.push((p as usize, len, byte));
        }

        if op % 256 == 0 {
            assert_eq!(heap.check(false), 0, "heap sick after op {}", op);
            let mut spans: Vec<(usize, usize)> =
                live.iter().map(|&(addr, len, _)| (addr, len)).collect();
            util::assert_disjoint(&mut spans);
        }
    }

    // Everything out: every fill intact, then one open block left.
    for span in live.drain(..) {
        verify_span(span);
        unsafe { heap.free(span.0 as *mut u8) };
    }
    assert_eq!(heap.blocks().count(), 1);
    assert_eq!(heap.check(true), 0);
}

#[test]
fn the_granule_changes_pacing_not_behavior() {
    let mut grow_counts = Vec::new();

    for chunk in [64, 160, 1024, 4096, 65536] {
        let mut heap = util::heap_with(4 << 20, chunk);
        let mut rng = StdRng::seed_from_u64(0xc4a8);
        let mut live = Vec::new();

        // The same workload against every granule.
        for _ in 0..600 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let len = rng.gen_range(1..600);
                let p = heap.alloc(len);
                assert!(!p.is_null());
                live.push(p);
            } else {
                let p = live.swap_remove(rng.gen_range(0..live.len()));
                unsafe { heap.free(p) };
            }
        }
        assert_eq!(heap.check(false), 0);

        for p in live {
            unsafe { heap.free(p) };
        }
        assert_eq!(heap.blocks().count(), 1);
        assert_eq!(heap.check(false), 0);

        grow_counts.push(heap.grows());
    }

    // Bigger granules cannot mean more trips to the source.
    assert!(grow_counts.first() >= grow_counts.last());
}

#[test]
fn two_thousand_minimum_blocks() {
    let mut heap = util::heap_with(1 << 20, segfit::CHUNK);

    let ptrs: Vec<*mut u8> = (0..2000).map(|_| heap.alloc(1)).collect();
    assert!(ptrs.iter().all(|p| !p.is_null()));

    let mut spans: Vec<(usize, usize)> = ptrs.iter().map(|&p| (p as usize, 1)).collect();
    util::assert_disjoint(&mut spans);
    assert_eq!(heap.check(false), 0);

    for &p in &ptrs {
        unsafe { heap.free(p) };
    }
    assert_eq!(heap.blocks().count(), 1);
    assert_eq!(heap.check(false), 0);
}
