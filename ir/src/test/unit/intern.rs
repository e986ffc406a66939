use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::Sum;
use crate::intern::OpCache;

static CACHE: OpCache<Sum> = OpCache::new();

// Tests below count live entries of the shared cache.
static CACHE_TEST_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn test_structurally_equal_ops_share_instance() {
    let _guard = CACHE_TEST_MUTEX.lock();
    let a = CACHE.intern(Sum { axes: vec![0, 1], keepdims: false });
    let b = CACHE.intern(Sum { axes: vec![0, 1], keepdims: false });
    let c = CACHE.intern(Sum { axes: vec![0], keepdims: false });

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(CACHE.live_count(), 2);
}

#[test]
fn test_dropped_ops_are_collected() {
    let _guard = CACHE_TEST_MUTEX.lock();
    CACHE.gc_dead_refs();
    assert_eq!(CACHE.live_count(), 0);

    let a = CACHE.intern(Sum { axes: vec![2], keepdims: true });
    assert_eq!(CACHE.live_count(), 1);
    drop(a);
    assert_eq!(CACHE.live_count(), 0);
    CACHE.gc_dead_refs();

    let fresh = CACHE.intern(Sum { axes: vec![2], keepdims: true });
    assert_eq!(fresh.axes, vec![2]);
    assert_eq!(CACHE.live_count(), 1);
}
