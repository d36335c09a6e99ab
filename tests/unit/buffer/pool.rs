use super::*;

use std::sync::Arc;

fn small_pool(max_pool_bytes: usize, max_buffers_per_bucket: usize) -> BufferPool {
    BufferPool::new(PoolOpts {
        max_pool_bytes,
        max_buffers_per_bucket,
        min_class_bytes: 64,
    })
}

#[test]
fn pool_honors_bucket_cap() {
    let p = small_pool(1 << 30, 1);

    let a = p.rent(64).unwrap();
    let b = p.rent(64).unwrap();
    p.give_back(a);
    p.give_back(b);

    let st = p.stats();
    assert_eq!(st.retained_buffers, 1);
    assert_eq!(st.dropped_on_return, 1);
    assert_eq!(st.outstanding, 0);
}

#[test]
fn pool_honors_global_byte_cap() {
    let p = small_pool(64, 8);

    let a = p.rent(64).unwrap();
    let b = p.rent(64).unwrap();
    p.give_back(a);
    p.give_back(b);

    let st = p.stats();
    assert_eq!(st.retained_bytes, 64);
    assert_eq!(st.retained_buffers, 1);
    assert!(st.dropped_on_return >= 1);
}

#[test]
fn rented_buffer_may_be_larger_and_is_reused_by_class() {
    let p = small_pool(1 << 20, 4);
    let a = p.rent(100).unwrap();
    assert_eq!(a.len(), 100);
    assert_eq!(a.capacity(), 128);
    let addr = a.as_ptr();
    p.give_back(a);

    let b = p.rent(70).unwrap();
    assert_eq!(b.capacity(), 128);
    assert_eq!(b.as_ptr(), addr);
    p.give_back(b);

    let st = p.stats();
    assert_eq!(st.allocated_buffers, 1);
    assert_eq!(st.rented, 2);
    assert_eq!(st.returned, 2);
}

#[test]
fn zero_length_rent_is_invalid_size() {
    let p = BufferPool::default();
    assert!(matches!(p.rent(0), Err(ConvError::InvalidSize(_))));
    assert!(matches!(p.lease(0), Err(ConvError::InvalidSize(_))));
    assert_eq!(p.stats().outstanding, 0);
}

#[test]
#[should_panic(expected = "buffer returned to pool")]
fn returning_to_foreign_pool_panics() {
    let a = BufferPool::default();
    let b = BufferPool::default();
    let buf = a.rent(16).unwrap();
    b.give_back(buf);
}

#[test]
fn lease_returns_on_drop_and_on_panic() {
    let p = BufferPool::default();
    {
        let mut l = p.lease(32).unwrap();
        l.as_mut_slice().fill(1);
        assert_eq!(p.stats().outstanding, 1);
    }
    assert_eq!(p.stats().outstanding, 0);

    let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _l = p.lease(32).unwrap();
        panic!("mid-pass failure");
    }));
    assert!(r.is_err());
    let st = p.stats();
    assert_eq!(st.outstanding, 0);
    assert_eq!(st.returned, 2);
}

#[test]
fn trim_and_retention_drop_retained_buffers() {
    let p = small_pool(1 << 20, 8);
    let bufs: Vec<_> = (0..4).map(|_| p.rent(64).unwrap()).collect();
    for b in bufs {
        p.give_back(b);
    }
    assert_eq!(p.stats().retained_buffers, 4);

    p.set_retention(PoolOpts {
        max_pool_bytes: 1 << 20,
        max_buffers_per_bucket: 2,
        min_class_bytes: 64,
    });
    assert_eq!(p.stats().retained_buffers, 2);

    p.trim();
    let st = p.stats();
    assert_eq!(st.retained_buffers, 0);
    assert_eq!(st.retained_bytes, 0);
}

#[test]
fn concurrent_rentals_never_share_storage() {
    let p = Arc::new(small_pool(1 << 24, 4));
    let handles: Vec<_> = (0u8..8)
        .map(|tag| {
            let p = Arc::clone(&p);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let mut l = p.lease(256).unwrap();
                    l.as_mut_slice().fill(tag);
                    std::thread::yield_now();
                    assert!(l.as_slice().iter().all(|&v| v == tag));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let st = p.stats();
    assert_eq!(st.outstanding, 0);
    assert_eq!(st.rented, 1600);
    assert_eq!(st.returned, 1600);
}
