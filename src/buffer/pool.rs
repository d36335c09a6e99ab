use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::foundation::error::{ConvError, ConvResult};

/// Retention limits for a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOpts {
    /// Maximum bytes retained across all size classes.
    pub max_pool_bytes: usize,
    /// Maximum number of retained buffers per size class.
    pub max_buffers_per_bucket: usize,
    /// Smallest size class handed out.
    pub min_class_bytes: usize,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 256 * 1024 * 1024,
            max_buffers_per_bucket: 8,
            min_class_bytes: 4096,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers rented and not yet given back.
    pub outstanding: usize,
    pub retained_buffers: usize,
    pub retained_bytes: usize,
    pub rented: u64,
    pub returned: u64,
    pub allocated_buffers: u64,
    pub allocated_bytes: u64,
    pub dropped_on_return: u64,
}

/// A buffer on loan from a [`BufferPool`].
///
/// The backing storage is at least as long as the requested length, rounded up to the pool's
/// size class. Contents are whatever the previous borrower left behind.
#[derive(Debug)]
pub struct RentedBuffer {
    pool_id: u64,
    requested: usize,
    buf: Box<[u8]>,
}

impl RentedBuffer {
    /// Length that was asked for.
    pub fn len(&self) -> usize {
        self.requested
    }

    pub fn is_empty(&self) -> bool {
        self.requested == 0
    }

    /// Length of the backing storage (the size class).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The requested prefix.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.requested]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.requested]
    }

    /// Address of the backing storage; stable for the lifetime of the rental.
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }
}

struct PoolState {
    opts: PoolOpts,
    stats: PoolStats,
    buckets: HashMap<usize, Vec<Box<[u8]>>>,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Thread-safe pool of byte buffers keyed only by power-of-two size class.
///
/// Rent/return happen at image granularity, so a single mutex over all buckets is enough.
/// A buffer must go back to the pool that issued it; anything else panics.
pub struct BufferPool {
    id: u64,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolOpts::default())
    }
}

impl BufferPool {
    pub fn new(opts: PoolOpts) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(PoolState {
                opts,
                stats: PoolStats::default(),
                buckets: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding the lock cannot leave the buckets half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> PoolStats {
        self.state().stats.clone()
    }

    pub fn opts(&self) -> PoolOpts {
        self.state().opts
    }

    /// Update retention caps; already retained buffers above the new caps are dropped.
    pub fn set_retention(&self, opts: PoolOpts) {
        let mut st = self.state();
        st.opts = opts;
        let PoolState {
            opts,
            stats,
            buckets,
        } = &mut *st;
        for (&class, bucket) in buckets.iter_mut() {
            while bucket.len() > opts.max_buffers_per_bucket
                || (stats.retained_bytes > opts.max_pool_bytes && !bucket.is_empty())
            {
                bucket.pop();
                stats.retained_buffers = stats.retained_buffers.saturating_sub(1);
                stats.retained_bytes = stats.retained_bytes.saturating_sub(class);
            }
        }
    }

    /// Release every retained buffer back to the allocator.
    pub fn trim(&self) {
        let mut st = self.state();
        let freed = st.stats.retained_bytes;
        st.buckets.clear();
        st.stats.retained_buffers = 0;
        st.stats.retained_bytes = 0;
        tracing::debug!(pool = self.id, freed_bytes = freed, "trimmed buffer pool");
    }

    fn size_class(&self, len: usize) -> ConvResult<usize> {
        if len == 0 {
            return Err(ConvError::invalid_size("cannot rent a zero-length buffer"));
        }
        let min = self.opts().min_class_bytes.max(1);
        len.max(min)
            .checked_next_power_of_two()
            .ok_or_else(|| ConvError::invalid_size(format!("{len} bytes has no size class")))
    }

    /// Rent a buffer of at least `len` bytes.
    pub fn rent(&self, len: usize) -> ConvResult<RentedBuffer> {
        let class = self.size_class(len)?;

        let reused = {
            let mut st = self.state();
            let hit = st.buckets.get_mut(&class).and_then(Vec::pop);
            if hit.is_some() {
                st.stats.retained_buffers = st.stats.retained_buffers.saturating_sub(1);
                st.stats.retained_bytes = st.stats.retained_bytes.saturating_sub(class);
                st.stats.rented += 1;
                st.stats.outstanding += 1;
            }
            hit
        };

        let buf = match reused {
            Some(buf) => buf,
            None => {
                let mut v = Vec::new();
                v.try_reserve_exact(class)
                    .map_err(|e| ConvError::exhausted(format!("pool class {class}: {e}")))?;
                v.resize(class, 0);
                let mut st = self.state();
                st.stats.allocated_buffers += 1;
                st.stats.allocated_bytes += class as u64;
                st.stats.rented += 1;
                st.stats.outstanding += 1;
                tracing::trace!(pool = self.id, class, "allocated pool buffer");
                v.into_boxed_slice()
            }
        };

        Ok(RentedBuffer {
            pool_id: self.id,
            requested: len,
            buf,
        })
    }

    /// Give a rented buffer back.
    ///
    /// # Panics
    ///
    /// If `buf` was issued by a different pool.
    pub fn give_back(&self, buf: RentedBuffer) {
        assert_eq!(
            buf.pool_id, self.id,
            "buffer returned to pool {} but was rented from pool {}",
            self.id, buf.pool_id
        );
        let class = buf.buf.len();
        let mut st = self.state();
        st.stats.outstanding = st
            .stats
            .outstanding
            .checked_sub(1)
            .expect("pool outstanding count underflow");
        st.stats.returned += 1;

        let opts = st.opts;
        if opts.max_pool_bytes == 0
            || opts.max_buffers_per_bucket == 0
            || st.stats.retained_bytes.saturating_add(class) > opts.max_pool_bytes
        {
            st.stats.dropped_on_return += 1;
            return;
        }
        let bucket = st.buckets.entry(class).or_default();
        if bucket.len() >= opts.max_buffers_per_bucket {
            st.stats.dropped_on_return += 1;
            return;
        }
        bucket.push(buf.buf);
        st.stats.retained_buffers += 1;
        st.stats.retained_bytes += class;
    }

    /// Rent a buffer that goes back to this pool when the lease drops, on every exit path.
    pub fn lease(&self, len: usize) -> ConvResult<PoolLease<'_>> {
        Ok(PoolLease {
            pool: self,
            buf: Some(self.rent(len)?),
        })
    }
}

/// Scoped rental from a [`BufferPool`].
pub struct PoolLease<'p> {
    pool: &'p BufferPool,
    buf: Option<RentedBuffer>,
}

impl PoolLease<'_> {
    fn inner(&self) -> &RentedBuffer {
        self.buf.as_ref().expect("lease holds a buffer until drop")
    }

    fn inner_mut(&mut self) -> &mut RentedBuffer {
        self.buf.as_mut().expect("lease holds a buffer until drop")
    }

    pub fn len(&self) -> usize {
        self.inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner().capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner().as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.inner_mut().as_mut_slice()
    }
}

impl Drop for PoolLease<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/pool.rs"]
mod tests;
