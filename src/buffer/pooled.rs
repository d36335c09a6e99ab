use std::sync::Arc;

use crate::buffer::pool::{BufferPool, PoolLease};
use crate::buffer::{BufferStrategy, StrategyKind, finish_packed};
use crate::engine::{check_extent, convolve};
use crate::foundation::core::{CancelToken, PlaneGeometry};
use crate::foundation::error::ConvResult;
use crate::kernel::Kernel;
use crate::raster::Raster;

/// Rents both copy buffers from a shared pool and hands them back when the pass ends.
#[derive(Debug, Clone)]
pub struct PooledStrategy {
    pool: Arc<BufferPool>,
}

impl PooledStrategy {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn acquire(&self, len: usize) -> ConvResult<PoolLease<'_>> {
        self.pool.lease(len)
    }
}

impl BufferStrategy for PooledStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pooled
    }

    fn apply(&self, src: &Raster, kernel: &Kernel, cancel: &CancelToken) -> ConvResult<Raster> {
        check_extent(src.width(), src.height())?;
        let geom = PlaneGeometry::packed_rgb(src.width(), src.height())?;
        let len = geom.byte_len()?;

        let mut input = self.acquire(len)?;
        let mut output = self.acquire(len)?;
        // Pooled storage holds the previous borrower's pixels.
        output.as_mut_slice().fill(0);
        src.read_packed_rgb(input.as_mut_slice());
        convolve(
            input.as_slice(),
            &geom,
            output.as_mut_slice(),
            &geom,
            kernel,
            cancel,
        )?;
        finish_packed(src, output.as_slice())
    }
}
