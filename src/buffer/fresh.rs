use crate::buffer::{BufferStrategy, StrategyKind, allocate_zeroed, finish_packed};
use crate::engine::{check_extent, convolve};
use crate::foundation::core::{CancelToken, PlaneGeometry};
use crate::foundation::error::ConvResult;
use crate::kernel::Kernel;
use crate::raster::Raster;

/// Allocates both copy buffers per pass; they are freed when the pass returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshStrategy;

impl FreshStrategy {
    pub fn acquire(&self, len: usize) -> ConvResult<Vec<u8>> {
        allocate_zeroed(len)
    }
}

impl BufferStrategy for FreshStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fresh
    }

    fn apply(&self, src: &Raster, kernel: &Kernel, cancel: &CancelToken) -> ConvResult<Raster> {
        check_extent(src.width(), src.height())?;
        let geom = PlaneGeometry::packed_rgb(src.width(), src.height())?;
        let len = geom.byte_len()?;

        let mut input = self.acquire(len)?;
        let mut output = self.acquire(len)?;
        src.read_packed_rgb(&mut input);
        convolve(
            input.as_slice(),
            &geom,
            output.as_mut_slice(),
            &geom,
            kernel,
            cancel,
        )?;
        finish_packed(src, &output)
    }
}
