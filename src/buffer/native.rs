use crate::buffer::{BufferStrategy, StrategyKind};
use crate::engine::{check_extent, convolve};
use crate::foundation::core::CancelToken;
use crate::foundation::error::ConvResult;
use crate::kernel::Kernel;
use crate::raster::Raster;

/// Filters directly between the locked native memory of the source and destination rasters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLockedStrategy;

impl BufferStrategy for NativeLockedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NativeLocked
    }

    fn apply(&self, src: &Raster, kernel: &Kernel, cancel: &CancelToken) -> ConvResult<Raster> {
        check_extent(src.width(), src.height())?;
        let mut dst = Raster::blank_like(src)?;
        dst.copy_border_from(src, Kernel::RADIUS);
        dst.copy_alpha_from(src);

        {
            let read = src.lock_read()?;
            let mut write = dst.lock_write()?;
            let (src_geom, dst_geom) = (read.geometry(), write.geometry());
            convolve(
                read.bytes(),
                &src_geom,
                write.bytes_mut(),
                &dst_geom,
                kernel,
                cancel,
            )?;
        }
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::ConvError;

    #[test]
    fn locks_are_released_after_success_and_error() {
        let src = Raster::from_rgb8(6, 6, &[9; 6 * 6 * 3]).unwrap();
        NativeLockedStrategy.filter(&src).unwrap();
        assert!(!src.is_locked());

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = NativeLockedStrategy
            .apply(&src, Kernel::laplace(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ConvError::Cancelled));
        assert!(!src.is_locked());
    }

    #[test]
    fn source_already_locked_is_reported() {
        let src = Raster::from_rgb8(6, 6, &[9; 6 * 6 * 3]).unwrap();
        let _held = src.lock_read().unwrap();
        assert!(matches!(
            NativeLockedStrategy.filter(&src),
            Err(ConvError::AlreadyLocked(_))
        ));
    }
}
