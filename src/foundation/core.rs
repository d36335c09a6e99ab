use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::foundation::error::{ConvError, ConvResult};

/// Channel layout of a raster as it is stored in memory.
///
/// Stored byte order follows the little-endian DIB convention: `Rgb24` pixels are laid out
/// as `B, G, R` and `Argb32` pixels as `B, G, R, A`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    Rgb24,
    Argb32,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Argb32 => 4,
        }
    }

    /// Byte offsets of the R, G and B samples inside one stored pixel.
    pub fn rgb_offsets(self) -> [usize; 3] {
        [2, 1, 0]
    }

    pub fn alpha_offset(self) -> Option<usize> {
        match self {
            Self::Rgb24 => None,
            Self::Argb32 => Some(3),
        }
    }

    /// Row stride in bytes, padded up to a 4-byte boundary.
    pub fn stride_for(self, width: u32) -> ConvResult<usize> {
        (width as usize)
            .checked_mul(self.bytes_per_pixel())
            .and_then(|v| v.checked_add(3))
            .map(|v| v & !3)
            .ok_or_else(|| ConvError::invalid_size("row stride overflow"))
    }
}

/// Where the canonical R, G, B (and optional alpha) samples of each pixel live in a plane.
///
/// The convolution engine only ever reasons in canonical RGB; a geometry maps that onto the
/// storage order of a particular buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneGeometry {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub pixel_bytes: usize,
    pub rgb: [usize; 3],
    pub alpha: Option<usize>,
}

impl PlaneGeometry {
    /// Tightly packed `R, G, B` rows, the layout of intermediate copy buffers.
    pub fn packed_rgb(width: u32, height: u32) -> ConvResult<Self> {
        let stride = (width as usize)
            .checked_mul(3)
            .ok_or_else(|| ConvError::invalid_size("packed row overflow"))?;
        Ok(Self {
            width: width as usize,
            height: height as usize,
            stride,
            pixel_bytes: 3,
            rgb: [0, 1, 2],
            alpha: None,
        })
    }

    pub fn native(width: u32, height: u32, stride: usize, layout: PixelLayout) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            stride,
            pixel_bytes: layout.bytes_per_pixel(),
            rgb: layout.rgb_offsets(),
            alpha: layout.alpha_offset(),
        }
    }

    /// Bytes a buffer must hold to back this plane.
    pub fn byte_len(&self) -> ConvResult<usize> {
        self.stride
            .checked_mul(self.height)
            .ok_or_else(|| ConvError::invalid_size("plane size overflow"))
    }

    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> usize {
        y * self.stride + x * self.pixel_bytes
    }

    pub fn same_extent(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Cooperative cancellation flag shared between a batch and its workers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> ConvResult<()> {
        if self.is_cancelled() {
            Err(ConvError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_padded_to_four_bytes() {
        assert_eq!(PixelLayout::Rgb24.stride_for(10).unwrap(), 32);
        assert_eq!(PixelLayout::Rgb24.stride_for(4).unwrap(), 12);
        assert_eq!(PixelLayout::Argb32.stride_for(7).unwrap(), 28);
    }

    #[test]
    fn packed_geometry_is_tight() {
        let g = PlaneGeometry::packed_rgb(10, 6).unwrap();
        assert_eq!(g.stride, 30);
        assert_eq!(g.byte_len().unwrap(), 180);
        assert_eq!(g.offset(2, 1), 36);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.cancel();
        assert!(matches!(a.check(), Err(ConvError::Cancelled)));
    }
}
