use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::core::{PixelLayout, PlaneGeometry};
use crate::foundation::error::{ConvError, ConvResult};

/// An owned image in its native memory layout.
///
/// Rows are `stride` bytes apart; the stride is padded to a 4-byte boundary so it can exceed
/// `width * bytes_per_pixel`. Samples are stored in `B, G, R[, A]` order (see [`PixelLayout`]).
#[derive(Debug)]
pub struct Raster {
    width: u32,
    height: u32,
    layout: PixelLayout,
    stride: usize,
    data: Vec<u8>,
    locked: AtomicBool,
}

impl Clone for Raster {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            layout: self.layout,
            stride: self.stride,
            data: self.data.clone(),
            locked: AtomicBool::new(false),
        }
    }
}

impl PartialEq for Raster {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.layout == other.layout
            && self.data == other.data
    }
}

impl Eq for Raster {}

impl Raster {
    /// Zero-filled raster.
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> ConvResult<Self> {
        if width == 0 || height == 0 {
            return Err(ConvError::invalid_size(format!(
                "raster must be non-empty, got {width}x{height}"
            )));
        }
        let stride = layout.stride_for(width)?;
        let len = stride
            .checked_mul(height as usize)
            .ok_or_else(|| ConvError::invalid_size("raster size overflow"))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| ConvError::exhausted(format!("raster of {len} bytes: {e}")))?;
        data.resize(len, 0);
        Ok(Self {
            width,
            height,
            layout,
            stride,
            data,
            locked: AtomicBool::new(false),
        })
    }

    /// Zero-filled raster with the same extent and layout as `other`.
    pub fn blank_like(other: &Raster) -> ConvResult<Self> {
        Self::new(other.width, other.height, other.layout)
    }

    /// Build an `Rgb24` raster from tightly packed `R, G, B` rows.
    pub fn from_rgb8(width: u32, height: u32, rgb: &[u8]) -> ConvResult<Self> {
        let mut out = Self::new(width, height, PixelLayout::Rgb24)?;
        if rgb.len() != width as usize * height as usize * 3 {
            return Err(ConvError::invalid_input(
                "from_rgb8 expects width*height*3 bytes",
            ));
        }
        for (i, px) in rgb.chunks_exact(3).enumerate() {
            let x = i % width as usize;
            let y = i / width as usize;
            out.set_rgb(x, y, [px[0], px[1], px[2]]);
        }
        Ok(out)
    }

    /// Build an `Argb32` raster from tightly packed straight-alpha `R, G, B, A` rows.
    pub fn from_rgba8(width: u32, height: u32, rgba: &[u8]) -> ConvResult<Self> {
        let mut out = Self::new(width, height, PixelLayout::Argb32)?;
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(ConvError::invalid_input(
                "from_rgba8 expects width*height*4 bytes",
            ));
        }
        for (i, px) in rgba.chunks_exact(4).enumerate() {
            let x = i % width as usize;
            let y = i / width as usize;
            out.set_rgb(x, y, [px[0], px[1], px[2]]);
            out.set_alpha(x, y, px[3]);
        }
        Ok(out)
    }

    /// Images with an alpha channel become `Argb32`, everything else `Rgb24`.
    pub fn from_dynamic(img: &image::DynamicImage) -> ConvResult<Self> {
        if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            Self::from_rgba8(w, h, rgba.as_raw())
        } else {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            Self::from_rgb8(w, h, rgb.as_raw())
        }
    }

    pub fn to_dynamic(&self) -> image::DynamicImage {
        match self.layout {
            PixelLayout::Rgb24 => {
                let mut packed = vec![0u8; self.width as usize * self.height as usize * 3];
                self.read_packed_rgb(&mut packed);
                image::RgbImage::from_raw(self.width, self.height, packed)
                    .map(image::DynamicImage::ImageRgb8)
                    .unwrap_or_else(|| image::DynamicImage::new_rgb8(self.width, self.height))
            }
            PixelLayout::Argb32 => {
                let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * 4);
                for y in 0..self.height as usize {
                    for x in 0..self.width as usize {
                        let [r, g, b] = self.rgb(x, y);
                        packed.extend_from_slice(&[r, g, b, self.alpha(x, y).unwrap_or(255)]);
                    }
                }
                image::RgbaImage::from_raw(self.width, self.height, packed)
                    .map(image::DynamicImage::ImageRgba8)
                    .unwrap_or_else(|| image::DynamicImage::new_rgba8(self.width, self.height))
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn geometry(&self) -> PlaneGeometry {
        PlaneGeometry::native(self.width, self.height, self.stride, self.layout)
    }

    /// Canonical `[R, G, B]` of pixel `(x, y)`.
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let g = self.geometry();
        let base = g.offset(x, y);
        [
            self.data[base + g.rgb[0]],
            self.data[base + g.rgb[1]],
            self.data[base + g.rgb[2]],
        ]
    }

    pub fn alpha(&self, x: usize, y: usize) -> Option<u8> {
        let g = self.geometry();
        g.alpha.map(|a| self.data[g.offset(x, y) + a])
    }

    pub fn set_rgb(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let g = self.geometry();
        let base = g.offset(x, y);
        for (c, v) in rgb.into_iter().enumerate() {
            self.data[base + g.rgb[c]] = v;
        }
    }

    pub fn set_alpha(&mut self, x: usize, y: usize, a: u8) {
        let g = self.geometry();
        if let Some(off) = g.alpha {
            self.data[g.offset(x, y) + off] = a;
        }
    }

    /// Copy every pixel into `dst` as tightly packed canonical `R, G, B`.
    ///
    /// `dst` may be longer than `width * height * 3` (pooled buffers); the tail is untouched.
    pub(crate) fn read_packed_rgb(&self, dst: &mut [u8]) {
        let w = self.width as usize;
        for y in 0..self.height as usize {
            for x in 0..w {
                let i = (y * w + x) * 3;
                dst[i..i + 3].copy_from_slice(&self.rgb(x, y));
            }
        }
    }

    /// Overwrite interior pixels (at least `border` away from every edge) from packed RGB.
    pub(crate) fn write_interior_from_packed(&mut self, packed: &[u8], border: usize) {
        let w = self.width as usize;
        let h = self.height as usize;
        for y in border..h.saturating_sub(border) {
            for x in border..w.saturating_sub(border) {
                let i = (y * w + x) * 3;
                self.set_rgb(x, y, [packed[i], packed[i + 1], packed[i + 2]]);
            }
        }
    }

    /// Copy whole pixels within `border` of any edge from `src`. Extents must match.
    pub(crate) fn copy_border_from(&mut self, src: &Raster, border: usize) {
        debug_assert_eq!((self.width, self.height), (src.width, src.height));
        let w = self.width as usize;
        let h = self.height as usize;
        let bpp = self.layout.bytes_per_pixel();
        let same_layout = self.layout == src.layout;
        for y in 0..h {
            let edge_row = y < border || y + border >= h;
            for x in 0..w {
                if !edge_row && x >= border && x + border < w {
                    continue;
                }
                if same_layout {
                    let o = y * self.stride + x * bpp;
                    self.data[o..o + bpp].copy_from_slice(&src.data[o..o + bpp]);
                } else {
                    self.set_rgb(x, y, src.rgb(x, y));
                    if let Some(a) = src.alpha(x, y) {
                        self.set_alpha(x, y, a);
                    }
                }
            }
        }
    }

    /// Copy the alpha sample of every pixel from `src`; no-op unless both carry alpha.
    pub(crate) fn copy_alpha_from(&mut self, src: &Raster) {
        let (Some(_), Some(_)) = (self.layout.alpha_offset(), src.layout.alpha_offset()) else {
            return;
        };
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                if let Some(a) = src.alpha(x, y) {
                    self.set_alpha(x, y, a);
                }
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn try_lock(&self) -> ConvResult<()> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                ConvError::locked(format!(
                    "{}x{} {:?} raster",
                    self.width, self.height, self.layout
                ))
            })
    }

    /// Lock the native bytes for direct reading until the guard drops.
    pub fn lock_read(&self) -> ConvResult<ReadLock<'_>> {
        self.try_lock()?;
        Ok(ReadLock { raster: self })
    }

    /// Lock the native bytes for direct writing until the guard drops.
    pub fn lock_write(&mut self) -> ConvResult<WriteLock<'_>> {
        self.try_lock()?;
        Ok(WriteLock { raster: self })
    }
}

/// Read access to a raster's native memory. Unlocks on drop.
pub struct ReadLock<'a> {
    raster: &'a Raster,
}

impl ReadLock<'_> {
    pub fn bytes(&self) -> &[u8] {
        &self.raster.data
    }

    pub fn geometry(&self) -> PlaneGeometry {
        self.raster.geometry()
    }
}

impl Drop for ReadLock<'_> {
    fn drop(&mut self) {
        self.raster.locked.store(false, Ordering::Release);
    }
}

/// Write access to a raster's native memory. Unlocks on drop.
pub struct WriteLock<'a> {
    raster: &'a mut Raster,
}

impl WriteLock<'_> {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.raster.data
    }

    pub fn geometry(&self) -> PlaneGeometry {
        self.raster.geometry()
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        self.raster.locked.store(false, Ordering::Release);
    }
}
