use crate::foundation::core::{CancelToken, PlaneGeometry};
use crate::foundation::error::{ConvError, ConvResult};
use crate::kernel::Kernel;

/// Byte source the engine samples from.
///
/// Slices are bounds-checked on every read; pinned views skip the check because
/// [`convolve`] validates the whole plane against [`PixelRead::readable_len`] up front.
pub trait PixelRead {
    fn readable_len(&self) -> usize;
    fn read(&self, offset: usize) -> u8;
}

/// Byte sink the engine stores results into.
pub trait PixelWrite {
    fn writable_len(&self) -> usize;
    fn write(&mut self, offset: usize, value: u8);
}

impl PixelRead for [u8] {
    #[inline]
    fn readable_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn read(&self, offset: usize) -> u8 {
        self[offset]
    }
}

impl PixelWrite for [u8] {
    #[inline]
    fn writable_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u8) {
        self[offset] = value;
    }
}

/// Reject images the 5x5 kernel cannot fit into.
pub fn check_extent(width: u32, height: u32) -> ConvResult<()> {
    let min = Kernel::SIZE as u32;
    if width < min || height < min {
        return Err(ConvError::out_of_range(format!(
            "image {width}x{height} is smaller than the {min}x{min} kernel"
        )));
    }
    Ok(())
}

/// Smallest buffer that can back `g`: every row but the last is `stride` long.
pub fn required_len(g: &PlaneGeometry) -> ConvResult<usize> {
    if g.width == 0 || g.height == 0 {
        return Err(ConvError::invalid_size("plane must be non-empty"));
    }
    let row = g
        .width
        .checked_mul(g.pixel_bytes)
        .ok_or_else(|| ConvError::invalid_size("row size overflow"))?;
    if g.stride < row {
        return Err(ConvError::invalid_size(format!(
            "stride {} shorter than row of {row} bytes",
            g.stride
        )));
    }
    if g.rgb.iter().chain(g.alpha.iter()).any(|&o| o >= g.pixel_bytes) {
        return Err(ConvError::invalid_size("channel offset outside pixel"));
    }
    (g.height - 1)
        .checked_mul(g.stride)
        .and_then(|v| v.checked_add(row))
        .ok_or_else(|| ConvError::invalid_size("plane size overflow"))
}

#[inline]
fn clamp_u8(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

/// Apply `kernel` to every interior pixel of `src`, storing canonical R, G, B into `dst`.
///
/// Interior means at least [`Kernel::RADIUS`] pixels away from every edge; border pixels and
/// any alpha samples of `dst` are not touched. Each channel is summed independently and
/// clamped into `[0, 255]`. The result depends only on pixel values, never on the storage
/// order or stride of either plane. `cancel` is polled once per output row.
pub fn convolve<S, D>(
    src: &S,
    src_geom: &PlaneGeometry,
    dst: &mut D,
    dst_geom: &PlaneGeometry,
    kernel: &Kernel,
    cancel: &CancelToken,
) -> ConvResult<()>
where
    S: PixelRead + ?Sized,
    D: PixelWrite + ?Sized,
{
    check_extent(src_geom.width as u32, src_geom.height as u32)?;
    if !src_geom.same_extent(dst_geom) {
        return Err(ConvError::invalid_size(format!(
            "destination {}x{} does not match source {}x{}",
            dst_geom.width, dst_geom.height, src_geom.width, src_geom.height
        )));
    }
    let need_src = required_len(src_geom)?;
    if src.readable_len() < need_src {
        return Err(ConvError::invalid_size(format!(
            "source buffer holds {} bytes, plane needs {need_src}",
            src.readable_len()
        )));
    }
    let need_dst = required_len(dst_geom)?;
    if dst.writable_len() < need_dst {
        return Err(ConvError::invalid_size(format!(
            "destination buffer holds {} bytes, plane needs {need_dst}",
            dst.writable_len()
        )));
    }

    // Zero weights contribute nothing; only visit the 13 live taps.
    let mut taps = [(0usize, 0usize, 0i64); 25];
    let mut n_taps = 0;
    for (ky, row) in kernel.weights().iter().enumerate() {
        for (kx, &w) in row.iter().enumerate() {
            if w != 0 {
                taps[n_taps] = (ky, kx, i64::from(w));
                n_taps += 1;
            }
        }
    }
    let taps = &taps[..n_taps];

    let r = Kernel::RADIUS;
    let (w, h) = (src_geom.width, src_geom.height);
    let [sr, sg, sb] = src_geom.rgb;
    let [dr, dg, db] = dst_geom.rgb;

    for y in r..h - r {
        cancel.check()?;
        for x in r..w - r {
            // 25 taps of u8 * i32 cannot overflow i64.
            let mut acc = [0i64; 3];
            for &(ky, kx, weight) in taps {
                let base = src_geom.offset(x + kx - r, y + ky - r);
                acc[0] += i64::from(src.read(base + sr)) * weight;
                acc[1] += i64::from(src.read(base + sg)) * weight;
                acc[2] += i64::from(src.read(base + sb)) * weight;
            }
            let out = dst_geom.offset(x, y);
            dst.write(out + dr, clamp_u8(acc[0]));
            dst.write(out + dg, clamp_u8(acc[1]));
            dst.write(out + db, clamp_u8(acc[2]));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/engine.rs"]
mod tests;
