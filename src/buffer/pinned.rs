#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::buffer::{BufferStrategy, StrategyKind, allocate_zeroed, finish_packed};
use crate::engine::{PixelRead, PixelWrite, check_extent, convolve};
use crate::foundation::core::{CancelToken, PlaneGeometry};
use crate::foundation::error::ConvResult;
use crate::kernel::Kernel;
use crate::raster::Raster;

/// Non-owning read view over a buffer whose address is fixed while the view lives.
///
/// Reads are raw pointer offsets with no per-access bounds check.
pub(crate) struct PinnedRead<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> PinnedRead<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            ptr: NonNull::from(bytes).cast(),
            len: bytes.len(),
            _borrow: PhantomData,
        }
    }
}

impl PixelRead for PinnedRead<'_> {
    #[inline]
    fn readable_len(&self) -> usize {
        self.len
    }

    #[inline]
    fn read(&self, offset: usize) -> u8 {
        debug_assert!(offset < self.len, "pinned read at {offset} of {}", self.len);
        // SAFETY: only `convolve` reads through this view, and it checks the whole plane
        // against `readable_len` before the first access; every offset it computes falls
        // inside that plane. The borrow in `_borrow` keeps the storage alive and unmoved.
        unsafe { self.ptr.as_ptr().add(offset).read() }
    }
}

/// Non-owning write view; the exclusive borrow keeps other aliases out for its lifetime.
pub(crate) struct PinnedWrite<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> PinnedWrite<'a> {
    pub(crate) fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();
        Self {
            ptr: NonNull::from(bytes).cast(),
            len,
            _borrow: PhantomData,
        }
    }
}

impl PixelWrite for PinnedWrite<'_> {
    #[inline]
    fn writable_len(&self) -> usize {
        self.len
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u8) {
        debug_assert!(offset < self.len, "pinned write at {offset} of {}", self.len);
        // SAFETY: same bounds argument as `PinnedRead::read`; the view was built from a
        // `&mut [u8]`, so no other reference observes the write.
        unsafe { self.ptr.as_ptr().add(offset).write(value) }
    }
}

/// Fresh copy buffers, convolved through pinned raw-pointer views.
#[derive(Debug, Default, Clone, Copy)]
pub struct PinnedStrategy;

impl BufferStrategy for PinnedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pinned
    }

    fn apply(&self, src: &Raster, kernel: &Kernel, cancel: &CancelToken) -> ConvResult<Raster> {
        check_extent(src.width(), src.height())?;
        let geom = PlaneGeometry::packed_rgb(src.width(), src.height())?;
        let len = geom.byte_len()?;

        let mut input = allocate_zeroed(len)?;
        let mut output = allocate_zeroed(len)?;
        src.read_packed_rgb(&mut input);
        {
            let pinned_in = PinnedRead::new(&input);
            let mut pinned_out = PinnedWrite::new(&mut output);
            convolve(&pinned_in, &geom, &mut pinned_out, &geom, kernel, cancel)?;
        }
        finish_packed(src, &output)
    }
}
