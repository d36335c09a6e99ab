//! Batch 5x5 Laplace filtering of images under interchangeable buffer-management strategies.
//!
//! Every [`StrategyKind`] feeds the same [`convolve`] engine and produces byte-identical
//! output; they differ only in how pixel memory is acquired, accessed and released. A batch
//! run writes one filtered image per input plus a timing line to `time.txt`.
#![deny(unsafe_code)]

mod foundation;

pub mod batch;
pub mod buffer;
pub mod codec;
pub mod engine;
pub mod hints;
pub mod kernel;
pub mod raster;
pub mod service;
pub mod settings;
pub mod timing;

pub use batch::{BatchOpts, BatchReport, ImageOutcome, collect_inputs, run_batch, run_benchmark};
pub use buffer::{
    BufferPool, BufferStrategy, FreshStrategy, NativeLockedStrategy, PinnedStrategy, PoolLease,
    PoolOpts, PoolStats, PooledStrategy, RentedBuffer, StrategyKind, create_strategy,
};
pub use codec::{
    decode_raster, encode_raster, format_for_extension, load_raster, output_path_for, save_raster,
};
pub use engine::{PixelRead, PixelWrite, check_extent, convolve, required_len};
pub use foundation::core::{CancelToken, PixelLayout, PlaneGeometry};
pub use foundation::error::{ConvError, ConvResult};
pub use hints::{CollectorHints, LatencyMode};
pub use kernel::{Kernel, LAPLACE_5X5};
pub use raster::{Raster, ReadLock, WriteLock};
pub use service::{
    Delivery, DrainSummary, FsObjectStore, MemoryTransport, MessageTransport, ObjectStore,
    Submission, TransportStats, drain_queue, process_delivery, submit_image,
};
pub use settings::Settings;
pub use timing::{TIMING_FILE, TimingEntry, TimingLog, read_timing_log};
