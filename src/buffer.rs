use std::str::FromStr;
use std::sync::Arc;

use crate::foundation::core::CancelToken;
use crate::foundation::error::{ConvError, ConvResult};
use crate::kernel::Kernel;
use crate::raster::Raster;

pub(crate) mod fresh;
pub(crate) mod native;
pub(crate) mod pinned;
pub(crate) mod pool;
pub(crate) mod pooled;

pub use fresh::FreshStrategy;
pub use native::NativeLockedStrategy;
pub use pinned::PinnedStrategy;
pub use pool::{BufferPool, PoolLease, PoolOpts, PoolStats, RentedBuffer};
pub use pooled::PooledStrategy;

/// How pixel bytes are acquired, accessed and released around one convolution pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Freshly allocated copy buffers, dropped after the pass.
    Fresh,
    /// Copy buffers rented from a shared [`BufferPool`].
    Pooled,
    /// Fresh copy buffers accessed through raw pinned pointers.
    Pinned,
    /// No copy: the raster's native memory is locked and filtered in place.
    NativeLocked,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Fresh,
        StrategyKind::Pooled,
        StrategyKind::Pinned,
        StrategyKind::NativeLocked,
    ];

    /// Name used in output file names and timing lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Pooled => "pooled",
            Self::Pinned => "pinned",
            Self::NativeLocked => "native_locked",
        }
    }

    pub fn uses_pool(self) -> bool {
        matches!(self, Self::Pooled)
    }

    /// Map the older `VERSION_MANAGED` / `USE_FIXED` / `USE_POOLING` switches onto a kind.
    ///
    /// Copy-buffer ("managed") runs prefer pinning over pooling when both are set; every
    /// non-managed run uses locked native memory.
    pub fn from_legacy_flags(managed: bool, fixed: bool, pooling: bool) -> Self {
        match (managed, fixed, pooling) {
            (false, _, _) => Self::NativeLocked,
            (true, true, _) => Self::Pinned,
            (true, false, true) => Self::Pooled,
            (true, false, false) => Self::Fresh,
        }
    }

    /// [`StrategyKind::from_legacy_flags`] for switches that may be unset. Unset switches read
    /// as `false`; `None` when none of them is set.
    pub fn from_legacy_switches(
        managed: Option<bool>,
        fixed: Option<bool>,
        pooling: Option<bool>,
    ) -> Option<Self> {
        if managed.is_none() && fixed.is_none() && pooling.is_none() {
            return None;
        }
        Some(Self::from_legacy_flags(
            managed.unwrap_or(false),
            fixed.unwrap_or(false),
            pooling.unwrap_or(false),
        ))
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fresh" | "managed" => Ok(Self::Fresh),
            "pooled" => Ok(Self::Pooled),
            "pinned" | "fixed" | "managed_fixed" => Ok(Self::Pinned),
            "native_locked" | "native" | "locked" | "unmanaged" => Ok(Self::NativeLocked),
            other => Err(ConvError::config(format!("unknown strategy '{other}'"))),
        }
    }
}

/// One way of providing the input and output buffers of a convolution pass.
///
/// Implementations release every buffer they acquire before `apply` returns, on success,
/// on error and while unwinding.
pub trait BufferStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Filter `src`, returning a new raster with the same extent and layout.
    ///
    /// Border pixels (within [`Kernel::RADIUS`] of an edge) and alpha are copied from `src`.
    fn apply(&self, src: &Raster, kernel: &Kernel, cancel: &CancelToken) -> ConvResult<Raster>;

    /// [`BufferStrategy::apply`] with the edge kernel and no cancellation.
    fn filter(&self, src: &Raster) -> ConvResult<Raster> {
        self.apply(src, Kernel::laplace(), &CancelToken::new())
    }
}

/// Build a strategy. `pool` is required for [`StrategyKind::Pooled`] and ignored otherwise.
pub fn create_strategy(
    kind: StrategyKind,
    pool: Option<Arc<BufferPool>>,
) -> ConvResult<Box<dyn BufferStrategy>> {
    Ok(match kind {
        StrategyKind::Fresh => Box::new(FreshStrategy),
        StrategyKind::Pooled => {
            let pool = pool.ok_or_else(|| {
                ConvError::config("pooled strategy requires a buffer pool")
            })?;
            Box::new(PooledStrategy::new(pool))
        }
        StrategyKind::Pinned => Box::new(PinnedStrategy),
        StrategyKind::NativeLocked => Box::new(NativeLockedStrategy),
    })
}

/// Allocate exactly `len` zeroed bytes, reporting allocation failure instead of aborting.
pub(crate) fn allocate_zeroed(len: usize) -> ConvResult<Vec<u8>> {
    if len == 0 {
        return Err(ConvError::invalid_size("cannot allocate a zero-length buffer"));
    }
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| ConvError::exhausted(format!("{len} byte buffer: {e}")))?;
    v.resize(len, 0);
    Ok(v)
}

/// Assemble the output raster of a copy-buffer pass from its packed RGB result.
pub(crate) fn finish_packed(src: &Raster, packed_out: &[u8]) -> ConvResult<Raster> {
    let mut dst = Raster::blank_like(src)?;
    dst.copy_border_from(src, Kernel::RADIUS);
    dst.write_interior_from_packed(packed_out, Kernel::RADIUS);
    dst.copy_alpha_from(src);
    Ok(dst)
}
