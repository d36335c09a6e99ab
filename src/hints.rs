use crate::buffer::{BufferPool, PoolOpts};

/// How eagerly memory is handed back to the allocator between images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyMode {
    #[default]
    Batch,
    LowLatency,
    SustainedLowLatency,
}

/// Process-wide allocator tuning.
///
/// These only shape how many buffers the pool keeps around; output pixels are identical under
/// every combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CollectorHints {
    /// Release every retained buffer once before the run starts.
    pub compact_once: bool,
    pub latency: LatencyMode,
}

impl CollectorHints {
    /// Sustained low latency wins over plain low latency when both are requested.
    pub fn from_flags(compact_once: bool, low_latency: bool, sustained_low_latency: bool) -> Self {
        let latency = if sustained_low_latency {
            LatencyMode::SustainedLowLatency
        } else if low_latency {
            LatencyMode::LowLatency
        } else {
            LatencyMode::Batch
        };
        Self {
            compact_once,
            latency,
        }
    }

    /// Retention caps for `base` under this latency mode. Lower latency keeps more buffers
    /// warm so fewer allocations happen mid-run.
    pub fn retention_for(&self, base: PoolOpts) -> PoolOpts {
        let (bucket_mul, bytes_mul) = match self.latency {
            LatencyMode::Batch => (1, 1),
            LatencyMode::LowLatency => (2, 1),
            LatencyMode::SustainedLowLatency => (4, 2),
        };
        PoolOpts {
            max_pool_bytes: base.max_pool_bytes.saturating_mul(bytes_mul),
            max_buffers_per_bucket: base.max_buffers_per_bucket.saturating_mul(bucket_mul),
            min_class_bytes: base.min_class_bytes,
        }
    }

    pub fn apply(&self, pool: &BufferPool) {
        pool.set_retention(self.retention_for(pool.opts()));
        if self.compact_once {
            pool.trim();
        }
        tracing::info!(
            compact_once = self.compact_once,
            latency = ?self.latency,
            "applied collector hints"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_wins_over_low_latency() {
        let h = CollectorHints::from_flags(false, true, true);
        assert_eq!(h.latency, LatencyMode::SustainedLowLatency);
        assert_eq!(
            CollectorHints::from_flags(false, true, false).latency,
            LatencyMode::LowLatency
        );
    }

    #[test]
    fn retention_scales_with_latency_mode() {
        let base = PoolOpts::default();
        let batch = CollectorHints::default().retention_for(base);
        assert_eq!(batch, base);

        let sustained = CollectorHints::from_flags(false, false, true).retention_for(base);
        assert_eq!(sustained.max_buffers_per_bucket, base.max_buffers_per_bucket * 4);
        assert_eq!(sustained.max_pool_bytes, base.max_pool_bytes * 2);
    }

    #[test]
    fn compact_once_empties_the_pool() {
        let pool = BufferPool::default();
        let b = pool.rent(10).unwrap();
        pool.give_back(b);
        assert_eq!(pool.stats().retained_buffers, 1);

        CollectorHints::from_flags(true, false, false).apply(&pool);
        assert_eq!(pool.stats().retained_buffers, 0);
    }
}
