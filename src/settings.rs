use std::path::{Path, PathBuf};

use crate::batch::BatchOpts;
use crate::buffer::{PoolOpts, StrategyKind};
use crate::codec;
use crate::foundation::core::CancelToken;
use crate::foundation::error::{ConvError, ConvResult};
use crate::hints::CollectorHints;

/// Everything a run needs, resolved once before the first image is touched.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub strategy: StrategyKind,
    pub parallel: bool,
    pub threads: Option<usize>,
    pub dispose_eagerly: bool,
    /// Trim the buffer pool after every image.
    pub collect_per_image: bool,
    /// Extension of written images; also picks the encoder.
    pub output_format: String,
    /// Input file extensions picked up from `input_dir`.
    pub extensions: Vec<String>,
    pub hints: CollectorHints,
    pub pool: PoolOpts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("in"),
            output_dir: PathBuf::from("out"),
            strategy: StrategyKind::Fresh,
            parallel: false,
            threads: None,
            dispose_eagerly: false,
            collect_per_image: false,
            output_format: "png".to_string(),
            extensions: vec!["jpg".to_string()],
            hints: CollectorHints::default(),
            pool: PoolOpts::default(),
        }
    }
}

impl Settings {
    pub fn from_json_file(path: &Path) -> ConvResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConvError::config(format!("read settings '{}': {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ConvError::config(format!("parse settings '{}': {e}", path.display())))
    }

    pub fn validate(&self) -> ConvResult<()> {
        if self.threads == Some(0) {
            return Err(ConvError::config("threads must be >= 1 when set"));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConvError::config("at least one input extension is required"));
        }
        if self.pool.max_buffers_per_bucket == 0 && self.strategy.uses_pool() {
            tracing::warn!("pooled strategy with a zero bucket cap never reuses buffers");
        }
        codec::format_for_extension(&self.output_format)?;
        Ok(())
    }

    pub fn batch_opts(&self, cancel: CancelToken) -> BatchOpts {
        BatchOpts {
            parallel: self.parallel,
            threads: self.threads,
            dispose_eagerly: self.dispose_eagerly,
            trim_pool_per_image: self.collect_per_image,
            output_ext: self.output_format.clone(),
            cancel,
        }
    }

    /// Single-line JSON snapshot for the startup log.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable settings: {e}>"))
    }
}
