use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::buffer::{BufferPool, BufferStrategy, StrategyKind, create_strategy};
use crate::codec;
use crate::foundation::core::CancelToken;
use crate::foundation::error::{ConvError, ConvResult};
use crate::kernel::Kernel;
use crate::raster::Raster;
use crate::timing::{TimingEntry, TimingLog};

/// How a batch is executed. None of these change output pixels.
#[derive(Clone, Debug)]
pub struct BatchOpts {
    /// Fan images out over a rayon pool instead of processing them in input order.
    pub parallel: bool,
    /// Worker threads for the parallel pool; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Drop each image's rasters as soon as its output is written. Otherwise they are kept
    /// until the batch finishes.
    pub dispose_eagerly: bool,
    /// Trim the buffer pool after every image.
    pub trim_pool_per_image: bool,
    /// Output file extension, which also selects the encoder.
    pub output_ext: String,
    pub cancel: CancelToken,
}

impl Default for BatchOpts {
    fn default() -> Self {
        Self {
            parallel: false,
            threads: None,
            dispose_eagerly: true,
            trim_pool_per_image: false,
            output_ext: "png".to_string(),
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug)]
pub struct ImageOutcome {
    pub input: PathBuf,
    /// Path of the written output, or why this image was skipped.
    pub result: ConvResult<PathBuf>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub strategy: String,
    pub elapsed: Duration,
    /// One entry per input, in input order.
    pub outcomes: Vec<ImageOutcome>,
    pub timing_log: PathBuf,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(PathBuf::as_path))
    }

    pub fn timing_entry(&self) -> TimingEntry {
        TimingEntry::new(self.strategy.clone(), self.elapsed)
    }
}

/// Files directly inside `dir` whose extension is in `extensions` (case-insensitive), sorted.
pub fn collect_inputs(dir: &Path, extensions: &[String]) -> ConvResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ConvError::config(format!("read input dir '{}': {e}", dir.display()))
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            ConvError::config(format!("read input dir '{}': {e}", dir.display()))
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)));
        if matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Filter every image in `paths` with `strategy` and append one timing line to
/// `<out_dir>/time.txt`.
///
/// Fails only when `out_dir` or the timing log cannot be set up or written; a bad image is
/// recorded in the report and the rest of the batch carries on.
#[tracing::instrument(
    skip_all,
    fields(strategy = strategy.name(), images = paths.len(), parallel = opts.parallel)
)]
pub fn run_batch(
    paths: &[PathBuf],
    out_dir: &Path,
    strategy: &dyn BufferStrategy,
    pool: Option<&BufferPool>,
    opts: &BatchOpts,
) -> ConvResult<BatchReport> {
    codec::format_for_extension(&opts.output_ext)?;
    std::fs::create_dir_all(out_dir).map_err(|e| {
        ConvError::config(format!("create output dir '{}': {e}", out_dir.display()))
    })?;
    let mut log = TimingLog::open(out_dir)?;
    let worker_pool = if opts.parallel {
        Some(build_thread_pool(opts.threads)?)
    } else {
        None
    };

    let kernel = Kernel::laplace();
    let deferred = Mutex::new(Vec::<Raster>::new());
    let jobs = plan_outputs(paths, out_dir, strategy.name(), &opts.output_ext);

    let process = |(path, target): (&PathBuf, ConvResult<PathBuf>)| -> ImageOutcome {
        let result = target
            .and_then(|out_path| process_image(path, &out_path, strategy, kernel, opts, &deferred));
        if opts.trim_pool_per_image
            && let Some(pool) = pool
        {
            pool.trim();
        }
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "image skipped");
        }
        ImageOutcome {
            input: path.clone(),
            result,
        }
    };

    let started = Instant::now();
    let outcomes: Vec<ImageOutcome> = match &worker_pool {
        Some(tp) => tp.install(|| jobs.into_par_iter().map(&process).collect()),
        None => jobs.into_iter().map(&process).collect(),
    };
    let elapsed = started.elapsed();

    let retained = deferred
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .len();
    if retained > 0 {
        tracing::debug!(rasters = retained, "released deferred rasters");
    }

    let report = BatchReport {
        strategy: strategy.name().to_string(),
        elapsed,
        outcomes,
        timing_log: log.path().to_path_buf(),
    };
    log.append(&report.timing_entry())?;

    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch finished"
    );
    Ok(report)
}

/// Output path for every input, in input order.
///
/// Inputs differing only in extension (`a.jpg`, `a.JPG`) map to the same output; the first
/// keeps it and every later one is refused so no two images ever write the same file.
fn plan_outputs<'a>(
    paths: &'a [PathBuf],
    out_dir: &Path,
    strategy: &str,
    ext: &str,
) -> Vec<(&'a PathBuf, ConvResult<PathBuf>)> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    paths
        .iter()
        .map(|path| {
            let target = codec::output_path_for(path, out_dir, strategy, ext).and_then(|out| {
                match claimed.get(&out) {
                    Some(first) => Err(ConvError::invalid_input(format!(
                        "output name '{}' collides with the output of '{}'",
                        out.display(),
                        first.display()
                    ))),
                    None => {
                        claimed.insert(out.clone(), path);
                        Ok(out)
                    }
                }
            });
            (path, target)
        })
        .collect()
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
fn process_image(
    path: &Path,
    out_path: &Path,
    strategy: &dyn BufferStrategy,
    kernel: &Kernel,
    opts: &BatchOpts,
    deferred: &Mutex<Vec<Raster>>,
) -> ConvResult<PathBuf> {
    opts.cancel.check()?;
    let src = codec::load_raster(path)?;
    let filtered = strategy.apply(&src, kernel, &opts.cancel)?;
    codec::save_raster(&filtered, out_path)?;

    if !opts.dispose_eagerly {
        let mut held = deferred.lock().unwrap_or_else(PoisonError::into_inner);
        held.push(src);
        held.push(filtered);
    }
    Ok(out_path.to_path_buf())
}

/// Run each strategy in `kinds` over the same inputs, one timing line per strategy.
///
/// A pool is created for the run when none is supplied.
pub fn run_benchmark(
    paths: &[PathBuf],
    out_dir: &Path,
    kinds: &[StrategyKind],
    pool: Option<Arc<BufferPool>>,
    opts: &BatchOpts,
) -> ConvResult<Vec<BatchReport>> {
    let pool = pool.unwrap_or_else(|| Arc::new(BufferPool::default()));
    let mut reports = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let strategy = create_strategy(kind, Some(Arc::clone(&pool)))?;
        reports.push(run_batch(
            paths,
            out_dir,
            strategy.as_ref(),
            Some(&pool),
            opts,
        )?);
    }
    Ok(reports)
}

fn build_thread_pool(threads: Option<usize>) -> ConvResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ConvError::config("batch 'threads' must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ConvError::config(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(
            build_thread_pool(Some(0)),
            Err(ConvError::Configuration(_))
        ));
        assert!(build_thread_pool(Some(2)).is_ok());
    }

    #[test]
    fn collect_inputs_filters_and_sorts() {
        let dir = std::env::temp_dir().join(format!(
            "convbench_collect_inputs_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("nested.jpg")).unwrap();
        for name in ["b.JPG", "a.jpg", "c.png", "notes.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let found = collect_inputs(&dir, &["jpg".to_string()]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.JPG"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_input_dir_is_configuration_error() {
        let err = collect_inputs(Path::new("/definitely/not/here"), &["jpg".to_string()]).unwrap_err();
        assert!(err.is_fatal());
    }
}
