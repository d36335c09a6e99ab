use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use convbench::StrategyKind;
use sha2::Digest as _;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "convbench", version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter every input image with one strategy.
    Batch(BatchArgs),
    /// Run several strategies over the same inputs and compare output digests.
    Bench(BenchArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Load settings from a JSON file instead of the flags below.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "INPUT_DIR", default_value = "in")]
    input_dir: PathBuf,

    #[arg(long, env = "OUTPUT_DIR", default_value = "out")]
    output_dir: PathBuf,

    /// Process images on a worker pool.
    #[arg(
        long,
        env = "ENABLE_PARALLEL",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    parallel: bool,

    /// Worker threads (parallel runs only).
    #[arg(long, env = "THREADS")]
    threads: Option<usize>,

    /// Release each image's rasters as soon as its output is written.
    #[arg(
        long,
        env = "DISPOSE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    dispose: bool,

    /// Trim the buffer pool after every image.
    #[arg(
        long,
        env = "GC_COLLECT",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    gc_collect: bool,

    /// Trim the buffer pool once before the run.
    #[arg(
        long,
        env = "COMPACT_ONCE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    compact_once: bool,

    #[arg(
        long,
        env = "LOW_LATENCY",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    low_latency: bool,

    #[arg(
        long,
        env = "SUSTAINED_LOW_LATENCY",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    sustained_low_latency: bool,

    /// Output extension; selects the encoder.
    #[arg(long, env = "OUTPUT_FORMAT", default_value = "png")]
    output_format: String,

    /// Input extensions, comma separated.
    #[arg(long = "ext", default_value = "jpg", value_delimiter = ',')]
    extensions: Vec<String>,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    #[command(flatten)]
    run: RunArgs,

    /// fresh, pooled, pinned or native_locked.
    #[arg(long, env = "STRATEGY", value_parser = parse_strategy)]
    strategy: Option<StrategyKind>,

    /// Legacy selector, consulted only when --strategy is absent.
    #[arg(long, env = "VERSION_MANAGED", value_parser = BoolishValueParser::new())]
    version_managed: Option<bool>,

    #[arg(long, env = "USE_FIXED", value_parser = BoolishValueParser::new())]
    use_fixed: Option<bool>,

    #[arg(long, env = "USE_POOLING", value_parser = BoolishValueParser::new())]
    use_pooling: Option<bool>,
}

#[derive(Parser, Debug)]
struct BenchArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Strategies to compare, comma separated. Defaults to all of them.
    #[arg(long, value_parser = parse_strategy, value_delimiter = ',')]
    strategies: Vec<StrategyKind>,
}

fn parse_strategy(s: &str) -> Result<StrategyKind, convbench::ConvError> {
    s.parse()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Batch(args) => cmd_batch(args),
        Command::Bench(args) => cmd_bench(args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(
    run: &RunArgs,
    strategy: StrategyKind,
) -> anyhow::Result<convbench::Settings> {
    let settings = match &run.config {
        Some(path) => convbench::Settings::from_json_file(path)?,
        None => convbench::Settings {
            input_dir: run.input_dir.clone(),
            output_dir: run.output_dir.clone(),
            strategy,
            parallel: run.parallel,
            threads: run.threads,
            dispose_eagerly: run.dispose,
            collect_per_image: run.gc_collect,
            output_format: run.output_format.clone(),
            extensions: run.extensions.clone(),
            hints: convbench::CollectorHints::from_flags(
                run.compact_once,
                run.low_latency,
                run.sustained_low_latency,
            ),
            pool: convbench::PoolOpts::default(),
        },
    };
    settings.validate()?;
    tracing::info!(settings = %settings.to_json(), "resolved settings");
    Ok(settings)
}

fn prepare(
    settings: &convbench::Settings,
) -> anyhow::Result<(Vec<PathBuf>, Arc<convbench::BufferPool>)> {
    let inputs = convbench::collect_inputs(&settings.input_dir, &settings.extensions)?;
    if inputs.is_empty() {
        tracing::warn!(dir = %settings.input_dir.display(), "no input images found");
    }
    let pool = Arc::new(convbench::BufferPool::new(settings.pool));
    settings.hints.apply(&pool);
    Ok((inputs, pool))
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let kind = args
        .strategy
        .or_else(|| {
            StrategyKind::from_legacy_switches(
                args.version_managed,
                args.use_fixed,
                args.use_pooling,
            )
        })
        .unwrap_or(StrategyKind::Fresh);
    let settings = resolve_settings(&args.run, kind)?;
    let (inputs, pool) = prepare(&settings)?;

    let strategy = convbench::create_strategy(settings.strategy, Some(Arc::clone(&pool)))?;
    let opts = settings.batch_opts(convbench::CancelToken::new());
    let report = convbench::run_batch(
        &inputs,
        &settings.output_dir,
        strategy.as_ref(),
        Some(&pool),
        &opts,
    )
    .with_context(|| format!("batch '{}'", settings.strategy))?;

    for failure in report.failures() {
        if let Err(e) = &failure.result {
            eprintln!("skipped {}: {e}", failure.input.display());
        }
    }
    for out in report.outputs() {
        eprintln!("wrote {}", out.display());
    }
    eprintln!("{}", report.timing_entry().to_line());
    Ok(())
}

fn cmd_bench(args: BenchArgs) -> anyhow::Result<()> {
    let kinds = if args.strategies.is_empty() {
        StrategyKind::ALL.to_vec()
    } else {
        args.strategies
    };
    let settings = resolve_settings(&args.run, kinds[0])?;
    let (inputs, pool) = prepare(&settings)?;

    let opts = settings.batch_opts(convbench::CancelToken::new());
    let reports =
        convbench::run_benchmark(&inputs, &settings.output_dir, &kinds, Some(pool), &opts)?;

    // input -> (strategy, digest) for every written output
    let mut digests: BTreeMap<&Path, Vec<(&str, String)>> = BTreeMap::new();
    for report in &reports {
        println!("{}", report.timing_entry().to_line());
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(out) => {
                    let bytes =
                        std::fs::read(out).with_context(|| format!("read '{}'", out.display()))?;
                    let sha = sha256_hex(&bytes);
                    println!("  {sha}  {}", out.display());
                    digests
                        .entry(outcome.input.as_path())
                        .or_default()
                        .push((report.strategy.as_str(), sha));
                }
                Err(e) => println!("  skipped {}: {e}", outcome.input.display()),
            }
        }
    }

    let mut mismatched = 0usize;
    for (input, per_strategy) in &digests {
        let Some((_, first)) = per_strategy.first() else {
            continue;
        };
        if per_strategy.iter().any(|(_, sha)| sha != first) {
            mismatched += 1;
            eprintln!("parity mismatch for {}:", input.display());
            for (strategy, sha) in per_strategy {
                eprintln!("    {strategy:<14} {sha}");
            }
        }
    }
    if mismatched > 0 {
        anyhow::bail!("{mismatched} input(s) produced different outputs across strategies");
    }
    println!("parity: ok ({} inputs)", digests.len());
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
