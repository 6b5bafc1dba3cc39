//! CLI binary for imagehorse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `CompressionConfig`, compresses each input and writes the results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use imagehorse::units::{format_size, parse_size};
use imagehorse::{
    compress_aggressively, compress_level, compress_with_quality, inspect, load_source,
    save_result, AttemptRecord, CompressionConfig, CompressionLevel, CompressionProgressCallback,
    CompressionResult, ImageReport, OutputFormat, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over the inputs, a status line for the
/// current search attempt and one log line per finished image.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:36.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Compressing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl CompressionProgressCallback for CliProgressCallback {
    fn on_item_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_attempt(&self, name: &str, record: &AttemptRecord) {
        self.bar.set_message(format!(
            "{name}  #{} {}x{} q={:.2} → {}",
            record.attempt,
            record.width,
            record.height,
            record.quality,
            format_size(record.size as u64)
        ));
    }

    fn on_item_complete(&self, index: usize, total: usize, result: &CompressionResult) {
        let secs = self.elapsed_secs(index);
        let mark = if result.met_target {
            green("✓")
        } else {
            yellow("≈")
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {} → {}  {}  {}",
            mark,
            index + 1,
            total,
            format_size(result.original_size as u64),
            bold(&format_size(result.size as u64)),
            dim(&format!(
                "{}x{} q={:.2} {} attempts {}%",
                result.width, result.height, result.quality, result.attempts, result.savings_percent
            )),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images compressed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images compressed  ({} failed)",
                if failed == total { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compress at the default level (medium: 85% start, 500 KB target)
  imagehorse photo.jpg

  # Smaller output as WebP into a chosen directory
  imagehorse --level high --format webp -o web/ *.jpg

  # Hit an explicit size target with up to 10 attempts
  imagehorse --target 150KB --max-attempts 10 hero.png

  # One pass at a fixed quality, no search
  imagehorse --quality 0.6 banner.jpg

  # Download and compress
  imagehorse https://example.com/images/cat.jpg

  # Score and recommendation only, no encoding
  imagehorse --inspect-only *.png

  # Machine-readable output
  imagehorse --json photo.jpg > result.json

LEVELS:
  Level          Start quality  Target
  ─────────────  ─────────────  ────────
  low            95%            1000 KB
  medium         85%            500 KB
  high           75%            300 KB
  extreme-small  60%            150 KB
  extreme-bw     30%            100 KB   pure black & white (jpeg is written as png)

SIZES:
  --target accepts bytes or units: 2048, 300KB, 1.5MB, 512KiB (1 KB = 1024 bytes).

ENVIRONMENT VARIABLES:
  Every flag has an IMAGEHORSE_* fallback, e.g. IMAGEHORSE_LEVEL=high.
  RUST_LOG overrides the log filter.
"#;

/// Compress images to a size target with a bounded quality/dimension search.
#[derive(Parser, Debug)]
#[command(
    name = "imagehorse",
    version,
    about = "Compress images to a size target with a bounded quality/dimension search",
    long_about = "Compress local images or URLs as JPEG, PNG or WebP. Each image is searched \
for the highest quality that fits its size target: quality drops by 20% per attempt, and \
dimensions shrink when the result is still far too large.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory for compressed files.
    #[arg(short, long, env = "IMAGEHORSE_OUT_DIR", default_value = "compressed")]
    out_dir: PathBuf,

    /// Compression level: starting quality and target size.
    #[arg(short, long, env = "IMAGEHORSE_LEVEL", value_enum, default_value = "medium")]
    level: LevelArg,

    /// Output format.
    #[arg(short, long, env = "IMAGEHORSE_FORMAT", value_enum, default_value = "jpeg")]
    format: FormatArg,

    /// Explicit size target (e.g. 300KB, 1.5MB); overrides the level's target.
    #[arg(short, long, env = "IMAGEHORSE_TARGET", value_parser = parse_target_kb)]
    target: Option<f64>,

    /// Encode once at this quality (0.0–1.0) instead of searching.
    #[arg(long, env = "IMAGEHORSE_QUALITY", conflicts_with = "target",
          value_parser = parse_quality)]
    quality: Option<f64>,

    /// Maximum render+encode attempts per image.
    #[arg(long, env = "IMAGEHORSE_MAX_ATTEMPTS", default_value_t = 8,
          value_parser = clap::value_parser!(u32).range(1..=50))]
    max_attempts: u32,

    /// Lowest quality the search may reach (0.0–1.0).
    #[arg(long, env = "IMAGEHORSE_QUALITY_FLOOR", default_value_t = 0.1,
          value_parser = parse_quality)]
    quality_floor: f64,

    /// Planner width bound in pixels.
    #[arg(long, env = "IMAGEHORSE_MAX_WIDTH", default_value_t = 1920)]
    max_width: u32,

    /// Planner height bound in pixels.
    #[arg(long, env = "IMAGEHORSE_MAX_HEIGHT", default_value_t = 1080)]
    max_height: u32,

    /// Scale each axis independently instead of keeping the aspect ratio.
    #[arg(long, env = "IMAGEHORSE_FREE_ASPECT")]
    free_aspect: bool,

    /// Images compressed at the same time.
    #[arg(short, long, env = "IMAGEHORSE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Output structured JSON instead of a summary.
    #[arg(long, env = "IMAGEHORSE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMAGEHORSE_NO_PROGRESS")]
    no_progress: bool,

    /// Print score and recommended settings only, no compression.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMAGEHORSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMAGEHORSE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "IMAGEHORSE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LevelArg {
    Low,
    Medium,
    High,
    ExtremeSmall,
    ExtremeBw,
}

impl From<LevelArg> for CompressionLevel {
    fn from(v: LevelArg) -> Self {
        match v {
            LevelArg::Low => CompressionLevel::Low,
            LevelArg::Medium => CompressionLevel::Medium,
            LevelArg::High => CompressionLevel::High,
            LevelArg::ExtremeSmall => CompressionLevel::ExtremeSmall,
            LevelArg::ExtremeBw => CompressionLevel::ExtremeBw,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Jpeg,
    Png,
    Webp,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Webp => OutputFormat::Webp,
        }
    }
}

/// What each input goes through.
#[derive(Debug, Clone, Copy)]
enum Mode {
    Level(CompressionLevel),
    Target(f64),
    Quality(f64),
}

/// One line of `--json` output.
#[derive(Serialize)]
struct JsonItem {
    input: String,
    output: Option<PathBuf>,
    result: Option<CompressionResult>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return run_inspect(&cli).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new(cli.inputs.len()))
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn CompressionProgressCallback>),
    )?;

    let mode = match (cli.quality, cli.target) {
        (Some(q), _) => Mode::Quality(q),
        (None, Some(kb)) => Mode::Target(kb),
        (None, None) => Mode::Level(cli.level.into()),
    };
    let format: OutputFormat = cli.format.into();

    // ── Run compression ──────────────────────────────────────────────────
    let total = cli.inputs.len();
    let start = Instant::now();
    let items: Vec<JsonItem> = stream::iter(cli.inputs.iter().cloned().enumerate().map(
        |(index, input)| {
            let config = &config;
            let out_dir = &cli.out_dir;
            async move { process_input(index, total, input, mode, format, out_dir, config).await }
        },
    ))
    .buffered(config.concurrency)
    .collect()
    .await;

    let failed = items.iter().filter(|i| i.error.is_some()).count();
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, total - failed);
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&items).context("Failed to serialise output")?
        );
    } else if !cli.quiet && !show_progress {
        let original: u64 = items
            .iter()
            .filter_map(|i| i.result.as_ref())
            .map(|r| r.original_size as u64)
            .sum();
        let compressed: u64 = items
            .iter()
            .filter_map(|i| i.result.as_ref())
            .map(|r| r.size as u64)
            .sum();
        eprintln!(
            "Compressed {}/{} images in {}ms: {} → {}",
            total - failed,
            total,
            start.elapsed().as_millis(),
            format_size(original),
            format_size(compressed),
        );
        for item in items.iter().filter(|i| i.error.is_some()) {
            eprintln!(
                "  {}: {}",
                item.input,
                item.error.as_deref().unwrap_or_default()
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} images failed");
    }
    Ok(())
}

/// Load, compress and save one input. Never fails; errors land in the item.
async fn process_input(
    index: usize,
    total: usize,
    input: String,
    mode: Mode,
    format: OutputFormat,
    out_dir: &std::path::Path,
    config: &CompressionConfig,
) -> JsonItem {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_item_start(index, total, &input);
    }

    let outcome = async {
        let source = load_source(&input, config.download_timeout_secs, config.max_source_bytes)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        let result = match mode {
            Mode::Level(level) => compress_level(&source, level, format, config).await,
            Mode::Target(kb) => {
                compress_aggressively(&source, kb, format, config.max_attempts, config).await
            }
            Mode::Quality(q) => compress_with_quality(&source, q, format, config).await,
        }
        .with_context(|| format!("Failed to compress {}", source.name()))?;

        let path = out_dir.join(result.file_name(source.name()));
        let result = save_result(result, &path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        anyhow::Ok((path, result))
    }
    .await;

    match outcome {
        Ok((path, result)) => {
            if let Some(cb) = cb {
                cb.on_item_complete(index, total, &result);
            }
            JsonItem {
                input,
                output: Some(path),
                result: Some(result),
                error: None,
            }
        }
        Err(e) => {
            let msg = format!("{e:#}");
            if let Some(cb) = cb {
                cb.on_item_error(index, total, &msg);
            }
            JsonItem {
                input,
                output: None,
                result: None,
                error: Some(msg),
            }
        }
    }
}

/// Print score and recommendation for every input.
async fn run_inspect(cli: &Cli) -> Result<()> {
    let mut reports: Vec<ImageReport> = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let source = load_source(input, cli.download_timeout, usize::MAX)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        let report = inspect(&source)
            .await
            .with_context(|| format!("Failed to inspect {input}"))?;
        reports.push(report);
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise reports")?
        );
        return Ok(());
    }

    for (input, r) in cli.inputs.iter().zip(&reports) {
        let rec = &r.recommendation;
        println!("File:         {input}");
        println!("Type:         {}", r.mime);
        println!("Dimensions:   {}x{}", r.width, r.height);
        println!("Size:         {}", format_size(r.size as u64));
        println!("Score:        {}", r.score);
        println!(
            "Recommended:  {} at {} → {}x{}",
            rec.format, rec.level, rec.target_width, rec.target_height
        );
        println!("Estimate:     {}", format_size(r.estimated_size));
        println!();
    }
    Ok(())
}

/// Map CLI args to `CompressionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CompressionConfig> {
    let mut builder = CompressionConfig::builder()
        .max_dimensions(cli.max_width, cli.max_height)
        .lock_aspect(!cli.free_aspect)
        .max_attempts(cli.max_attempts)
        .quality_floor(cli.quality_floor)
        .default_level(cli.level.into())
        .concurrency(cli.concurrency)
        .batch_yield_ms(0)
        .download_timeout_secs(cli.download_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--target` into kilobytes.
fn parse_target_kb(s: &str) -> Result<f64, String> {
    let bytes = parse_size(s).map_err(|e| e.to_string())?;
    if bytes == 0 {
        return Err("target must be larger than 0".into());
    }
    Ok(bytes as f64 / 1024.0)
}

/// Parse a quality fraction in [0, 1].
fn parse_quality(s: &str) -> Result<f64, String> {
    let q: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if !(0.0..=1.0).contains(&q) {
        return Err(format!("quality must be within 0.0..=1.0, got {q}"));
    }
    Ok(q)
}
