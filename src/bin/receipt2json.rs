//! CLI binary for receipt2json.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ExtractionConfig`, runs one batch over a directory of
//! images and prints the results.
//!
//! Exit status: 0 batch completed, 1 fatal error, 2 no input images,
//! 3 `--fail-on-error` and at least one image failed.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt2json::{
    discover_images, resolve_agent, BatchObserver, BatchReport, BatchRunner, ExtractError,
    ExtractionConfig, ExtractionResult, InputError, SchemaVersion, SharedObserver, TracingObserver,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const EXIT_FATAL: u8 = 1;
const EXIT_NO_INPUT: u8 = 2;
const EXIT_ITEMS_FAILED: u8 = 3;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a live progress bar plus one log line and one JSON
/// block per image. Works when images complete out of order.
struct CliObserver {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
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
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchObserver for CliObserver {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} image(s)…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, id: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_item_success(&self, index: usize, total: usize, id: &str, result: &ExtractionResult) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            id,
            dim(&format!("{} · ocr {}", result.document_type(), result.ocr_quality())),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.println(result.to_pretty_json());
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, id: &str, error: &ExtractError) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let text = error.to_string();
        let msg = if text.chars().count() > 80 {
            format!("{}\u{2026}", text.chars().take(79).collect::<String>())
        } else {
            text
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            id,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} image(s) extracted successfully",
                green("✔"),
                bold(&report.succeeded().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) extracted  ({} failed)",
                if failed == report.attempted() {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&report.succeeded().to_string()),
                report.attempted(),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process ./files_to_ocr/*.jpg with settings from .env
  receipt2json

  # Another directory, PNG and JPEG
  receipt2json scans/ --ext png,jpg,jpeg

  # Four images at a time, full report as JSON on stdout
  receipt2json -c 4 --json > report.json

  # Use an edgequake-llm provider instead of an OpenAI-compatible URL
  receipt2json --provider anthropic --model claude-sonnet-4-20250514

  # Deprecated binary receipt / not-receipt contract
  receipt2json --legacy

ENVIRONMENT VARIABLES (a .env file in the working directory is loaded first):
  MODEL_NAME                        Model identifier (default: no_model)
  API_KEY                           Credential for the OpenAI-compatible endpoint
  OPEN_AI_API_COMPATABLE_BASE_URL   Endpoint base URL, e.g. https://api.openai.com/v1
  EDGEQUAKE_PROVIDER                Use an edgequake-llm provider (openai, anthropic,
                                    gemini, ollama, azure, auto) instead
  RECEIPT2JSON_*                    Override any flag, e.g. RECEIPT2JSON_CONCURRENCY=4
  RUST_LOG                          Log filter, e.g. receipt2json=debug

EXIT STATUS:
  0  batch completed (individual images may have failed)
  1  fatal error (configuration, provider setup)
  2  no input images
  3  --fail-on-error was given and at least one image failed
"#;

/// Extract structured receipt and invoice data from photos using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2json",
    version,
    about = "Extract structured receipt and invoice data from photos using Vision LLMs",
    long_about = "Classify each image as RECEIPT, INVOICE or NOT_PAYMENT_DOCUMENT and extract a \
validated JSON record. Works with any OpenAI-compatible endpoint (OpenAI, vLLM, LiteLLM, \
OpenRouter, …) or an edgequake-llm provider (Anthropic, Gemini, Ollama, …).",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the images to process.
    #[arg(env = "RECEIPT2JSON_INPUT_DIR", default_value = "files_to_ocr")]
    input_dir: PathBuf,

    /// File extensions to pick up (comma separated, case-insensitive).
    #[arg(long, env = "RECEIPT2JSON_EXT", value_delimiter = ',', default_values = ["jpg", "jpeg"])]
    ext: Vec<String>,

    /// Model identifier.
    #[arg(long, env = "MODEL_NAME", default_value = "no_model")]
    model: String,

    /// Credential for the OpenAI-compatible endpoint.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "OPEN_AI_API_COMPATABLE_BASE_URL")]
    base_url: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, azure, auto.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "Route requests through an edgequake-llm provider instead of the \
          OpenAI-compatible endpoint. The provider reads its own API key variables \
          (OPENAI_API_KEY, ANTHROPIC_API_KEY, …). Use 'auto' to detect from the environment."
    )]
    provider: Option<String>,

    /// Number of images processed at once.
    #[arg(short, long, env = "RECEIPT2JSON_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per image on transient provider failures.
    #[arg(long, env = "RECEIPT2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "RECEIPT2JSON_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max model output tokens per image.
    #[arg(long, env = "RECEIPT2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Deadline per image in seconds, retries included.
    #[arg(long, env = "RECEIPT2JSON_ITEM_TIMEOUT", default_value_t = 180)]
    item_timeout: u64,

    /// HTTP timeout per model call in seconds.
    #[arg(long, env = "RECEIPT2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Use the deprecated binary receipt / not-receipt contract.
    #[arg(long, env = "RECEIPT2JSON_LEGACY")]
    legacy: bool,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RECEIPT2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the full batch report as JSON on stdout.
    #[arg(long, env = "RECEIPT2JSON_JSON")]
    json: bool,

    /// Exit with status 3 if any image failed.
    #[arg(long, env = "RECEIPT2JSON_FAIL_ON_ERROR")]
    fail_on_error: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECEIPT2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPT2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Before parsing so clap's `env` attributes see .env values.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active, the bar reports each result; library
    // logs are limited to errors.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else if cli.json {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ExitCode> {
    // ── Build config and model ───────────────────────────────────────────
    // Resolved before touching the input directory so a missing key fails
    // without reading any image.
    let config = build_config(cli).await?;
    let agent = resolve_agent(&config).context("Model configuration failed")?;

    // ── Discover input ───────────────────────────────────────────────────
    let extensions: Vec<&str> = cli.ext.iter().map(|e| e.trim().trim_start_matches('.')).collect();
    let paths = match discover_images(&cli.input_dir, &extensions) {
        Ok(paths) => paths,
        Err(e @ (InputError::NoImages { .. } | InputError::DirNotFound { .. })) => {
            eprintln!("{} {}", red("error:"), e);
            return Ok(ExitCode::from(EXIT_NO_INPUT));
        }
        Err(e) => return Err(e).context("Failed to list input images"),
    };

    // ── Run batch ────────────────────────────────────────────────────────
    let observer: SharedObserver = if show_progress {
        CliObserver::new() as SharedObserver
    } else {
        Arc::new(TracingObserver)
    };
    let runner = BatchRunner::new(Arc::new(agent), &config).with_observer(observer);

    let report = match runner.run_paths(paths).await {
        Ok(report) => report,
        Err(ExtractError::EmptyBatch) => return Ok(ExitCode::from(EXIT_NO_INPUT)),
        Err(e) => return Err(e).context("Batch failed"),
    };

    if cli.json {
        println!("{}", report.to_pretty_json());
    }
    if !cli.quiet && !show_progress {
        eprintln!("{}", report.summary());
    }

    if cli.fail_on_error && report.failed() > 0 {
        return Ok(ExitCode::from(EXIT_ITEMS_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .model(cli.model.clone())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .item_timeout_secs(cli.item_timeout)
        .api_timeout_secs(cli.api_timeout)
        .schema_version(if cli.legacy {
            SchemaVersion::Legacy
        } else {
            SchemaVersion::Current
        });

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
