//! CLI binary for driveocr.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, renders live status with indicatif, and installs a
//! signal handler so an interrupted run still tears its resources down.

use anyhow::{Context, Result};
use clap::Parser;
use driveocr::{
    Authenticator, ConversionConfig, Converter, DriveClient, StatusObserver, StatusSnapshot,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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

// ── CLI status observer using indicatif ──────────────────────────────────────

/// Terminal status line: a spinner whose message is rewritten on every
/// sampling tick with the aggregate snapshot.
struct CliStatusObserver {
    bar: ProgressBar,
}

impl CliStatusObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Checking input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl StatusObserver for CliStatusObserver {
    fn on_run_start(&self, chunk_count: usize) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {chunk_count} part(s)…"))
        ));
    }

    fn on_tick(&self, snapshot: &StatusSnapshot) {
        self.bar.set_message(snapshot.to_string());
    }

    fn on_run_complete(&self, snapshot: &StatusSnapshot) {
        self.bar.finish_and_clear();
        if snapshot.failed == 0 {
            eprintln!(
                "{} {} part(s) converted successfully",
                green("✔"),
                bold(&snapshot.finished.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} parts converted  ({} failed)",
                red("✘"),
                snapshot.finished,
                snapshot.total,
                red(&snapshot.failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion
  driveocr scan.pdf

  # Custom output path and OCR language hint
  driveocr scan.pdf -o thesis.docx -l de

  # More parallel uploads for a large document
  driveocr big-scan.pdf --concurrency 20

  # Machine-readable run stats
  driveocr scan.pdf --json > stats.json

SETUP:
  1. Create an OAuth client (Desktop app) in the Google Cloud console and
     download its credentials.json.
  2. Run driveocr once; it prints an authorization URL, asks for the code,
     and stores the token in token.json for subsequent runs.

  The tool needs full Drive scope: it creates a scratch folder, uploads the
  PDF parts, copies them as Google Docs (this is what performs the OCR),
  exports the results, and deletes everything it created afterwards.

ENVIRONMENT VARIABLES:
  DRIVEOCR_CREDENTIALS   Path to credentials.json
  DRIVEOCR_TOKEN         Path to token.json
  PDFIUM_LIB_PATH        Path to an existing libpdfium shared library
"#;

/// OCR-convert a PDF to DOCX through Google Drive.
#[derive(Parser, Debug)]
#[command(
    name = "driveocr",
    version,
    about = "OCR-convert a PDF to DOCX through Google Drive",
    long_about = "OCR-convert a scanned PDF to DOCX using Google Drive's built-in OCR. \
Oversized PDFs are split into page-range parts under Drive's conversion limit, converted \
concurrently, and merged back into a single DOCX in page order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert.
    input: PathBuf,

    /// Output DOCX path.
    #[arg(short, long, env = "DRIVEOCR_OUTPUT", default_value = "output.docx")]
    output: PathBuf,

    /// Two-letter OCR language hint (e.g. en, de, fr).
    #[arg(short = 'l', long, env = "DRIVEOCR_LANG")]
    lang: Option<String>,

    /// Path to the OAuth client credentials file.
    #[arg(
        short = 'c',
        long,
        visible_alias = "cert",
        env = "DRIVEOCR_CREDENTIALS",
        default_value = "credentials.json"
    )]
    credentials: PathBuf,

    /// Path where the OAuth token is stored.
    #[arg(long, env = "DRIVEOCR_TOKEN", default_value = "token.json")]
    token: PathBuf,

    /// Number of parts converted in parallel.
    #[arg(long, env = "DRIVEOCR_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Target size of each split part, in MB.
    #[arg(long, env = "DRIVEOCR_CHUNK_MB", default_value_t = 5.0)]
    chunk_mb: f64,

    /// Output run stats as JSON instead of the human summary.
    #[arg(long, env = "DRIVEOCR_JSON")]
    json: bool,

    /// Disable the live status line.
    #[arg(long, env = "DRIVEOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DRIVEOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DRIVEOCR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the status line is active; the
    // spinner provides the feedback that matters. Verbose wins regardless.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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
        .with_writer(std::io::stderr)
        .init();

    // ── Auth + client ────────────────────────────────────────────────────
    let auth = Authenticator::load(&cli.credentials, &cli.token)
        .context("Failed to load OAuth credentials")?;
    let remote = Arc::new(DriveClient::new(auth).context("Failed to build Drive client")?);

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ConversionConfig::builder()
        .concurrency(cli.concurrency)
        .chunk_target_mb(cli.chunk_mb);
    if let Some(ref lang) = cli.lang {
        builder = builder.ocr_language(lang.clone());
    }
    if show_progress {
        builder = builder.status_observer(CliStatusObserver::new());
    }
    let config = builder.build().context("Invalid configuration")?;

    let converter = Converter::new(remote.clone(), config);

    // ── Signal handler ───────────────────────────────────────────────────
    // Ctrl-C mid-run must still delete local parts, uploaded objects, and
    // the scratch folder; the tracker's latch makes a second teardown from
    // the normal completion path a no-op (and vice versa).
    let tracker = converter.tracker();
    let signal_remote = remote.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        eprintln!("\ninterrupted; cleaning up…");
        tracker.teardown(signal_remote.as_ref()).await;
        std::process::exit(130);
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let stats = converter
        .convert_to_file(&cli.input, &cli.output)
        .await
        .context("Conversion failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise run stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} part(s)  {}ms  →  {}",
            green("✔"),
            stats.chunk_count,
            stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        eprintln!(
            "   {} split  /  {} convert",
            dim(&format!("{}ms", stats.split_duration_ms)),
            dim(&format!("{}ms", stats.pipeline_duration_ms)),
        );
    }

    Ok(())
}

/// Resolve on SIGINT, and on SIGTERM where the platform has it.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
