//! CLI binary for docbatch.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! runs one batch and prints the per-file results.

use anyhow::{Context, Result};
use clap::Parser;
use docbatch::{
    BatchConfig, BatchConverter, BatchItem, BatchProgressCallback, ConversionOutcome,
    DispatchOutcome, FileSelection, ItemStatus, ProgressCallback, SkipReason, UnmatchedPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn shorten(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar while uploading, a spinner while the server
/// converts, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Uploading");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn spin(&self, prefix: &'static str, msg: String) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
        self.bar.reset_elapsed();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, _index: usize, total: usize, name: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_message(name.to_string());
    }

    fn on_upload_complete(&self, _index: usize, _total: usize, name: &str, file_type: &str) {
        self.bar.println(format!("  {} {:<32} {}", green("✓"), name, dim(file_type)));
        self.bar.inc(1);
    }

    fn on_upload_error(&self, _index: usize, _total: usize, name: &str, error: &str) {
        self.bar
            .println(format!("  {} {:<32} {}", red("✗"), name, red(&shorten(error, 80))));
        self.bar.inc(1);
    }

    fn on_dispatch_start(&self, file_count: usize, target_format: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {file_count} files to {target_format}…"))
        ));
        self.spin("Converting", "waiting for server".to_string());
    }

    fn on_batch_complete(&self, outcomes: &[ConversionOutcome]) {
        let ok = outcomes.iter().filter(|o| o.is_success()).count();
        self.bar.println(format!(
            "  {} {}/{} converted",
            if ok == outcomes.len() { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            outcomes.len()
        ));
        self.spin("Downloading", String::new());
    }

    fn on_dispatch_failed(&self, error: &str) {
        self.bar
            .println(format!("  {} {}", red("✘"), red(&shorten(error, 100))));
    }

    fn on_download_complete(&self, filename: &str, bytes: u64) {
        self.bar.println(format!(
            "  {} {:<32} {}",
            green("↓"),
            filename,
            dim(&format!("{bytes} bytes"))
        ));
    }

    fn on_download_error(&self, filename: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:<32} {}",
            red("✗"),
            filename,
            red(&shorten(error, 80))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert three documents to PDF into ./converted
  docbatch --to pdf -o converted report.docx notes.txt letter.rtf

  # Show the formats the server offers
  docbatch --list-formats

  # Use a remote server and print the final list as JSON
  docbatch --server https://convert.example.com --to docx --json *.odt

  # Check extensions locally before uploading
  docbatch --validate-inputs --to txt scans/*

ENVIRONMENT VARIABLES:
  DOCBATCH_SERVER         Conversion server origin (default http://localhost:8001)
  DOCBATCH_API_PREFIX     API route prefix (default /api)
  DOCBATCH_TO             Target format
  DOCBATCH_OUTPUT_DIR     Directory converted files are saved to
  RUST_LOG                Override the log filter (e.g. docbatch=debug)
"#;

/// Batch-convert documents through a conversion server.
#[derive(Parser, Debug)]
#[command(
    name = "docbatch",
    version,
    about = "Upload documents, convert them all to one format, download the results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert, uploaded in the order given.
    files: Vec<PathBuf>,

    /// Target format (e.g. pdf, docx, txt, html).
    #[arg(short = 't', long = "to", env = "DOCBATCH_TO")]
    target_format: Option<String>,

    /// Directory converted files are saved to.
    #[arg(short, long, env = "DOCBATCH_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Conversion server origin.
    #[arg(long, env = "DOCBATCH_SERVER", default_value = "http://localhost:8001")]
    server: String,

    /// API route prefix on the server.
    #[arg(long, env = "DOCBATCH_API_PREFIX", default_value = "/api")]
    api_prefix: String,

    /// Print the formats offered by the server and exit.
    #[arg(long)]
    list_formats: bool,

    /// Reject files with unsupported extensions before uploading them.
    #[arg(long, env = "DOCBATCH_VALIDATE_INPUTS")]
    validate_inputs: bool,

    /// Leave files missing from the conversion response uploaded instead of
    /// marking them failed.
    #[arg(long, env = "DOCBATCH_KEEP_UNMATCHED")]
    keep_unmatched: bool,

    /// Convert but do not download results.
    #[arg(long)]
    no_download: bool,

    /// Output the final batch as JSON.
    #[arg(long, env = "DOCBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCBATCH_QUIET")]
    quiet: bool,

    /// Per-file upload timeout in seconds.
    #[arg(long, env = "DOCBATCH_UPLOAD_TIMEOUT", default_value_t = 120)]
    upload_timeout: u64,

    /// Batch conversion timeout in seconds.
    #[arg(long, env = "DOCBATCH_CONVERT_TIMEOUT", default_value_t = 300)]
    convert_timeout: u64,

    /// Timeout in seconds for downloads and the format catalog fetch.
    #[arg(long, env = "DOCBATCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_formats;
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

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn BatchProgressCallback>);
    let config = build_config(&cli, progress_cb)?;
    let batch = BatchConverter::new(config);

    // ── Formats ──────────────────────────────────────────────────────────
    if cli.list_formats {
        let catalog = batch
            .refresh_formats()
            .await
            .context("Failed to fetch formats")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&catalog).context("Failed to serialise formats")?
            );
        } else {
            println!("Input:   {}", catalog.input.join(", "));
            println!("Output:  {}", catalog.output.join(", "));
        }
        return Ok(());
    }

    if cli.files.is_empty() {
        anyhow::bail!("No input files given");
    }
    let target = cli
        .target_format
        .as_deref()
        .context("No target format given (use --to)")?;

    if let Err(e) = batch.refresh_formats().await {
        warn!("Could not fetch formats from server, using defaults: {}", e);
    }
    batch
        .select_format(target)
        .context("Unsupported target format")?;

    // ── Intake ───────────────────────────────────────────────────────────
    let mut selections = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        selections.push(
            FileSelection::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }
    batch.add_files(selections).await.context("Upload failed")?;

    // ── Dispatch ─────────────────────────────────────────────────────────
    let dispatch = batch.convert().await.context("Batch conversion failed")?;
    if let DispatchOutcome::Skipped { reason } = &dispatch {
        if !cli.quiet && *reason == SkipReason::NothingToConvert {
            eprintln!("{} no file was uploaded successfully", red("✘"));
        }
    }

    // ── Delivery ─────────────────────────────────────────────────────────
    let downloads = if cli.no_download {
        None
    } else {
        Some(batch.download_all().await)
    };

    if let Some(cb) = &cli_progress {
        cb.bar.finish_and_clear();
    }

    let items = batch.items();
    if cli.json {
        let run = serde_json::json!({
            "target_format": target,
            "dispatch": dispatch,
            "downloads": downloads,
            "items": items,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        print_items(&items);
        let summary = batch.summary();
        let saved = downloads.as_ref().map_or(0, |d| d.saved.len());
        eprintln!(
            "{}  {}/{} converted  {} saved  →  {}",
            if summary.failed == 0 && summary.ready == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            summary.converted,
            summary.total,
            saved,
            bold(&cli.output_dir.display().to_string()),
        );
    }

    Ok(())
}

fn print_items(items: &[BatchItem]) {
    for item in items {
        let detail = match &item.status {
            ItemStatus::Uploaded => dim("not converted"),
            ItemStatus::Converted(result) => result.output_file.clone(),
            ItemStatus::Error { message } => red(&shorten(message, 80)),
        };
        println!(
            "{:<32} {:<10} {}",
            item.name,
            item.status.label(),
            detail
        );
    }
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .base_url(cli.server.clone())
        .api_prefix(cli.api_prefix.clone())
        .output_dir(cli.output_dir.clone())
        .validate_inputs(cli.validate_inputs)
        .upload_timeout_secs(cli.upload_timeout)
        .convert_timeout_secs(cli.convert_timeout)
        .download_timeout_secs(cli.download_timeout);

    if cli.keep_unmatched {
        builder = builder.unmatched(UnmatchedPolicy::KeepUploaded);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
