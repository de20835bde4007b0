//! CLI binary for lexicard.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `CardConfig`, drives a `Session` and writes the exported file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lexicard::{
    parse_tokens, BackgroundPool, BackgroundSource, CancelToken, CardConfig, CardError,
    DirectorySink, EnrichmentClient, ExportOutput, ExportProgressCallback, ProgressCallback,
    Session,
};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar for the export plus one log line per card.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Starts hidden as a spinner; `on_export_start` turns it into a bar.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Laying out cards…");

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Exporting");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_export_start(&self, total: usize) {
        self.activate_bar(total);
    }

    fn on_item_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(format!("card {index}"));
    }

    fn on_item_complete(&self, index: usize, total: usize, png_len: usize) {
        let elapsed_ms = self.elapsed_ms(index);
        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{:>6} KB", png_len / 1024)),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(index);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_export_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} cards rendered",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} cards rendered  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One card from a hand-typed entry (term / phonetics / translation / explanation)
  printf 'apple\n/ˈæp.əl/, /ˈæp.əl/\nn. 苹果\n一种常见的水果。\n' | lexicard card -

  # A batch of cards, enriched by an LLM, packed into a ZIP
  lexicard batch "apple, banana; take off" --backgrounds ./assets -o cards/

  # Words from a file
  lexicard batch --file words.txt -o cards/

  # Just print the enriched records
  lexicard enrich "serendipity, ephemeral" > words.json

INPUT FORMAT (card):
  line 1   English term
  line 2   UK phonetic, US phonetic (comma or ，)
  line 3   Chinese translation
  line 4+  Chinese explanation, line breaks kept

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  LEXICARD_LLM_PROVIDER   Override provider (gemini, openai, anthropic, ollama)
  LEXICARD_MODEL          Override model ID
  RUST_LOG                Log filter (e.g. lexicard=debug)
"#;

/// Generate vocabulary cards as PNG images.
#[derive(Parser, Debug)]
#[command(
    name = "lexicard",
    version,
    about = "Generate English-Chinese vocabulary cards as PNG images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: CommonOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one hand-typed entry to a PNG (no API key needed).
    Card {
        /// File with the four-line entry, or `-` for stdin.
        input: String,
    },
    /// Enrich a word list and export the cards (PNG for one word, ZIP otherwise).
    Batch(WordsArgs),
    /// Enrich a word list and print the records as JSON.
    Enrich(WordsArgs),
}

#[derive(Args, Debug)]
struct WordsArgs {
    /// Words separated by `,` `，` `;` `；` or newlines.
    words: Option<String>,

    /// Read the word list from this file instead.
    #[arg(long, conflicts_with = "words")]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CommonOpts {
    /// Directory the exported file is written to.
    #[arg(short, long, global = true, env = "LEXICARD_OUT", default_value = ".")]
    out: PathBuf,

    /// Directory of background images (jpg, jpeg, png, webp), or one image URL.
    #[arg(long, global = true, env = "LEXICARD_BACKGROUNDS")]
    backgrounds: Option<String>,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, global = true, env = "LEXICARD_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, global = true, env = "LEXICARD_PROVIDER")]
    provider: Option<String>,

    /// Rasterisation scale (1.0–4.0).
    #[arg(long, global = true, env = "LEXICARD_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Card width in CSS pixels (240–1200).
    #[arg(long, global = true, env = "LEXICARD_WIDTH", default_value_t = 500)]
    width: u32,

    /// Extra font directory (repeatable), e.g. one containing a Kai font.
    #[arg(long = "font-dir", global = true)]
    font_dirs: Vec<PathBuf>,

    /// Enrichment call timeout in seconds.
    #[arg(long, global = true, env = "LEXICARD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "LEXICARD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LEXICARD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LEXICARD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    let is_json = matches!(cli.command, Command::Enrich(_));
    let show_progress = !opts.quiet && !opts.no_progress && !is_json;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    // ── Ctrl-C cancels the running action ────────────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };
    let config = build_config(opts, progress_cb)?;

    match &cli.command {
        Command::Card { input } => {
            let text = read_input(input)?;
            let session = Session::new(config, load_pool(opts)?).context("Failed to start")?;
            session
                .preview_single(&text, &cancel)
                .await
                .map_err(user_error)?;
            export(&session, opts, &cancel).await
        }
        Command::Batch(words) => {
            let text = read_words(words)?;
            let session = Session::new(config, load_pool(opts)?).context("Failed to start")?;
            let spinner = (!opts.quiet).then(|| enrich_spinner(&text));
            let generated = session.generate(&text, &cancel).await;
            if let Some(s) = spinner {
                s.finish_and_clear();
            }
            let count = generated.map_err(user_error)?;
            if !opts.quiet {
                eprintln!("{} {} records received", cyan("◆"), bold(&count.to_string()));
            }
            export(&session, opts, &cancel).await
        }
        Command::Enrich(words) => {
            let text = read_words(words)?;
            let tokens = lexicard::validate_tokens(&text).map_err(user_error)?;
            let client = EnrichmentClient::from_config(&config).map_err(user_error)?;
            let records = client.enrich(&tokens, &cancel).await.map_err(user_error)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&records).context("Failed to serialise records")?
            );
            Ok(())
        }
    }
}

async fn export(session: &Session, opts: &CommonOpts, cancel: &CancelToken) -> Result<()> {
    let sink = DirectorySink::new(&opts.out);
    let (output, path) = session.download(&sink, cancel).await.map_err(user_error)?;
    if !opts.quiet {
        print_summary(&output, &path);
    }
    Ok(())
}

fn print_summary(output: &ExportOutput, path: &Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} cards  {}ms  →  {}",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        stats.exported,
        stats.total,
        stats.duration_ms,
        bold(&path.display().to_string()),
    );
    for err in &output.errors {
        eprintln!("   {} {}", red("✗"), dim(&err.to_string()));
    }
}

/// Keep the detailed error in the chain but lead with the user-facing message.
fn user_error(e: CardError) -> anyhow::Error {
    let message = e.user_message();
    anyhow::Error::new(e).context(message)
}

fn enrich_spinner(text: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix("Enriching");
    bar.set_message(format!("{} words…", parse_tokens(text).len()));
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Map CLI args to `CardConfig`.
fn build_config(opts: &CommonOpts, progress: Option<ProgressCallback>) -> Result<CardConfig> {
    let mut builder = CardConfig::builder()
        .scale(opts.scale)
        .card_width(opts.width)
        .api_timeout_secs(opts.api_timeout);
    if let Some(ref model) = opts.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider);
    }
    for dir in &opts.font_dirs {
        builder = builder.font_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn load_pool(opts: &CommonOpts) -> Result<BackgroundPool> {
    match opts.backgrounds.as_deref() {
        None => Ok(BackgroundPool::default()),
        Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
            Ok(BackgroundPool::new(vec![BackgroundSource::parse(s)]))
        }
        Some(dir) => {
            let pool = BackgroundPool::from_dir(Path::new(dir))
                .with_context(|| format!("Failed to load backgrounds from {dir:?}"))?;
            if pool.is_empty() {
                tracing::warn!("No background images in {dir:?}; using the placeholder");
            }
            Ok(pool)
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input:?}"))
    }
}

fn read_words(args: &WordsArgs) -> Result<String> {
    match (&args.words, &args.file) {
        (Some(words), _) => Ok(words.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read word list from {path:?}")),
        (None, None) => anyhow::bail!("Give a word list or --file <PATH>"),
    }
}
