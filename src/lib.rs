//! # lexicard
//!
//! Turn English words into illustrated English-Chinese vocabulary cards and
//! export them as PNG images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw text
//!  │
//!  ├─ 1. Input    four-line entry → one record, or word list → tokens
//!  ├─ 2. Enrich   one LLM call: tokens → JSON array of records
//!  ├─ 3. Batch    ordered records + current position
//!  ├─ 4. Render   record + background → surface, readiness per request token
//!  ├─ 5. Capture  wait for the token, rasterise with resvg at 2×
//!  └─ 6. Export   <term>.png, or LexiCards_Batch_<ms>.zip for a batch
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lexicard::{BackgroundPool, CancelToken, CardConfig, DirectorySink, Session};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let pool = BackgroundPool::from_dir(Path::new("assets"))?;
//!     let session = Session::new(CardConfig::default(), pool)?;
//!     let cancel = CancelToken::new();
//!
//!     session.generate("apple, serendipity; take off", &cancel).await?;
//!     let (output, path) = session.download(&DirectorySink::new("cards"), &cancel).await?;
//!     eprintln!("{} cards → {}", output.stats.exported, path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lexicard` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! lexicard = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assets;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assets::{BackgroundError, BackgroundLoader, BackgroundPool, BackgroundSource, DefaultLoader};
pub use batch::BatchState;
pub use cancel::CancelToken;
pub use config::{CardConfig, CardConfigBuilder, DEFAULT_FALLBACK_BACKGROUND};
pub use error::{CardError, ItemError};
pub use export::ExportPipeline;
pub use output::{
    sanitize_filename, DirectorySink, ExportItem, ExportJob, ExportMode, ExportOutput, ExportStats,
    ExportedFile, FileSink,
};
pub use pipeline::capture::{CaptureService, CapturedCard};
pub use pipeline::input::{parse_single, parse_tokens, validate_single, validate_tokens};
pub use pipeline::llm::{resolve_backend, CompletionBackend, EnrichmentClient, LlmBackend};
pub use pipeline::render::{PresentOutcome, Readiness, RenderRequest, RenderSurfaceAdapter};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::WordRecord;
pub use session::{ExportGate, ExportGuard, Session, SessionStatus};
