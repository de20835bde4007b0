//! Configuration types for card generation and export.
//!
//! All behaviour is controlled through [`CardConfig`], built via its
//! [`CardConfigBuilder`]. Keeping every knob in one struct makes it easy to
//! share the config between the session, the enrichment client and the
//! export pipeline, and to log exactly what a run used.

use crate::error::CardError;
use crate::pipeline::llm::CompletionBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Placeholder shown when a selected background cannot be loaded.
pub const DEFAULT_FALLBACK_BACKGROUND: &str =
    "https://placehold.co/800x600/2E7D32/FFFFFF?text=背景加载失败&font=notosanssc";

/// Configuration for enrichment, rendering and export.
///
/// Built via [`CardConfig::builder()`] or using [`CardConfig::default()`].
///
/// # Example
/// ```rust
/// use lexicard::CardConfig;
///
/// let config = CardConfig::builder()
///     .model("gemini-2.0-flash")
///     .scale(2.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CardConfig {
    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-nano".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `backend`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed completion backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Sampling temperature for the enrichment call. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate for one batch. Default: 4096.
    ///
    /// A record costs roughly 80–120 output tokens, so the default covers
    /// batches of a few dozen words.
    pub max_tokens: usize,

    /// Enrichment call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Logical card width in CSS pixels. Range: 240–1200. Default: 500.
    pub card_width: u32,

    /// Rasterisation scale factor. Range: 1.0–4.0. Default: 2.0.
    ///
    /// The same factor applies to every card of an export job so that all
    /// images of one archive share the same pixel density.
    pub scale: f32,

    /// Longest wait for the surface to report readiness, in ms. Default: 10 000.
    pub stabilize_timeout_ms: u64,

    /// Image used when the selected background fails to load.
    pub fallback_background: String,

    /// Timeout for fetching remote backgrounds, in seconds. Default: 15.
    pub background_timeout_secs: u64,

    /// Extra directories scanned for `.ttf`/`.otf`/`.ttc` fonts.
    pub font_dirs: Vec<PathBuf>,

    /// Receives per-card export events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            backend: None,
            temperature: 0.2,
            max_tokens: 4096,
            api_timeout_secs: 60,
            system_prompt: None,
            card_width: 500,
            scale: 2.0,
            stabilize_timeout_ms: 10_000,
            fallback_background: DEFAULT_FALLBACK_BACKGROUND.to_string(),
            background_timeout_secs: 15,
            font_dirs: Vec::new(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn CompletionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("card_width", &self.card_width)
            .field("scale", &self.scale)
            .field("stabilize_timeout_ms", &self.stabilize_timeout_ms)
            .field("fallback_background", &self.fallback_background)
            .field("font_dirs", &self.font_dirs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl CardConfig {
    /// Create a new builder for `CardConfig`.
    pub fn builder() -> CardConfigBuilder {
        CardConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CardConfig`].
#[derive(Debug)]
pub struct CardConfigBuilder {
    config: CardConfig,
}

impl CardConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn card_width(mut self, px: u32) -> Self {
        self.config.card_width = px.clamp(240, 1200);
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn stabilize_timeout_ms(mut self, ms: u64) -> Self {
        self.config.stabilize_timeout_ms = ms.max(1);
        self
    }

    pub fn fallback_background(mut self, url: impl Into<String>) -> Self {
        self.config.fallback_background = url.into();
        self
    }

    pub fn background_timeout_secs(mut self, secs: u64) -> Self {
        self.config.background_timeout_secs = secs;
        self
    }

    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dirs.push(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CardConfig, CardError> {
        let c = &self.config;
        if !c.scale.is_finite() || !(1.0..=4.0).contains(&c.scale) {
            return Err(CardError::InvalidConfig(format!(
                "Scale must be 1.0–4.0, got {}",
                c.scale
            )));
        }
        if c.max_tokens == 0 {
            return Err(CardError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(CardError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
