//! The interactive session: one batch, one surface, one export at a time.
//!
//! A [`Session`] is what a front end talks to. It owns the [`BatchState`],
//! the render surface and the background pool, and exposes the user
//! actions: preview a hand-typed card, generate a batch, navigate, change
//! the background, download.
//!
//! While a download runs the surface is cycling through the batch, so every
//! other action is refused with [`CardError::ExportInProgress`] until the
//! [`ExportGuard`] is dropped.

use crate::assets::{BackgroundLoader, BackgroundPool, BackgroundSource, DefaultLoader};
use crate::batch::BatchState;
use crate::cancel::CancelToken;
use crate::config::CardConfig;
use crate::error::CardError;
use crate::export::ExportPipeline;
use crate::output::{ExportOutput, FileSink};
use crate::pipeline::capture::{build_fontdb, CaptureService};
use crate::pipeline::input::{validate_single, validate_tokens};
use crate::pipeline::llm::EnrichmentClient;
use crate::pipeline::render::{PresentOutcome, RenderRequest, RenderSurfaceAdapter};
use crate::record::WordRecord;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Exclusive "export in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn acquire(&self) -> Result<ExportGuard, CardError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CardError::ExportInProgress);
        }
        Ok(ExportGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the [`ExportGate`] on drop.
pub struct ExportGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What a front end needs to draw its controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// 0-based index of the card on display.
    pub current: Option<usize>,
    pub total: usize,
    pub generating: bool,
    pub exporting: bool,
    pub can_previous: bool,
    pub can_next: bool,
}

impl SessionStatus {
    /// `Card i of N`, only for batches of two or more.
    pub fn position_label(&self) -> Option<String> {
        match self.current {
            Some(i) if self.total > 1 => Some(format!("Card {} of {}", i + 1, self.total)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    batch: BatchState,
    background: Option<BackgroundSource>,
}

/// User-facing actions over one batch and one surface.
pub struct Session {
    config: CardConfig,
    pool: BackgroundPool,
    adapter: Arc<RenderSurfaceAdapter>,
    export: ExportPipeline,
    enrichment: OnceCell<EnrichmentClient>,
    state: Mutex<SessionState>,
    gate: ExportGate,
    generating: AtomicBool,
}

impl Session {
    /// Session with the file/HTTP background loader and system fonts.
    pub fn new(config: CardConfig, pool: BackgroundPool) -> Result<Self, CardError> {
        let loader = DefaultLoader::new(config.background_timeout_secs)?;
        let fontdb = build_fontdb(&config.font_dirs);
        Ok(Self::from_parts(config, pool, Arc::new(loader), fontdb))
    }

    /// Session with a caller-supplied loader and font database.
    pub fn from_parts(
        config: CardConfig,
        pool: BackgroundPool,
        loader: Arc<dyn BackgroundLoader>,
        fontdb: Arc<usvg::fontdb::Database>,
    ) -> Self {
        let adapter = Arc::new(RenderSurfaceAdapter::new(loader, &config));
        let capture = Arc::new(CaptureService::with_fontdb(&adapter, &config, fontdb));
        let export = ExportPipeline::new(Arc::clone(&adapter), capture, &config);
        Self {
            config,
            pool,
            adapter,
            export,
            enrichment: OnceCell::new(),
            state: Mutex::new(SessionState::default()),
            gate: ExportGate::default(),
            generating: AtomicBool::new(false),
        }
    }

    /// Show a hand-typed card. No network call beyond the background.
    pub async fn preview_single(
        &self,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<PresentOutcome, CardError> {
        self.ensure_idle()?;
        let record = validate_single(text)?;
        let mut next = SessionState::default();
        next.batch.replace(vec![record]);
        next.background = self.pool.pick();
        self.show(next, cancel).await
    }

    /// Enrich a word list and show the first card.
    ///
    /// Any failure leaves the previous batch and background in place.
    pub async fn generate(&self, text: &str, cancel: &CancelToken) -> Result<usize, CardError> {
        self.ensure_idle()?;
        let tokens = validate_tokens(text)?;
        let client = self
            .enrichment
            .get_or_try_init(|| async { EnrichmentClient::from_config(&self.config) })
            .await?;

        self.generating.store(true, Ordering::Release);
        let result = client.enrich(&tokens, cancel).await;
        self.generating.store(false, Ordering::Release);
        let records = result?;

        self.ensure_idle()?;
        let count = records.len();
        let mut next = SessionState::default();
        next.batch.replace(records);
        next.background = self.pool.pick();
        self.show(next, cancel).await?;
        info!("New batch: {count} cards");
        Ok(count)
    }

    /// Show the next card. No-op at the end of the batch.
    pub async fn next(&self, cancel: &CancelToken) -> Result<Option<PresentOutcome>, CardError> {
        self.navigate(cancel, BatchState::next).await
    }

    /// Show the previous card. No-op at the start of the batch.
    pub async fn previous(
        &self,
        cancel: &CancelToken,
    ) -> Result<Option<PresentOutcome>, CardError> {
        self.navigate(cancel, BatchState::previous).await
    }

    /// Pick a new random background for the card on display.
    pub async fn change_background(
        &self,
        cancel: &CancelToken,
    ) -> Result<PresentOutcome, CardError> {
        self.ensure_idle()?;
        let mut next = self.lock_state().clone();
        if next.batch.is_empty() {
            return Err(CardError::validation("no card on display"));
        }
        next.background = self.pool.pick();
        self.show(next, cancel).await
    }

    /// Export the batch and hand the file to `sink`.
    ///
    /// One card gives a PNG, several give a ZIP. Returns the export result
    /// and where the sink put the file.
    pub async fn download(
        &self,
        sink: &dyn FileSink,
        cancel: &CancelToken,
    ) -> Result<(ExportOutput, PathBuf), CardError> {
        let _guard = self.gate.acquire()?;
        let (records, background) = {
            let state = self.lock_state();
            (state.batch.records().to_vec(), state.background.clone())
        };

        let output = match records.as_slice() {
            [] => return Err(CardError::NothingToExport),
            [single] => self.export.export_single(single, background, cancel).await?,
            many => self.export.export_batch(many, background, cancel).await?,
        };
        let path = sink.deliver(&output.file).await?;
        Ok((output, path))
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock_state();
        let generating = self.generating.load(Ordering::Acquire);
        let exporting = self.gate.is_busy();
        let nav = state.batch.has_multiple() && !generating && !exporting;
        SessionStatus {
            current: state.batch.current_index(),
            total: state.batch.len(),
            generating,
            exporting,
            can_previous: nav && !state.batch.at_first(),
            can_next: nav && !state.batch.at_last(),
        }
    }

    pub fn batch(&self) -> BatchState {
        self.lock_state().batch.clone()
    }

    pub fn current_record(&self) -> Option<WordRecord> {
        self.lock_state().batch.current().cloned()
    }

    pub fn background(&self) -> Option<BackgroundSource> {
        self.lock_state().background.clone()
    }

    pub fn adapter(&self) -> &RenderSurfaceAdapter {
        &self.adapter
    }

    async fn navigate(
        &self,
        cancel: &CancelToken,
        step: fn(&mut BatchState),
    ) -> Result<Option<PresentOutcome>, CardError> {
        self.ensure_idle()?;
        let mut next = self.lock_state().clone();
        let before = next.batch.current_index();
        step(&mut next.batch);
        if next.batch.current_index() == before {
            debug!("Navigation at batch boundary, nothing to do");
            return Ok(None);
        }
        self.show(next, cancel).await.map(Some)
    }

    /// Present the current card of `next` and adopt `next` only once the
    /// surface has taken it. On error the session keeps its old state.
    async fn show(
        &self,
        next: SessionState,
        cancel: &CancelToken,
    ) -> Result<PresentOutcome, CardError> {
        let request = match next.batch.current() {
            Some(record) => RenderRequest::new(record.clone(), next.background.clone()),
            None => RenderRequest::hidden(),
        };
        let outcome = self.adapter.present(request, cancel).await?;
        *self.lock_state() = next;
        Ok(outcome)
    }

    fn ensure_idle(&self) -> Result<(), CardError> {
        if self.gate.is_busy() {
            Err(CardError::ExportInProgress)
        } else {
            Ok(())
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_exclusive_and_released_on_drop() {
        let gate = ExportGate::default();
        let guard = gate.acquire().unwrap();
        assert!(gate.is_busy());
        assert!(matches!(gate.acquire(), Err(CardError::ExportInProgress)));
        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.acquire().is_ok());
    }

    #[test]
    fn position_label_only_for_batches() {
        let mut status = SessionStatus {
            current: Some(1),
            total: 3,
            generating: false,
            exporting: false,
            can_previous: true,
            can_next: true,
        };
        assert_eq!(status.position_label().as_deref(), Some("Card 2 of 3"));
        status.total = 1;
        status.current = Some(0);
        assert_eq!(status.position_label(), None);
    }
}
