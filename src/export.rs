//! Export: present → stabilise → capture, for one card or a whole batch.
//!
//! ## Batch flow
//!
//! ```text
//! remember current request
//!   for each record (strictly in order):
//!     present(record) ──▶ wait for its token ──▶ capture ──▶ (name, png)
//!                                   └── failure: ItemError, skip, continue
//! restore the remembered request
//! zip entries in record order
//! ```
//!
//! Items are never processed concurrently: they share one surface.

use crate::assets::BackgroundSource;
use crate::cancel::CancelToken;
use crate::config::CardConfig;
use crate::error::{CardError, ItemError};
use crate::output::{
    archive_name, batch_entry_name, single_file_name, ExportItem, ExportJob, ExportMode,
    ExportOutput, ExportStats, ExportedFile, PNG_MIME, ZIP_MIME,
};
use crate::pipeline::capture::{CaptureService, CapturedCard};
use crate::pipeline::encode::write_archive;
use crate::pipeline::render::{RenderRequest, RenderSurfaceAdapter};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::WordRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives the surface and the capture service to produce export files.
pub struct ExportPipeline {
    adapter: Arc<RenderSurfaceAdapter>,
    capture: Arc<CaptureService>,
    progress: ProgressCallback,
}

impl ExportPipeline {
    pub fn new(
        adapter: Arc<RenderSurfaceAdapter>,
        capture: Arc<CaptureService>,
        config: &CardConfig,
    ) -> Self {
        Self {
            adapter,
            capture,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Export one card as `<sanitized term>.png`.
    ///
    /// A record that never reaches readiness yields `NothingToExport`;
    /// a rasterisation failure yields `CaptureFailed`.
    pub async fn export_single(
        &self,
        record: &WordRecord,
        background: Option<BackgroundSource>,
        cancel: &CancelToken,
    ) -> Result<ExportOutput, CardError> {
        if !record.is_displayable() {
            return Err(CardError::NothingToExport);
        }
        let start = Instant::now();
        self.progress.on_export_start(1);
        self.progress.on_item_start(1, 1);

        let outcome = self
            .adapter
            .present(RenderRequest::new(record.clone(), background), cancel)
            .await?;
        let card = match self.capture.wait_ready(outcome.token(), cancel).await {
            Ok(()) => self.capture.capture(outcome.token(), cancel).await,
            Err(CardError::CaptureFailed { detail }) => {
                debug!("Single export: surface not ready: {detail}");
                Err(CardError::NothingToExport)
            }
            Err(e) => Err(e),
        };
        let card = match card {
            Ok(card) => card,
            Err(e) => {
                self.progress.on_item_error(1, 1, &e.to_string());
                self.progress.on_export_complete(1, 0);
                return Err(e);
            }
        };
        self.progress.on_item_complete(1, 1, card.png.len());
        self.progress.on_export_complete(1, 1);

        let file = package(ExportJob {
            mode: ExportMode::Single,
            items: vec![ExportItem {
                position: 1,
                record: record.clone(),
                card,
            }],
        })?;
        info!("Exported {} ({} bytes)", file.name, file.bytes.len());
        Ok(ExportOutput {
            file,
            stats: ExportStats {
                total: 1,
                exported: 1,
                failed: 0,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            errors: Vec::new(),
        })
    }

    /// Export every record into `LexiCards_Batch_<epochMillis>.zip`.
    ///
    /// Cards that fail are skipped and reported in
    /// [`ExportOutput::errors`]; if none succeed the result is
    /// `NothingToExport`. Whatever was on the surface before the export is
    /// presented again afterwards, also on failure or cancellation.
    pub async fn export_batch(
        &self,
        records: &[WordRecord],
        background: Option<BackgroundSource>,
        cancel: &CancelToken,
    ) -> Result<ExportOutput, CardError> {
        if records.is_empty() {
            return Err(CardError::NothingToExport);
        }
        let start = Instant::now();
        let previous = self.adapter.current_request();

        let result = self.capture_all(records, background, cancel).await;
        self.restore(previous).await;
        let (items, errors) = result?;

        let total = records.len();
        let exported = items.len();
        if exported == 0 {
            warn!("Batch export: all {total} cards failed");
            return Err(CardError::NothingToExport);
        }

        let file = package(ExportJob {
            mode: ExportMode::Batch,
            items,
        })?;
        let stats = ExportStats {
            total,
            exported,
            failed: errors.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Exported {} ({exported}/{total} cards, {} bytes) in {}ms",
            file.name,
            file.bytes.len(),
            stats.duration_ms
        );
        Ok(ExportOutput {
            file,
            stats,
            errors,
        })
    }

    async fn capture_all(
        &self,
        records: &[WordRecord],
        background: Option<BackgroundSource>,
        cancel: &CancelToken,
    ) -> Result<(Vec<ExportItem>, Vec<ItemError>), CardError> {
        let total = records.len();
        let mut items = Vec::with_capacity(total);
        let mut errors = Vec::new();
        self.progress.on_export_start(total);

        for (index, record) in records.iter().enumerate() {
            cancel.check()?;
            self.progress.on_item_start(index + 1, total);

            match self.capture_one(index + 1, record, background.clone(), cancel).await {
                Ok(card) => {
                    self.progress.on_item_complete(index + 1, total, card.png.len());
                    items.push(ExportItem {
                        position: index + 1,
                        record: record.clone(),
                        card,
                    });
                }
                Err(ItemOutcome::Fatal(e)) => return Err(e),
                Err(ItemOutcome::Skipped(err)) => {
                    warn!("{err}");
                    self.progress.on_item_error(index + 1, total, &err.to_string());
                    errors.push(err);
                }
            }
        }

        self.progress.on_export_complete(total, items.len());
        Ok((items, errors))
    }

    /// `position` is 1-based.
    async fn capture_one(
        &self,
        position: usize,
        record: &WordRecord,
        background: Option<BackgroundSource>,
        cancel: &CancelToken,
    ) -> Result<CapturedCard, ItemOutcome> {
        let term = record.label().to_string();
        let outcome = self
            .adapter
            .present(RenderRequest::new(record.clone(), background), cancel)
            .await
            .map_err(ItemOutcome::Fatal)?;

        self.capture
            .wait_ready(outcome.token(), cancel)
            .await
            .map_err(|e| match e {
                CardError::CaptureFailed { detail } => ItemOutcome::Skipped(ItemError::NotReady {
                    index: position,
                    term: term.clone(),
                    detail,
                }),
                other => ItemOutcome::Fatal(other),
            })?;

        self.capture
            .capture(outcome.token(), cancel)
            .await
            .map_err(|e| match e {
                CardError::CaptureFailed { detail } => {
                    ItemOutcome::Skipped(ItemError::CaptureFailed {
                        index: position,
                        term: term.clone(),
                        detail,
                    })
                }
                other => ItemOutcome::Fatal(other),
            })
    }

    /// Put back what was shown before the export; an empty surface stays empty.
    async fn restore(&self, previous: Option<RenderRequest>) {
        let request = previous.unwrap_or_else(RenderRequest::hidden);
        // Restoring must happen even when the export itself was cancelled.
        if let Err(e) = self.adapter.present(request, &CancelToken::new()).await {
            warn!("Could not restore the surface after export: {e}");
        }
    }
}

enum ItemOutcome {
    Skipped(ItemError),
    Fatal(CardError),
}

/// Turn captured cards into the file to deliver: the PNG itself for a
/// single card, a ZIP of `<sanitized>_<position>.png` entries for a batch.
pub fn package(job: ExportJob) -> Result<ExportedFile, CardError> {
    match job.mode {
        ExportMode::Single => {
            let item = job
                .items
                .into_iter()
                .next()
                .ok_or(CardError::NothingToExport)?;
            Ok(ExportedFile {
                name: single_file_name(&item.record),
                bytes: item.card.png,
                mime: PNG_MIME,
            })
        }
        ExportMode::Batch => {
            if job.items.is_empty() {
                return Err(CardError::NothingToExport);
            }
            let entries: Vec<(String, Vec<u8>)> = job
                .items
                .into_iter()
                .map(|item| (batch_entry_name(&item.record, item.position), item.card.png))
                .collect();
            Ok(ExportedFile {
                name: archive_name(chrono::Utc::now().timestamp_millis()),
                bytes: write_archive(&entries)?,
                mime: ZIP_MIME,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(byte: u8) -> CapturedCard {
        CapturedCard {
            png: vec![byte],
            width: 1,
            height: 1,
        }
    }

    fn item(position: usize, term: &str, byte: u8) -> ExportItem {
        ExportItem {
            position,
            record: WordRecord {
                english_term: term.into(),
                ..Default::default()
            },
            card: card(byte),
        }
    }

    #[test]
    fn package_single_is_png() {
        let file = package(ExportJob {
            mode: ExportMode::Single,
            items: vec![item(1, "ice cream", 7)],
        })
        .unwrap();
        assert_eq!(file.name, "ice_cream.png");
        assert_eq!(file.mime, PNG_MIME);
        assert_eq!(file.bytes, vec![7]);
    }

    #[test]
    fn package_batch_is_zip() {
        let file = package(ExportJob {
            mode: ExportMode::Batch,
            items: vec![item(1, "a", 1), item(3, "b", 2)],
        })
        .unwrap();
        assert!(file.name.starts_with("LexiCards_Batch_"));
        assert!(file.name.ends_with(".zip"));
        assert_eq!(file.mime, ZIP_MIME);
        assert_eq!(&file.bytes[..2], b"PK");

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(file.bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["a_1.png", "b_3.png"]);
    }

    #[test]
    fn package_empty_is_nothing_to_export() {
        for mode in [ExportMode::Single, ExportMode::Batch] {
            let err = package(ExportJob {
                mode,
                items: Vec::new(),
            })
            .unwrap_err();
            assert!(matches!(err, CardError::NothingToExport));
        }
    }
}
