//! Export results and file delivery.

use crate::error::{CardError, ItemError};
use crate::pipeline::capture::CapturedCard;
use crate::record::WordRecord;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PNG_MIME: &str = "image/png";
pub const ZIP_MIME: &str = "application/zip";

/// One card, or every card of the batch in one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportMode {
    Single,
    Batch,
}

/// One captured card and where its record sits in the batch.
#[derive(Debug, Clone)]
pub struct ExportItem {
    /// 1-based position in the batch, kept when earlier cards are skipped.
    pub position: usize,
    pub record: WordRecord,
    pub card: CapturedCard,
}

/// Captured cards waiting to be packaged, in batch order.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub mode: ExportMode,
    pub items: Vec<ExportItem>,
}

/// A named blob ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Counters for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Cards requested.
    pub total: usize,
    /// Cards that made it into the file.
    pub exported: usize,
    /// Cards skipped because capture failed.
    pub failed: usize,
    /// Wall-clock time of the whole export.
    pub duration_ms: u64,
}

/// The file plus what happened while producing it.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub file: ExportedFile,
    pub stats: ExportStats,
    /// Skipped cards, in batch order.
    pub errors: Vec<ItemError>,
}

/// Replace every character outside `[A-Za-z0-9]` with `_`.
///
/// An empty term becomes `card` so the file never ends up nameless.
pub fn sanitize_filename(term: &str) -> String {
    if term.is_empty() {
        return "card".to_string();
    }
    term.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<sanitized>.png`
pub fn single_file_name(record: &WordRecord) -> String {
    format!("{}.png", sanitize_filename(record.english_term.trim()))
}

/// `<sanitized>_<position>.png`, `position` being 1-based.
pub fn batch_entry_name(record: &WordRecord, position: usize) -> String {
    format!("{}_{position}.png", sanitize_filename(record.english_term.trim()))
}

/// `LexiCards_Batch_<epochMillis>.zip`
pub fn archive_name(epoch_millis: i64) -> String {
    format!("LexiCards_Batch_{epoch_millis}.zip")
}

/// Delivers an exported file somewhere.
pub trait FileSink: Send + Sync {
    fn deliver<'a>(&'a self, file: &'a ExportedFile) -> BoxFuture<'a, Result<PathBuf, CardError>>;
}

/// Writes files into a directory, atomically (temp file in the same
/// directory, then rename), so a crash never leaves half a PNG behind.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSink for DirectorySink {
    fn deliver<'a>(&'a self, file: &'a ExportedFile) -> BoxFuture<'a, Result<PathBuf, CardError>> {
        Box::pin(async move {
            let dir = self.dir.clone();
            let path = dir.join(&file.name);
            let bytes = file.bytes.clone();
            let target = path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
                .await
                .map_err(|e| CardError::Internal(format!("Write task panicked: {e}")))??;
            info!("Wrote {} ({} bytes)", path.display(), file.bytes.len());
            Ok(path)
        })
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), CardError> {
    let fail = |source: std::io::Error| CardError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}
