//! Error types for the lexicard library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CardError`] is **fatal**: the requested action cannot proceed at all
//!   (blank input, provider not configured, unreadable enrichment reply,
//!   nothing on the surface to export). Returned as `Err(CardError)` from
//!   the session, enrichment and export entry points.
//!
//! * [`ItemError`] is **non-fatal**: a single card of a batch export failed
//!   to capture but the remaining cards are fine. Collected in
//!   [`crate::output::ExportOutput::errors`] so a broken card never costs
//!   the user the whole archive.
//!
//! Every fatal error leaves the session state untouched: a failed
//! regeneration does not clear a batch that is already on screen.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the lexicard library.
///
/// Per-card failures during a batch export use [`ItemError`] and are stored
/// in [`crate::output::ExportOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CardError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The raw input is blank or yields no usable record / token.
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    // ── Enrichment errors ─────────────────────────────────────────────────
    /// The text-generation service could not be reached or is not configured
    /// (missing API key, network failure, timeout).
    #[error("Enrichment service '{provider}' is unavailable: {detail}")]
    ServiceUnavailable { provider: String, detail: String },

    /// The service answered, but not with a JSON array of word records.
    #[error("Enrichment reply could not be understood: {detail}")]
    MalformedResponse { detail: String },

    // ── Render / export errors ────────────────────────────────────────────
    /// The surface never became capturable or rasterisation failed.
    #[error("Card capture failed: {detail}")]
    CaptureFailed { detail: String },

    /// There is no displayable card to export.
    #[error("Nothing to export: generate a card first")]
    NothingToExport,

    /// Another export is still running on the shared surface.
    #[error("An export is already in progress; wait for it to finish")]
    ExportInProgress,

    /// The operation was cancelled through its [`crate::CancelToken`].
    #[error("Operation cancelled")]
    Cancelled,

    /// Packaging the captured cards into an archive failed.
    #[error("Failed to build archive: {0}")]
    ArchiveFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CardError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        CardError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn capture(detail: impl Into<String>) -> Self {
        CardError::CaptureFailed {
            detail: detail.into(),
        }
    }

    /// True for the two enrichment failures that share one user-facing message.
    pub fn is_enrichment_failure(&self) -> bool {
        matches!(
            self,
            CardError::ServiceUnavailable { .. } | CardError::MalformedResponse { .. }
        )
    }

    /// The message to show an end user.
    ///
    /// `ServiceUnavailable` and `MalformedResponse` collapse into a single
    /// message; the detailed variant is still available through `Display`
    /// for logs.
    pub fn user_message(&self) -> String {
        match self {
            CardError::ServiceUnavailable { .. } | CardError::MalformedResponse { .. } => {
                "Failed to generate word cards. Check your API key and network connection, \
then try again."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// A non-fatal error for a single card of a batch export.
///
/// The export skips the card and continues with the next one.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The surface never reported readiness for this card.
    #[error("Card {index} ('{term}'): surface not ready: {detail}")]
    NotReady {
        index: usize,
        term: String,
        detail: String,
    },

    /// Rasterisation of this card failed.
    #[error("Card {index} ('{term}'): capture failed: {detail}")]
    CaptureFailed {
        index: usize,
        term: String,
        detail: String,
    },
}

impl ItemError {
    /// 1-based position of the failed card in the batch.
    pub fn index(&self) -> usize {
        match self {
            ItemError::NotReady { index, .. } | ItemError::CaptureFailed { index, .. } => *index,
        }
    }
}
