//! The render surface: binds a record and a background onto the card and
//! announces when the result may be captured.
//!
//! ## Request tokens
//!
//! Every [`RenderSurfaceAdapter::present`] call takes the next value of a
//! generation counter. Background loads are slow and may finish out of
//! order, so a completion is only applied if its token is still the latest
//! one; otherwise it is dropped without touching the surface or publishing
//! readiness. Last write wins.
//!
//! ## Readiness
//!
//! Completed presents publish a [`Readiness`] on a `tokio::sync::watch`
//! channel. The capture service waits for its own token there instead of
//! sleeping for a fixed delay.

use crate::assets::{BackgroundError, BackgroundLoader, BackgroundSource, DefaultLoader};
use crate::cancel::CancelToken;
use crate::config::CardConfig;
use crate::error::CardError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::layout::{BackgroundImage, CardBackground};
use crate::record::WordRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Longest edge of a background after decoding. The card is at most
/// 1200 CSS px wide, so anything larger is wasted work for the rasteriser.
const MAX_BACKGROUND_EDGE: u32 = 1600;

/// What to show on the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub record: WordRecord,
    pub background: Option<BackgroundSource>,
    pub visible: bool,
}

impl RenderRequest {
    pub fn new(record: WordRecord, background: Option<BackgroundSource>) -> Self {
        Self {
            record,
            background,
            visible: true,
        }
    }

    /// A request that clears the surface.
    pub fn hidden() -> Self {
        Self {
            record: WordRecord::default(),
            background: None,
            visible: false,
        }
    }
}

/// Published after each applied present. `ready` is false for a cleared surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub ready: bool,
}

/// Result of [`RenderSurfaceAdapter::present`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The card is on the surface and may be captured.
    Ready(u64),
    /// The surface was cleared: hidden request or nothing to display.
    NotCapturable(u64),
    /// A newer present finished first; this one was discarded.
    Superseded(u64),
}

impl PresentOutcome {
    pub fn token(&self) -> u64 {
        match *self {
            PresentOutcome::Ready(t)
            | PresentOutcome::NotCapturable(t)
            | PresentOutcome::Superseded(t) => t,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PresentOutcome::Ready(_))
    }
}

/// The card currently bound to the surface.
#[derive(Debug, Clone)]
pub struct SurfaceContent {
    pub token: u64,
    pub record: WordRecord,
    pub background: CardBackground,
}

pub(crate) type SharedSurface = Arc<Mutex<Option<SurfaceContent>>>;

/// Drives the shared card surface.
pub struct RenderSurfaceAdapter {
    surface: SharedSurface,
    loader: Arc<dyn BackgroundLoader>,
    fallback: Option<BackgroundSource>,
    latest: AtomicU64,
    ready_tx: watch::Sender<Readiness>,
    current_request: Mutex<Option<RenderRequest>>,
}

impl RenderSurfaceAdapter {
    pub fn new(loader: Arc<dyn BackgroundLoader>, config: &CardConfig) -> Self {
        let fallback = Some(config.fallback_background.trim())
            .filter(|s| !s.is_empty())
            .map(BackgroundSource::parse);
        let (ready_tx, _) = watch::channel(Readiness {
            token: 0,
            ready: false,
        });
        Self {
            surface: Arc::new(Mutex::new(None)),
            loader,
            fallback,
            latest: AtomicU64::new(0),
            ready_tx,
            current_request: Mutex::new(None),
        }
    }

    /// Adapter with the file/HTTP loader.
    pub fn from_config(config: &CardConfig) -> Result<Self, CardError> {
        let loader = DefaultLoader::new(config.background_timeout_secs)?;
        Ok(Self::new(Arc::new(loader), config))
    }

    /// Bind `request` to the surface.
    ///
    /// The background is loaded and decoded first; if it fails the fallback
    /// URL is tried, then a flat placeholder is used. Readiness is true in
    /// all three cases. Cancellation during the load leaves the surface
    /// untouched.
    pub async fn present(
        &self,
        request: RenderRequest,
        cancel: &CancelToken,
    ) -> Result<PresentOutcome, CardError> {
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        if !request.visible || !request.record.is_displayable() {
            debug!("present #{token}: nothing to display, clearing surface");
            return Ok(self.apply(token, request, None));
        }

        let background = cancel
            .run(self.load_background(request.background.as_ref()))
            .await?;
        let content = SurfaceContent {
            token,
            record: request.record.clone(),
            background,
        };
        Ok(self.apply(token, request, Some(content)))
    }

    /// Subscribe to readiness announcements.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.ready_tx.subscribe()
    }

    /// The request behind what the surface shows now: the last present that
    /// was applied. Cancelled and superseded presents do not count.
    pub fn current_request(&self) -> Option<RenderRequest> {
        self.current_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A copy of what is on the surface right now.
    pub fn snapshot(&self) -> Option<SurfaceContent> {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token of the newest present call, applied or not.
    pub fn latest_token(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub(crate) fn shared_surface(&self) -> SharedSurface {
        Arc::clone(&self.surface)
    }

    fn apply(
        &self,
        token: u64,
        request: RenderRequest,
        content: Option<SurfaceContent>,
    ) -> PresentOutcome {
        let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
        if self.latest.load(Ordering::SeqCst) != token {
            debug!("present #{token}: superseded, discarding");
            return PresentOutcome::Superseded(token);
        }
        let ready = content.is_some();
        *surface = content;
        *self
            .current_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);
        self.ready_tx.send_replace(Readiness { token, ready });
        if ready {
            PresentOutcome::Ready(token)
        } else {
            PresentOutcome::NotCapturable(token)
        }
    }

    async fn load_background(&self, selected: Option<&BackgroundSource>) -> CardBackground {
        if let Some(source) = selected {
            match self.load_and_decode(source).await {
                Ok(img) => return CardBackground::Image(Arc::new(img)),
                Err(e) => warn!("Background '{source}' unavailable: {e}"),
            }
        }
        if let Some(ref fallback) = self.fallback {
            match self.load_and_decode(fallback).await {
                Ok(img) => return CardBackground::Image(Arc::new(img)),
                Err(e) => warn!("Fallback background unavailable: {e}"),
            }
        }
        CardBackground::Placeholder
    }

    async fn load_and_decode(
        &self,
        source: &BackgroundSource,
    ) -> Result<BackgroundImage, BackgroundError> {
        let bytes = self.loader.load(source).await?;
        tokio::task::spawn_blocking(move || decode_background(&bytes))
            .await
            .map_err(|e| BackgroundError::Decode(format!("decode task panicked: {e}")))?
    }
}

/// Decode any supported image, shrink it to [`MAX_BACKGROUND_EDGE`] and
/// re-encode it as PNG for embedding in the card.
fn decode_background(bytes: &[u8]) -> Result<BackgroundImage, BackgroundError> {
    let img = image::load_from_memory(bytes).map_err(|e| BackgroundError::Decode(e.to_string()))?;
    let img = if img.width() > MAX_BACKGROUND_EDGE || img.height() > MAX_BACKGROUND_EDGE {
        img.thumbnail(MAX_BACKGROUND_EDGE, MAX_BACKGROUND_EDGE)
    } else {
        img
    };
    let rgba = img.to_rgba8();
    let png = encode_png(&rgba).map_err(|e| BackgroundError::Decode(e.to_string()))?;
    Ok(BackgroundImage {
        png,
        width: rgba.width(),
        height: rgba.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use image::{Rgba, RgbaImage};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves PNGs from memory, with an optional per-source delay.
    struct MemoryLoader {
        files: HashMap<String, (Vec<u8>, u64)>,
    }

    impl MemoryLoader {
        fn new(entries: &[(&str, Option<Vec<u8>>, u64)]) -> Self {
            let files = entries
                .iter()
                .filter_map(|(k, v, d)| v.clone().map(|v| (k.to_string(), (v, *d))))
                .collect();
            Self { files }
        }
    }

    impl BackgroundLoader for MemoryLoader {
        fn load<'a>(
            &'a self,
            source: &'a BackgroundSource,
        ) -> BoxFuture<'a, Result<Vec<u8>, BackgroundError>> {
            Box::pin(async move {
                let key = source.to_string();
                match self.files.get(&key) {
                    Some((bytes, delay)) => {
                        tokio::time::sleep(Duration::from_millis(*delay)).await;
                        Ok(bytes.clone())
                    }
                    None => Err(BackgroundError::Http {
                        url: key,
                        reason: "HTTP 404".into(),
                    }),
                }
            })
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(w, h, Rgba([10, 120, 40, 255]))).unwrap()
    }

    fn word(term: &str) -> WordRecord {
        WordRecord {
            english_term: term.into(),
            ..Default::default()
        }
    }

    fn adapter(loader: MemoryLoader) -> RenderSurfaceAdapter {
        let config = CardConfig::builder()
            .fallback_background("https://fallback.test/bg.png")
            .build()
            .unwrap();
        RenderSurfaceAdapter::new(Arc::new(loader), &config)
    }

    fn remote(url: &str) -> Option<BackgroundSource> {
        Some(BackgroundSource::Remote(url.into()))
    }

    #[tokio::test]
    async fn tokens_increase_and_readiness_is_published() {
        let a = adapter(MemoryLoader::new(&[("https://x.test/a.png", Some(png(4, 3)), 0)]));
        let rx = a.subscribe();
        let cancel = CancelToken::new();

        let first = a
            .present(RenderRequest::new(word("apple"), remote("https://x.test/a.png")), &cancel)
            .await
            .unwrap();
        let second = a
            .present(RenderRequest::new(word("kiwi"), remote("https://x.test/a.png")), &cancel)
            .await
            .unwrap();
        assert_eq!(first, PresentOutcome::Ready(1));
        assert_eq!(second, PresentOutcome::Ready(2));
        assert_eq!(*rx.borrow(), Readiness { token: 2, ready: true });

        let content = a.snapshot().unwrap();
        assert_eq!(content.token, 2);
        assert_eq!(content.record.english_term, "kiwi");
        match content.background {
            CardBackground::Image(img) => assert_eq!((img.width, img.height), (4, 3)),
            CardBackground::Placeholder => panic!("expected image background"),
        }
    }

    #[tokio::test]
    async fn hidden_or_blank_clears_surface() {
        let a = adapter(MemoryLoader::new(&[]));
        let cancel = CancelToken::new();
        a.present(RenderRequest::new(word("apple"), None), &cancel)
            .await
            .unwrap();
        assert!(a.snapshot().is_some());

        let out = a.present(RenderRequest::hidden(), &cancel).await.unwrap();
        assert_eq!(out, PresentOutcome::NotCapturable(2));
        assert!(a.snapshot().is_none());
        assert_eq!(*a.subscribe().borrow(), Readiness { token: 2, ready: false });

        let out = a
            .present(RenderRequest::new(word("   "), None), &cancel)
            .await
            .unwrap();
        assert_eq!(out, PresentOutcome::NotCapturable(3));
    }

    #[tokio::test]
    async fn failed_background_uses_fallback_then_placeholder() {
        let a = adapter(MemoryLoader::new(&[(
            "https://fallback.test/bg.png",
            Some(png(2, 2)),
            0,
        )]));
        let cancel = CancelToken::new();
        let out = a
            .present(RenderRequest::new(word("apple"), remote("https://x.test/gone.png")), &cancel)
            .await
            .unwrap();
        assert!(out.is_ready());
        assert!(matches!(a.snapshot().unwrap().background, CardBackground::Image(_)));

        let a = adapter(MemoryLoader::new(&[(
            "https://x.test/garbage.png",
            Some(b"not an image".to_vec()),
            0,
        )]));
        let out = a
            .present(
                RenderRequest::new(word("apple"), remote("https://x.test/garbage.png")),
                &cancel,
            )
            .await
            .unwrap();
        assert!(out.is_ready());
        assert!(matches!(a.snapshot().unwrap().background, CardBackground::Placeholder));
    }

    #[tokio::test]
    async fn slow_present_is_superseded() {
        let a = Arc::new(adapter(MemoryLoader::new(&[
            ("https://x.test/slow.png", Some(png(2, 2)), 150),
            ("https://x.test/fast.png", Some(png(3, 3)), 0),
        ])));
        let cancel = CancelToken::new();

        let slow = {
            let a = Arc::clone(&a);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                a.present(RenderRequest::new(word("old"), remote("https://x.test/slow.png")), &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = a
            .present(RenderRequest::new(word("new"), remote("https://x.test/fast.png")), &cancel)
            .await
            .unwrap();
        let slow = slow.await.unwrap().unwrap();

        assert_eq!(fast, PresentOutcome::Ready(2));
        assert_eq!(slow, PresentOutcome::Superseded(1));
        assert_eq!(a.snapshot().unwrap().record.english_term, "new");
        assert_eq!(*a.subscribe().borrow(), Readiness { token: 2, ready: true });
        assert_eq!(a.current_request().unwrap().record.english_term, "new");
    }

    #[tokio::test]
    async fn cancelled_present_leaves_surface() {
        let a = adapter(MemoryLoader::new(&[("https://x.test/a.png", Some(png(2, 2)), 0)]));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = a
            .present(RenderRequest::new(word("apple"), remote("https://x.test/a.png")), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::Cancelled));
        assert!(a.snapshot().is_none());
        assert!(a.current_request().is_none());
    }

    #[test]
    fn large_background_is_shrunk() {
        let img = decode_background(&png(3200, 800)).unwrap();
        assert_eq!(img.width, MAX_BACKGROUND_EDGE);
        assert_eq!(img.height, 400);
    }
}
