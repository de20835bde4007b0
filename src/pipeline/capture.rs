//! Capture: wait for a specific present to land, then rasterise the card.
//!
//! ## Why wait on a token?
//!
//! The surface is shared. Between "present card 3" and "capture" another
//! present may already have been issued, so capture names the token it
//! expects and fails rather than photographing the wrong card.
//!
//! ## Why spawn_blocking?
//!
//! SVG parsing, text shaping and the resvg rasteriser are CPU-bound and take
//! tens of milliseconds for a 2× card. `tokio::task::spawn_blocking` keeps
//! them off the async worker threads.

use crate::cancel::CancelToken;
use crate::config::CardConfig;
use crate::error::CardError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::layout::card_scene;
use crate::pipeline::render::{Readiness, RenderSurfaceAdapter, SharedSurface, SurfaceContent};
use image::RgbaImage;
use std::path::Path;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// A rasterised card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCard {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns the surface into PNG bytes.
pub struct CaptureService {
    surface: SharedSurface,
    ready_rx: watch::Receiver<Readiness>,
    fontdb: Arc<usvg::fontdb::Database>,
    card_width: u32,
    scale: f32,
    stabilize: Duration,
}

impl CaptureService {
    /// Attach to `adapter`'s surface. Loads system fonts plus `config.font_dirs`.
    pub fn new(adapter: &RenderSurfaceAdapter, config: &CardConfig) -> Self {
        Self::with_fontdb(adapter, config, build_fontdb(&config.font_dirs))
    }

    /// Attach with an already populated font database.
    pub fn with_fontdb(
        adapter: &RenderSurfaceAdapter,
        config: &CardConfig,
        fontdb: Arc<usvg::fontdb::Database>,
    ) -> Self {
        Self {
            surface: adapter.shared_surface(),
            ready_rx: adapter.subscribe(),
            fontdb,
            card_width: config.card_width,
            scale: config.scale,
            stabilize: Duration::from_millis(config.stabilize_timeout_ms),
        }
    }

    /// Wait until the surface reports `token` as ready.
    ///
    /// Fails with `CaptureFailed` if the token is superseded, the surface was
    /// cleared, or nothing arrives within the stabilize timeout.
    pub async fn wait_ready(&self, token: u64, cancel: &CancelToken) -> Result<(), CardError> {
        let mut rx = self.ready_rx.clone();
        let wait = async move {
            rx.wait_for(|r| r.token >= token)
                .await
                .map(|r| *r)
                .map_err(|_| CardError::capture("render surface was dropped"))
        };

        let readiness = match cancel.run(tokio::time::timeout(self.stabilize, wait)).await? {
            Ok(r) => r?,
            Err(_) => {
                return Err(CardError::capture(format!(
                    "card #{token} not ready within {}ms",
                    self.stabilize.as_millis()
                )))
            }
        };

        if readiness.token != token {
            return Err(CardError::capture(format!(
                "card #{token} was replaced by #{} before capture",
                readiness.token
            )));
        }
        if !readiness.ready {
            return Err(CardError::capture("surface has nothing to capture"));
        }
        Ok(())
    }

    /// Wait for `token`, then rasterise the surface at the configured scale.
    pub async fn capture(&self, token: u64, cancel: &CancelToken) -> Result<CapturedCard, CardError> {
        self.wait_ready(token, cancel).await?;

        let content = self
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| CardError::capture("surface has nothing to capture"))?;
        if content.token != token {
            return Err(CardError::capture(format!(
                "surface shows card #{} instead of #{token}",
                content.token
            )));
        }

        let start = Instant::now();
        let fontdb = Arc::clone(&self.fontdb);
        let (width, scale) = (self.card_width, self.scale);
        let term = content.record.label().to_string();
        let card = cancel
            .run(tokio::task::spawn_blocking(move || {
                rasterize(&content, fontdb, width, scale)
            }))
            .await?
            .map_err(|e| CardError::Internal(format!("Capture task panicked: {e}")))??;

        info!(
            "Captured '{term}' → {}x{} px, {} bytes in {}ms",
            card.width,
            card.height,
            card.png.len(),
            start.elapsed().as_millis()
        );
        Ok(card)
    }
}

/// Lay out, parse, render and PNG-encode one card.
fn rasterize(
    content: &SurfaceContent,
    fontdb: Arc<usvg::fontdb::Database>,
    card_width: u32,
    scale: f32,
) -> Result<CapturedCard, CardError> {
    let scene = card_scene(&content.record, &content.background, card_width);
    let opts = usvg::Options {
        fontdb,
        font_resolver: font_resolver(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(&scene.svg, &opts)
        .map_err(|e| CardError::capture(format!("card layout rejected: {e}")))?;

    let width = (tree.size().width() * scale).ceil().max(1.0) as u32;
    let height = (tree.size().height() * scale).ceil().max(1.0) as u32;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| CardError::capture(format!("cannot allocate {width}x{height} pixmap")))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    // tiny-skia stores premultiplied alpha; PNG wants straight alpha.
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let img = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| CardError::capture("pixel buffer size mismatch"))?;
    let png = encode_png(&img).map_err(|e| CardError::capture(format!("PNG encoding: {e}")))?;
    debug!("Rasterised card #{} at {scale}×", content.token);

    Ok(CapturedCard { png, width, height })
}

/// System fonts plus every `.ttf`/`.otf`/`.ttc` in `dirs`.
pub fn build_fontdb(dirs: &[std::path::PathBuf]) -> Arc<usvg::fontdb::Database> {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    for dir in dirs {
        load_fonts_from_dir(&mut db, dir);
    }
    debug!("Font database: {} faces", db.len());
    Arc::new(db)
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        let is_font = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
            .unwrap_or(false);
        if path.is_file() && is_font {
            let _ = db.load_font_file(&path);
        }
    }
}

/// Like the default resolver, but never gives up: the generic families are
/// tried after the named ones and then any face at all, so a card without
/// KaiTi installed still shows its Chinese text.
fn font_resolver() -> usvg::FontResolver<'static> {
    use usvg::fontdb::{Family, Query, Stretch, Style, Weight};

    usvg::FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families: Vec<Family<'_>> = font
                .families()
                .iter()
                .map(|family| match family {
                    usvg::FontFamily::Serif => Family::Serif,
                    usvg::FontFamily::SansSerif => Family::SansSerif,
                    usvg::FontFamily::Cursive => Family::Cursive,
                    usvg::FontFamily::Fantasy => Family::Fantasy,
                    usvg::FontFamily::Monospace => Family::Monospace,
                    usvg::FontFamily::Named(s) => Family::Name(s),
                })
                .collect();
            families.push(Family::SansSerif);
            families.push(Family::Serif);

            let style = match font.style() {
                usvg::FontStyle::Normal => Style::Normal,
                usvg::FontStyle::Italic => Style::Italic,
                usvg::FontStyle::Oblique => Style::Oblique,
            };
            let query = Query {
                families: &families,
                weight: Weight(font.weight()),
                stretch: Stretch::Normal,
                style,
            };
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: usvg::FontResolver::default_fallback_selector(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{BackgroundError, BackgroundLoader, BackgroundSource};
    use crate::pipeline::render::RenderRequest;
    use crate::record::WordRecord;
    use futures::future::BoxFuture;

    struct NoBackgrounds;

    impl BackgroundLoader for NoBackgrounds {
        fn load<'a>(
            &'a self,
            source: &'a BackgroundSource,
        ) -> BoxFuture<'a, Result<Vec<u8>, BackgroundError>> {
            Box::pin(async move {
                Err(BackgroundError::Http {
                    url: source.to_string(),
                    reason: "offline".into(),
                })
            })
        }
    }

    fn setup(stabilize_ms: u64) -> (RenderSurfaceAdapter, CaptureService) {
        let config = CardConfig::builder()
            .stabilize_timeout_ms(stabilize_ms)
            .build()
            .unwrap();
        let adapter = RenderSurfaceAdapter::new(Arc::new(NoBackgrounds), &config);
        let capture =
            CaptureService::with_fontdb(&adapter, &config, Arc::new(usvg::fontdb::Database::new()));
        (adapter, capture)
    }

    fn apple() -> WordRecord {
        WordRecord {
            english_term: "apple".into(),
            phonetic_uk: "/ˈæp.əl/".into(),
            chinese_translation: "苹果".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn captures_at_double_scale() {
        let (adapter, capture) = setup(1000);
        let cancel = CancelToken::new();
        let out = adapter
            .present(RenderRequest::new(apple(), None), &cancel)
            .await
            .unwrap();
        let card = capture.capture(out.token(), &cancel).await.unwrap();
        assert_eq!(card.width, 1000);
        assert!(card.height >= 600);
        let img = image::load_from_memory(&card.png).unwrap();
        assert_eq!((img.width(), img.height()), (card.width, card.height));
    }

    #[tokio::test]
    async fn stale_token_fails() {
        let (adapter, capture) = setup(1000);
        let cancel = CancelToken::new();
        let first = adapter
            .present(RenderRequest::new(apple(), None), &cancel)
            .await
            .unwrap();
        adapter
            .present(RenderRequest::new(apple(), None), &cancel)
            .await
            .unwrap();
        let err = capture.capture(first.token(), &cancel).await.unwrap_err();
        assert!(matches!(err, CardError::CaptureFailed { .. }));
    }

    #[tokio::test]
    async fn cleared_surface_fails() {
        let (adapter, capture) = setup(1000);
        let cancel = CancelToken::new();
        let out = adapter
            .present(RenderRequest::hidden(), &cancel)
            .await
            .unwrap();
        let err = capture.capture(out.token(), &cancel).await.unwrap_err();
        assert!(matches!(err, CardError::CaptureFailed { .. }));
    }

    #[tokio::test]
    async fn never_presented_times_out() {
        let (_adapter, capture) = setup(30);
        let err = capture.wait_ready(5, &CancelToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }

    #[tokio::test]
    async fn cancelled_wait() {
        let (_adapter, capture) = setup(10_000);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = capture.wait_ready(1, &cancel).await.unwrap_err();
        assert!(matches!(err, CardError::Cancelled));
    }

    #[test]
    fn font_dir_scan_ignores_missing_dir() {
        let mut db = usvg::fontdb::Database::new();
        load_fonts_from_dir(&mut db, Path::new("/definitely/not/here"));
        assert_eq!(db.len(), 0);
    }
}
