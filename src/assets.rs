//! Background images: the pool to pick from and the loader that fetches them.
//!
//! A background is either a file on disk or an HTTP(S) URL. The pool is a
//! fixed list chosen uniformly at random for each new card and each
//! "change background" action; the loader turns a source into bytes and
//! is a trait so tests can feed images from memory.

use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::CardError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Where a background image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackgroundSource {
    Local(PathBuf),
    Remote(String),
}

impl BackgroundSource {
    /// `http://` and `https://` become [`BackgroundSource::Remote`], anything else a path.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            BackgroundSource::Remote(s.to_string())
        } else {
            BackgroundSource::Local(PathBuf::from(s))
        }
    }
}

impl fmt::Display for BackgroundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundSource::Local(p) => write!(f, "{}", p.display()),
            BackgroundSource::Remote(u) => f.write_str(u),
        }
    }
}

/// Why a background could not be loaded. Never fatal: the surface falls
/// back to the placeholder.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch '{url}': {reason}")]
    Http { url: String, reason: String },

    #[error("cannot decode background: {0}")]
    Decode(String),
}

/// Fetches the raw bytes of a background.
pub trait BackgroundLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        source: &'a BackgroundSource,
    ) -> BoxFuture<'a, Result<Vec<u8>, BackgroundError>>;
}

/// Reads local files with `tokio::fs` and remote URLs with `reqwest`.
pub struct DefaultLoader {
    client: reqwest::Client,
}

impl DefaultLoader {
    pub fn new(timeout_secs: u64) -> Result<Self, CardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| CardError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl BackgroundLoader for DefaultLoader {
    fn load<'a>(
        &'a self,
        source: &'a BackgroundSource,
    ) -> BoxFuture<'a, Result<Vec<u8>, BackgroundError>> {
        Box::pin(async move {
            match source {
                BackgroundSource::Local(path) => {
                    tokio::fs::read(path)
                        .await
                        .map_err(|e| BackgroundError::Io {
                            path: path.clone(),
                            source: e,
                        })
                }
                BackgroundSource::Remote(url) => {
                    let http_err = |reason: String| BackgroundError::Http {
                        url: url.clone(),
                        reason,
                    };
                    let response = self
                        .client
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| http_err(e.to_string()))?;
                    if !response.status().is_success() {
                        return Err(http_err(format!("HTTP {}", response.status())));
                    }
                    let bytes = response.bytes().await.map_err(|e| http_err(e.to_string()))?;
                    Ok(bytes.to_vec())
                }
            }
        })
    }
}

/// The fixed set of backgrounds to choose from.
#[derive(Debug, Clone, Default)]
pub struct BackgroundPool {
    sources: Vec<BackgroundSource>,
}

impl BackgroundPool {
    pub fn new(sources: Vec<BackgroundSource>) -> Self {
        Self { sources }
    }

    /// Every image file directly inside `dir`, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self, CardError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CardError::InvalidConfig(format!(
                "cannot read background directory '{}': {e}",
                dir.display()
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();
        debug!("Background pool: {} images in {}", paths.len(), dir.display());

        Ok(Self::new(
            paths.into_iter().map(BackgroundSource::Local).collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[BackgroundSource] {
        &self.sources
    }

    /// Uniform pick with a caller-supplied RNG.
    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<BackgroundSource> {
        self.sources.choose(rng).cloned()
    }

    /// Uniform pick with the thread RNG. `None` for an empty pool.
    pub fn pick(&self) -> Option<BackgroundSource> {
        self.pick_with(&mut rand::thread_rng())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parse_source() {
        assert_eq!(
            BackgroundSource::parse("https://x.test/a.jpg"),
            BackgroundSource::Remote("https://x.test/a.jpg".into())
        );
        assert_eq!(
            BackgroundSource::parse("assets/File 1.jpg"),
            BackgroundSource::Local(PathBuf::from("assets/File 1.jpg"))
        );
    }

    #[test]
    fn from_dir_keeps_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.png", "notes.txt", "c.webp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let pool = BackgroundPool::from_dir(dir.path()).unwrap();
        let names: Vec<String> = pool
            .sources()
            .iter()
            .map(|s| match s {
                BackgroundSource::Local(p) => p.file_name().unwrap().to_string_lossy().into_owned(),
                BackgroundSource::Remote(u) => u.clone(),
            })
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.webp"]);
    }

    #[test]
    fn from_missing_dir_is_config_error() {
        let err = BackgroundPool::from_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CardError::InvalidConfig(_)));
    }

    #[test]
    fn pick_covers_pool() {
        let pool = BackgroundPool::new(
            (0..4)
                .map(|i| BackgroundSource::Remote(format!("https://x.test/{i}")))
                .collect(),
        );
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.pick_with(&mut rng).unwrap());
        }
        assert_eq!(seen.len(), 4);
        assert!(BackgroundPool::default().pick().is_none());
    }

    #[tokio::test]
    async fn default_loader_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        std::fs::write(&path, b"bytes").unwrap();
        let loader = DefaultLoader::new(5).unwrap();
        let bytes = loader.load(&BackgroundSource::Local(path)).await.unwrap();
        assert_eq!(bytes, b"bytes");

        let missing = loader
            .load(&BackgroundSource::Local(dir.path().join("gone.png")))
            .await;
        assert!(matches!(missing, Err(BackgroundError::Io { .. })));
    }
}
