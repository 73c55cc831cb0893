//! Raw image loading behind the `ImageSource` trait.
//!
//! The prefetch cache treats image loading as an opaque asynchronous call, so
//! the loader is a trait object: production code uses `FsLoader` (filesystem +
//! `image` crate decode with bounded retry), tests inject counting/failing
//! stubs to exercise concurrency and all-or-nothing semantics.

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::entities::pair::ImageHandle;

/// Delay between retry attempts on a failed decode.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Image load/decode errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to decode {}: {}", path.display(), source)]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Fetch + decode one image path into a displayable bitmap.
///
/// Implementations handle their own retry/backoff; callers issue a single
/// call per image and treat any `Err` as "this half failed".
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<ImageHandle, LoadError>;
}

/// Filesystem loader: decodes via the `image` crate, retries transient
/// failures a bounded number of times.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
    retries: u32,
}

impl FsLoader {
    /// Loader rooted at `root`; manifest paths are resolved relative to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retries: 2,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl ImageSource for FsLoader {
    fn load(&self, path: &Path) -> Result<ImageHandle, LoadError> {
        let full = self.root.join(path);
        let mut attempt = 0;
        loop {
            match image::open(&full) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    let (width, height) = rgba.dimensions();
                    debug!("loaded {} ({}x{})", full.display(), width, height);
                    return Ok(ImageHandle::from_rgba8(rgba.into_raw(), width, height));
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "load failed for {} (attempt {}/{}): {}",
                        full.display(),
                        attempt,
                        self.retries,
                        e
                    );
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => {
                    return Err(LoadError::Decode {
                        path: full,
                        source: e,
                    });
                }
            }
        }
    }
}
