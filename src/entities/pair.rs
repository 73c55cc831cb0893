//! Decoded image handles and the all-or-nothing image pair.
//!
//! Handles are `Arc`-shared: cloning a cached pair for rendering is cheap,
//! and the same decoded bitmap can sit in the cache and in the renderer's
//! "last good frame" slot without duplication.

use std::sync::Arc;

/// Immutable decoded bitmap (RGBA8).
#[derive(Debug, Clone)]
pub struct ImageHandle {
    data: Arc<ImageData>,
}

#[derive(Debug)]
struct ImageData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageHandle {
    /// Wrap a decoded RGBA8 buffer.
    pub fn from_rgba8(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::new(ImageData {
                pixels,
                width,
                height,
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn height(&self) -> u32 {
        self.data.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data.pixels
    }

    /// Memory size in bytes.
    pub fn mem(&self) -> usize {
        self.data.pixels.len()
    }
}

/// A frame's two decoded halves: `main` (background) and `float` (foreground).
///
/// A pair only exists when both halves decoded successfully; a single-side
/// failure never produces a pair.
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub main: ImageHandle,
    pub float: ImageHandle,
}

impl ImagePair {
    /// Combined memory size in bytes.
    pub fn mem(&self) -> usize {
        self.main.mem() + self.float.mem()
    }
}
