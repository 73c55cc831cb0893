//! Position to file path resolution.
//!
//! Folders have different lengths, so the monotonic position is folded into
//! each folder's own range independently: ping-pong reflects over
//! `2 * len`, wrap takes `pos % len`. A folder shorter than the longest one
//! therefore completes more of its own cycles per driver cycle, and both
//! layers stay time-synchronized without index clamping artifacts.
//!
//! Resolution is a pure function of its inputs; the prefetch cache calls it
//! for future positions and gets exactly the paths the playhead will ask
//! for.

use std::path::PathBuf;

use crate::core::driver::LoopMode;
use crate::core::selector::FolderPair;
use crate::entities::{Folder, FolderSet};

/// Resolved file paths for one display tick. A missing half means the
/// selected folder index was out of range or the folder was empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairPaths {
    pub main: Option<PathBuf>,
    pub float: Option<PathBuf>,
}

impl PairPaths {
    pub fn complete(&self) -> bool {
        self.main.is_some() && self.float.is_some()
    }
}

/// Fold a monotonic position into `[0, len)` for one folder.
fn fold_position(pos: i64, len: usize, mode: LoopMode) -> usize {
    let len = len as i64;
    match mode {
        LoopMode::PingPong => {
            if len == 1 {
                return 0;
            }
            let cycle = 2 * len;
            let raw = pos.rem_euclid(cycle);
            if raw < len { raw as usize } else { (cycle - raw - 1) as usize }
        }
        LoopMode::Wrap => pos.rem_euclid(len) as usize,
    }
}

fn path_in(folder: Option<&Folder>, pos: i64, mode: LoopMode) -> Option<PathBuf> {
    let folder = folder?;
    if folder.is_empty() {
        return None;
    }
    let idx = fold_position(pos, folder.len(), mode);
    folder.images.get(idx).cloned()
}

/// Map (position, active folder pair) to the two image paths.
pub fn resolve(pos: i64, pair: FolderPair, folders: &FolderSet, mode: LoopMode) -> PairPaths {
    PairPaths {
        main: path_in(folders.main.get(pair.main), pos, mode),
        float: path_in(folders.float.get(pair.float), pos, mode),
    }
}
