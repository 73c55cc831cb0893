//! Folder manifests: the JSON lists of image folders consumed at startup.
//!
//! Two manifests drive playback: "main" (background) folders and "float"
//! (foreground) folders. Each folder carries either an explicit `image_list`
//! or an `image_pattern` + max index from which the list is generated.
//!
//! # Manifest format
//!
//! ```json
//! {
//!   "folders": [
//!     { "index": 1, "folder_rel": "images/01_sky",
//!       "image_list": ["images/01_sky/sky_0.webp", "..."] },
//!     { "folder_rel": "images/02_sea",
//!       "image_pattern": "sea.####.png", "max_file_index": 119 }
//!   ]
//! }
//! ```
//!
//! A `#` run in the pattern is the zero-padded index placeholder
//! (`sea.####.png` → `sea.0000.png` .. `sea.0119.png`).
//!
//! Manifest problems are fatal at startup: an animation loop with no images
//! has nothing to recover to.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest load/validation errors (all fatal at startup).
#[derive(Debug, Error)]
pub enum FolderError {
    #[error("failed to read manifest {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}: {}", path.display(), source)]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("manifest {} contains no folders", .0.display())]
    Empty(PathBuf),

    #[error("folder {0}: neither image_list nor image_pattern given")]
    NoImages(String),

    #[error("folder {0}: image_pattern {1:?} has no '#' index placeholder")]
    BadPattern(String, String),

    #[error("folder {0}: resolved image list is empty")]
    EmptyList(String),
}

/// One folder entry as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSpec {
    #[serde(default)]
    pub index: Option<u32>,
    pub folder_rel: String,
    #[serde(default)]
    pub image_list: Option<Vec<String>>,
    #[serde(default)]
    pub image_pattern: Option<String>,
    #[serde(default)]
    pub max_file_index: Option<u32>,
    #[serde(default)]
    pub max_index: Option<u32>,
}

/// Top-level manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub folders: Vec<FolderSpec>,
}

/// A resolved folder: relative root plus its ordered image paths.
#[derive(Debug, Clone)]
pub struct Folder {
    pub rel: String,
    pub images: Vec<PathBuf>,
}

impl Folder {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Expand a `#`-run pattern into `max_index + 1` zero-padded names.
/// Returns `None` when the pattern has no placeholder.
fn expand_pattern(pattern: &str, max_index: u32) -> Option<Vec<String>> {
    let start = pattern.find('#')?;
    let width = pattern[start..].chars().take_while(|c| *c == '#').count();
    let end = start + width;
    let mut names = Vec::with_capacity(max_index as usize + 1);
    for i in 0..=max_index {
        names.push(format!(
            "{}{:0width$}{}",
            &pattern[..start],
            i,
            &pattern[end..],
            width = width
        ));
    }
    Some(names)
}

impl Manifest {
    /// Load and resolve a manifest file into folders.
    pub fn load(path: &Path) -> Result<Vec<Folder>, FolderError> {
        let text = std::fs::read_to_string(path).map_err(|e| FolderError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| FolderError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if manifest.folders.is_empty() {
            return Err(FolderError::Empty(path.to_path_buf()));
        }
        manifest.resolve()
    }

    /// Resolve specs into folders: expand patterns, drop duplicate paths.
    pub fn resolve(self) -> Result<Vec<Folder>, FolderError> {
        let mut folders = Vec::with_capacity(self.folders.len());
        for spec in self.folders {
            let rel = spec.folder_rel.clone();

            // Explicit lists already carry the folder prefix; generated names don't.
            let raw: Vec<PathBuf> = if let Some(list) = spec.image_list {
                list.into_iter().map(PathBuf::from).collect()
            } else if let Some(pattern) = spec.image_pattern {
                let max = spec
                    .max_file_index
                    .or(spec.max_index)
                    .ok_or_else(|| FolderError::NoImages(rel.clone()))?;
                let names = expand_pattern(&pattern, max)
                    .ok_or_else(|| FolderError::BadPattern(rel.clone(), pattern.clone()))?;
                names
                    .into_iter()
                    .map(|n| Path::new(&rel).join(n))
                    .collect()
            } else {
                return Err(FolderError::NoImages(rel));
            };

            let mut seen = HashSet::new();
            let images: Vec<PathBuf> = raw.into_iter().filter(|p| seen.insert(p.clone())).collect();
            if images.is_empty() {
                return Err(FolderError::EmptyList(rel));
            }
            folders.push(Folder { rel, images });
        }
        Ok(folders)
    }
}

/// The two folder groups playback draws from.
#[derive(Debug, Clone)]
pub struct FolderSet {
    /// Background folders.
    pub main: Vec<Folder>,
    /// Foreground (overlay) folders.
    pub float: Vec<Folder>,
}

impl FolderSet {
    /// Load both manifests. Fails fast on any manifest problem.
    pub fn load(main_manifest: &Path, float_manifest: &Path) -> Result<Self, FolderError> {
        let main = Manifest::load(main_manifest)?;
        let float = Manifest::load(float_manifest)?;
        info!(
            "loaded {} main folder(s), {} float folder(s)",
            main.len(),
            float.len()
        );
        let set = Self { main, float };
        if let Some(longest) = set.max_len().checked_sub(1) {
            info!("longest image list: {} images", longest + 1);
        }
        Ok(set)
    }

    pub fn from_parts(main: Vec<Folder>, float: Vec<Folder>) -> Self {
        if main.is_empty() || float.is_empty() {
            warn!("folder set constructed with an empty group");
        }
        Self { main, float }
    }

    pub fn main_count(&self) -> usize {
        self.main.len()
    }

    pub fn float_count(&self) -> usize {
        self.float.len()
    }

    /// Length of the longest image list across both groups; drives the
    /// frame driver's cycle length.
    pub fn max_len(&self) -> usize {
        self.main
            .iter()
            .chain(self.float.iter())
            .map(Folder::len)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_pattern_zero_padded() {
        let names = expand_pattern("sea.####.png", 2).unwrap();
        assert_eq!(names, vec!["sea.0000.png", "sea.0001.png", "sea.0002.png"]);
    }

    #[test]
    fn test_expand_pattern_single_hash() {
        let names = expand_pattern("img_#.webp", 10).unwrap();
        assert_eq!(names[0], "img_0.webp");
        assert_eq!(names[10], "img_10.webp");
    }

    #[test]
    fn test_expand_pattern_without_placeholder() {
        assert!(expand_pattern("static.png", 3).is_none());
    }

    #[test]
    fn test_resolve_explicit_list_dedupes() {
        let manifest = Manifest {
            folders: vec![FolderSpec {
                index: Some(1),
                folder_rel: "images/sky".into(),
                image_list: Some(vec![
                    "images/sky/a.png".into(),
                    "images/sky/b.png".into(),
                    "images/sky/a.png".into(),
                ]),
                image_pattern: None,
                max_file_index: None,
                max_index: None,
            }],
        };
        let folders = manifest.resolve().unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].len(), 2);
        assert_eq!(folders[0].images[0], PathBuf::from("images/sky/a.png"));
    }

    #[test]
    fn test_resolve_pattern_joins_folder_rel() {
        let manifest = Manifest {
            folders: vec![FolderSpec {
                index: None,
                folder_rel: "images/sea".into(),
                image_list: None,
                image_pattern: Some("sea.##.webp".into()),
                max_file_index: Some(1),
                max_index: None,
            }],
        };
        let folders = manifest.resolve().unwrap();
        assert_eq!(folders[0].images[0], PathBuf::from("images/sea/sea.00.webp"));
        assert_eq!(folders[0].images[1], PathBuf::from("images/sea/sea.01.webp"));
    }

    #[test]
    fn test_resolve_rejects_folder_without_images() {
        let manifest = Manifest {
            folders: vec![FolderSpec {
                index: None,
                folder_rel: "images/empty".into(),
                image_list: None,
                image_pattern: None,
                max_file_index: None,
                max_index: None,
            }],
        };
        assert!(matches!(
            manifest.resolve(),
            Err(FolderError::NoImages(_))
        ));
    }

    #[test]
    fn test_parse_manifest_json() {
        let json = r#"{
            "folders": [
                { "index": 1, "folder_rel": "images/01",
                  "image_list": ["images/01/a.webp"] }
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let folders = manifest.resolve().unwrap();
        assert_eq!(folders[0].rel, "images/01");
    }

    #[test]
    fn test_max_len_spans_both_groups() {
        let set = FolderSet::from_parts(
            vec![Folder {
                rel: "a".into(),
                images: vec![PathBuf::from("a/0.png"), PathBuf::from("a/1.png")],
            }],
            vec![Folder {
                rel: "b".into(),
                images: vec![
                    PathBuf::from("b/0.png"),
                    PathBuf::from("b/1.png"),
                    PathBuf::from("b/2.png"),
                ],
            }],
        );
        assert_eq!(set.max_len(), 3);
    }
}
