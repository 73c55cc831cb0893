//! Entities: folders, decoded image handles, and the raw image source.

pub mod folder;
pub mod loader;
pub mod pair;

pub use folder::{Folder, FolderError, FolderSet, FolderSpec, Manifest};
pub use loader::{FsLoader, ImageSource, LoadError};
pub use pair::{ImageHandle, ImagePair};
