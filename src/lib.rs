//! # Shutterscout (library root)
//!
//! This crate provides the core plumbing for the **Shutterscout** CLI and library:
//! - Photo corpus acquisition (`corpus`).
//! - CLIP embedding provider and index construction (`encoder`, `index`).
//! - Brute-force cosine retrieval over the consolidated index (`search`).
//! - Multimodal LLM re-ranking of retrieved candidates (`judge`).
//! - End-to-end query orchestration (`assistant`).
//! - CLI parsing & configuration (`commands`, `config`).
//!
//! In addition, this module exposes utilities for:
//! - Discovering the per-platform configuration directory ([`config_dir`]).
//! - Resolving the on-disk layout of a dataset version ([`DatasetPaths`]).
//!
//! ## Dataset layout
//! Every dataset version (e.g. `lite`, `full`) lives under its own directory:
//!
//! ```text
//! <data_dir>/<version>/photos.tsv000        # manifest: photo_id ↔ source URL
//! <data_dir>/<version>/photos/<id>.jpg      # downloaded photos
//! <data_dir>/<version>/features/NNNN.npy    # per-batch embedding shards
//! <data_dir>/<version>/features/NNNN.csv    # per-batch photo ID shards
//! <data_dir>/<version>/features/features.npy    # consolidated N×D matrix
//! <data_dir>/<version>/features/photo_ids.csv   # consolidated ID list
//! ```
//!
//! The consolidated pair is the only artifact the retriever reads; row `i` of
//! `features.npy` always corresponds to row `i` of `photo_ids.csv`.
//!
//! ## Modules
//! - [`assistant`], [`commands`], [`config`], [`corpus`], [`encoder`],
//!   [`index`], [`judge`], [`search`]

use directories::ProjectDirs;
use std::error::Error;
use std::path::{Path, PathBuf};

pub mod assistant;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod encoder;
pub mod index;
pub mod judge;
pub mod search;

/// Return the per-platform configuration directory used by Shutterscout.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "shutterscout", "scout")`, so you get the right place on each OS
/// (e.g., `~/.config/scout` on Linux under XDG).
///
/// The directory is **not** created by this function; callers that need it
/// should create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be
/// determined (rare, but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "shutterscout", "scout")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Filename of the consolidated feature matrix.
pub const FEATURES_FILE: &str = "features.npy";
/// Filename of the consolidated photo ID list.
pub const PHOTO_IDS_FILE: &str = "photo_ids.csv";

/// On-disk locations for a single dataset version.
///
/// Constructed from the configured data directory and version name; every
/// component resolves its paths through this so the layout is defined once.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    root: PathBuf,
}

impl DatasetPaths {
    /// Resolve the layout for `version` under `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, version: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(version),
        }
    }

    /// The version's root directory, e.g. `data/lite`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The photo manifest shipped with the dataset.
    pub fn manifest(&self) -> PathBuf {
        self.root.join("photos.tsv000")
    }

    /// Directory of downloaded photos.
    pub fn photos_dir(&self) -> PathBuf {
        self.root.join("photos")
    }

    /// Local path of a single photo.
    pub fn photo(&self, photo_id: &str) -> PathBuf {
        self.photos_dir().join(format!("{photo_id}.jpg"))
    }

    /// Directory holding embedding shards and the consolidated artifacts.
    pub fn features_dir(&self) -> PathBuf {
        self.root.join("features")
    }

    /// The consolidated N×D feature matrix.
    pub fn features_file(&self) -> PathBuf {
        self.features_dir().join(FEATURES_FILE)
    }

    /// The consolidated photo ID list, parallel to [`features_file`](Self::features_file).
    pub fn photo_ids_file(&self) -> PathBuf {
        self.features_dir().join(PHOTO_IDS_FILE)
    }

    /// True once the consolidated index pair exists on disk.
    pub fn index_ready(&self) -> bool {
        self.features_file().is_file() && self.photo_ids_file().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_paths_layout() {
        let paths = DatasetPaths::new("data", "lite");
        assert_eq!(paths.manifest(), PathBuf::from("data/lite/photos.tsv000"));
        assert_eq!(
            paths.photo("abc123"),
            PathBuf::from("data/lite/photos/abc123.jpg")
        );
        assert_eq!(
            paths.features_file(),
            PathBuf::from("data/lite/features/features.npy")
        );
        assert_eq!(
            paths.photo_ids_file(),
            PathBuf::from("data/lite/features/photo_ids.csv")
        );
        assert!(!paths.index_ready());
    }
}
