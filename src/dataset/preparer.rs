//! Dataset preparation: scan, patch or pad, and cache.

use super::container::{ArchiveKind, PatchArchive};
use crate::core::config::PatchConfig;
use crate::core::errors::{FusionError, FusionResult};
use crate::processors::{PatchExtractor, PatchPair};
use crate::utils::{discover_images, load_gray_images_batch};
use rayon::prelude::*;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Builds [`PatchArchive`]s from image directories and caches them on disk.
///
/// Caches live under `cache_root/<source dir path>/`, one file per
/// [`ArchiveKind`]. An existing cache is reused only when it was built with the
/// same kind and patch geometry; anything else is rebuilt in place.
#[derive(Debug, Clone)]
pub struct DatasetPreparer {
    extractor: PatchExtractor,
    cache_root: PathBuf,
}

impl DatasetPreparer {
    pub fn new(geometry: PatchConfig, cache_root: impl Into<PathBuf>) -> FusionResult<Self> {
        Ok(Self {
            extractor: PatchExtractor::new(geometry)?,
            cache_root: cache_root.into(),
        })
    }

    pub fn geometry(&self) -> &PatchConfig {
        self.extractor.config()
    }

    /// Location of the cache for `source_dir` and `kind`.
    ///
    /// The whole source path is mirrored below the cache root, so directories
    /// that share a leaf name (`ir/train`, `vi/train`) never share a cache.
    pub fn cache_path(&self, source_dir: &Path, kind: ArchiveKind) -> PathBuf {
        self.cache_root
            .join(cache_key(source_dir))
            .join(kind.cache_file())
    }

    /// Returns the prepared samples for `source_dir`, from cache when possible.
    pub fn prepare(&self, source_dir: &Path, kind: ArchiveKind) -> FusionResult<PatchArchive> {
        let cache = self.cache_path(source_dir, kind);
        if cache.exists() {
            match PatchArchive::load(&cache) {
                Ok(archive) if archive.matches(kind, self.geometry()) => {
                    info!(
                        "Reusing cached {} set for {} ({} samples)",
                        kind,
                        source_dir.display(),
                        archive.len()
                    );
                    return Ok(archive);
                }
                Ok(archive) => warn!(
                    "Cache {} was built with {:?}, rebuilding for {:?}",
                    cache.display(),
                    archive.geometry,
                    self.geometry()
                ),
                Err(e) => warn!("Cache {} is unreadable ({}), rebuilding", cache.display(), e),
            }
        }

        let archive = self.build(source_dir, kind)?;
        if let Some(parent) = cache.parent() {
            std::fs::create_dir_all(parent)?;
        }
        archive.save(&cache)?;
        info!(
            "Cached {} {} samples at {}",
            archive.len(),
            kind,
            cache.display()
        );
        Ok(archive)
    }

    /// Builds an archive from the images in `source_dir` without touching the cache.
    pub fn build(&self, source_dir: &Path, kind: ArchiveKind) -> FusionResult<PatchArchive> {
        let paths = discover_images(source_dir)?;
        if paths.is_empty() {
            return Err(FusionError::invalid_input(format!(
                "no supported images found in {}",
                source_dir.display()
            )));
        }
        info!(
            "Preparing {} set from {} images in {}",
            kind,
            paths.len(),
            source_dir.display()
        );
        let images = load_gray_images_batch(&paths)?;

        let pairs: Vec<PatchPair> = match kind {
            ArchiveKind::Train => {
                let per_image: Vec<Vec<PatchPair>> = images
                    .par_iter()
                    .map(|img| self.extractor.extract(img))
                    .collect();
                for (path, patches) in paths.iter().zip(&per_image) {
                    debug!("{}: {} patches", path.display(), patches.len());
                }
                per_image.into_iter().flatten().collect()
            }
            ArchiveKind::Test => images
                .iter()
                .map(|img| self.extractor.pad_whole(img))
                .collect(),
        };

        if pairs.is_empty() {
            let geometry = self.geometry();
            return Err(FusionError::invalid_input(format!(
                "no training patches produced from {}: images must be larger than {} pixels on both sides",
                source_dir.display(),
                geometry.patch_size
            )));
        }

        let (data, label) = pairs.into_iter().map(|p| (p.input, p.label)).unzip();
        PatchArchive::new(kind, *self.geometry(), data, label)
    }
}

/// Relative cache directory for `source_dir`.
///
/// Normal components are kept and `..` becomes `_up`; `.`, roots and prefixes
/// are dropped. A path made only of those (`.`, `..`, `/`) is keyed by the
/// leaf name of its canonical form.
fn cache_key(source_dir: &Path) -> PathBuf {
    let mut key = PathBuf::new();
    let mut named = false;
    for component in source_dir.components() {
        match component {
            Component::Normal(part) => {
                key.push(part);
                named = true;
            }
            Component::ParentDir => key.push("_up"),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if named {
        return key;
    }
    std::fs::canonicalize(source_dir)
        .ok()
        .and_then(|p| p.file_name().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("_root"))
}
