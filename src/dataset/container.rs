//! On-disk patch container.
//!
//! Prepared samples are cached as a safetensors file of raw `u8` tensors. When
//! every sample shares one shape (training patches) the samples are stacked
//! into a single `(N, H, W, 1)` tensor per role; otherwise (whole test images)
//! each sample is stored as its own `(H, W, 1)` tensor named `data.{i}` /
//! `label.{i}`. The header metadata records the set kind and the patch
//! geometry the cache was built with, so a stale cache can be detected.

use crate::core::config::PatchConfig;
use crate::core::constants::{CONTAINER_FORMAT_VERSION, TEST_CACHE_FILE, TRAIN_CACHE_FILE};
use crate::core::errors::{FusionError, FusionResult};
use ndarray::Array3;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const DATA: &str = "data";
const LABEL: &str = "label";

const META_KIND: &str = "kind";
const META_LAYOUT: &str = "layout";
const META_COUNT: &str = "count";
const META_PATCH_SIZE: &str = "patch_size";
const META_LABEL_SIZE: &str = "label_size";
const META_STRIDE_SIZE: &str = "stride_size";
const META_VERSION: &str = "format_version";

const LAYOUT_STACKED: &str = "stacked";
const LAYOUT_ITEMS: &str = "items";

/// Which preparation produced an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Strided patches with centred labels.
    Train,
    /// Whole padded images with the unpadded image as label.
    Test,
}

impl ArchiveKind {
    /// File name of this kind's cache inside a dataset cache directory.
    pub fn cache_file(&self) -> &'static str {
        match self {
            ArchiveKind::Train => TRAIN_CACHE_FILE,
            ArchiveKind::Test => TEST_CACHE_FILE,
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Train => write!(f, "train"),
            ArchiveKind::Test => write!(f, "test"),
        }
    }
}

impl FromStr for ArchiveKind {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(ArchiveKind::Train),
            "test" => Ok(ArchiveKind::Test),
            other => Err(FusionError::invalid_input(format!(
                "unknown archive kind '{other}'"
            ))),
        }
    }
}

/// Prepared samples plus the geometry they were cut with.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchArchive {
    pub kind: ArchiveKind,
    pub geometry: PatchConfig,
    /// Network inputs, each `(H, W, 1)`.
    pub data: Vec<Array3<u8>>,
    /// Targets, each `(H, W, 1)`, index-aligned with `data`.
    pub label: Vec<Array3<u8>>,
}

impl PatchArchive {
    pub fn new(
        kind: ArchiveKind,
        geometry: PatchConfig,
        data: Vec<Array3<u8>>,
        label: Vec<Array3<u8>>,
    ) -> FusionResult<Self> {
        if data.len() != label.len() {
            return Err(FusionError::invalid_input(format!(
                "archive has {} inputs but {} labels",
                data.len(),
                label.len()
            )));
        }
        Ok(Self {
            kind,
            geometry,
            data,
            label,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if this archive was built for `kind` with exactly `geometry`.
    pub fn matches(&self, kind: ArchiveKind, geometry: &PatchConfig) -> bool {
        self.kind == kind && self.geometry == *geometry
    }

    fn is_uniform(&self) -> bool {
        let same = |items: &[Array3<u8>]| items.windows(2).all(|w| w[0].dim() == w[1].dim());
        same(&self.data) && same(&self.label)
    }

    /// Writes the archive to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> FusionResult<()> {
        let stacked = self.is_uniform();
        let metadata = HashMap::from([
            (META_KIND.to_string(), self.kind.to_string()),
            (
                META_LAYOUT.to_string(),
                if stacked { LAYOUT_STACKED } else { LAYOUT_ITEMS }.to_string(),
            ),
            (META_COUNT.to_string(), self.len().to_string()),
            (
                META_PATCH_SIZE.to_string(),
                self.geometry.patch_size.to_string(),
            ),
            (
                META_LABEL_SIZE.to_string(),
                self.geometry.label_size.to_string(),
            ),
            (
                META_STRIDE_SIZE.to_string(),
                self.geometry.stride_size.to_string(),
            ),
            (
                META_VERSION.to_string(),
                CONTAINER_FORMAT_VERSION.to_string(),
            ),
        ]);

        // Standard-layout byte buffers, kept alive while the views borrow them.
        let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
        if stacked {
            for (name, items) in [(DATA, &self.data), (LABEL, &self.label)] {
                if let Some(first) = items.first() {
                    let (h, w, c) = first.dim();
                    let bytes: Vec<u8> = items.iter().flat_map(|a| a.iter().copied()).collect();
                    buffers.push((name.to_string(), vec![items.len(), h, w, c], bytes));
                }
            }
        } else {
            for (name, items) in [(DATA, &self.data), (LABEL, &self.label)] {
                for (i, item) in items.iter().enumerate() {
                    let (h, w, c) = item.dim();
                    buffers.push((
                        format!("{name}.{i}"),
                        vec![h, w, c],
                        item.iter().copied().collect(),
                    ));
                }
            }
        }

        let views = buffers
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::U8, shape.clone(), bytes).map(|view| (name.clone(), view))
            })
            .collect::<Result<Vec<_>, _>>()?;

        safetensors::tensor::serialize_to_file(views, &Some(metadata), path)?;
        Ok(())
    }

    /// Reads an archive written by [`PatchArchive::save`].
    ///
    /// # Errors
    ///
    /// Returns `FusionError::Container` when metadata is missing or
    /// inconsistent, the file was written by another format version, or a
    /// tensor is absent, not `u8`, or of the wrong rank.
    pub fn load(path: &Path) -> FusionResult<Self> {
        let buffer = std::fs::read(path)?;
        let (_, header) = SafeTensors::read_metadata(&buffer)?;
        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| FusionError::container(path, "missing header metadata"))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| FusionError::container(path, format!("missing metadata '{key}'")))
        };
        let number = |key: &str| {
            field(key)?.parse::<usize>().map_err(|_| {
                FusionError::container(path, format!("metadata '{key}' is not a number"))
            })
        };

        let version = field(META_VERSION)?;
        if version != CONTAINER_FORMAT_VERSION {
            return Err(FusionError::container(
                path,
                format!("format version '{version}' is not supported, expected '{CONTAINER_FORMAT_VERSION}'"),
            ));
        }

        let kind: ArchiveKind = field(META_KIND)?.parse()?;
        let count = number(META_COUNT)?;
        let geometry = PatchConfig {
            patch_size: number(META_PATCH_SIZE)?,
            label_size: number(META_LABEL_SIZE)?,
            stride_size: number(META_STRIDE_SIZE)?,
        };

        let tensors = SafeTensors::deserialize(&buffer)?;
        let (data, label) = match field(META_LAYOUT)?.as_str() {
            LAYOUT_STACKED => (
                read_stacked(&tensors, DATA, count, path)?,
                read_stacked(&tensors, LABEL, count, path)?,
            ),
            LAYOUT_ITEMS => (
                read_items(&tensors, DATA, count, path)?,
                read_items(&tensors, LABEL, count, path)?,
            ),
            other => {
                return Err(FusionError::container(
                    path,
                    format!("unknown layout '{other}'"),
                ));
            }
        };

        Self::new(kind, geometry, data, label)
    }
}

fn checked_view<'a>(
    tensors: &'a SafeTensors<'a>,
    name: &str,
    rank: usize,
    path: &Path,
) -> FusionResult<TensorView<'a>> {
    let view = tensors
        .tensor(name)
        .map_err(|_| FusionError::container(path, format!("missing tensor '{name}'")))?;
    if view.dtype() != Dtype::U8 {
        return Err(FusionError::container(
            path,
            format!("tensor '{name}' has dtype {:?}, expected U8", view.dtype()),
        ));
    }
    if view.shape().len() != rank {
        return Err(FusionError::container(
            path,
            format!(
                "tensor '{name}' has shape {:?}, expected rank {rank}",
                view.shape()
            ),
        ));
    }
    Ok(view)
}

fn to_array(shape: (usize, usize, usize), bytes: &[u8], path: &Path) -> FusionResult<Array3<u8>> {
    Array3::from_shape_vec(shape, bytes.to_vec())
        .map_err(|e| FusionError::container(path, format!("bad sample shape: {e}")))
}

fn read_stacked(
    tensors: &SafeTensors<'_>,
    name: &str,
    count: usize,
    path: &Path,
) -> FusionResult<Vec<Array3<u8>>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let view = checked_view(tensors, name, 4, path)?;
    let shape = view.shape();
    if shape[0] != count {
        return Err(FusionError::container(
            path,
            format!("tensor '{name}' holds {} samples, expected {count}", shape[0]),
        ));
    }
    let sample = (shape[1], shape[2], shape[3]);
    let sample_len = shape[1] * shape[2] * shape[3];
    if sample_len == 0 {
        return Err(FusionError::container(
            path,
            format!("tensor '{name}' has empty samples"),
        ));
    }
    view.data()
        .chunks_exact(sample_len)
        .map(|chunk| to_array(sample, chunk, path))
        .collect()
}

fn read_items(
    tensors: &SafeTensors<'_>,
    name: &str,
    count: usize,
    path: &Path,
) -> FusionResult<Vec<Array3<u8>>> {
    (0..count)
        .map(|i| {
            let view = checked_view(tensors, &format!("{name}.{i}"), 3, path)?;
            let shape = view.shape();
            to_array((shape[0], shape[1], shape[2]), view.data(), path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> PatchConfig {
        PatchConfig {
            patch_size: 6,
            label_size: 4,
            stride_size: 2,
        }
    }

    /// Header of a two-sample stacked training archive with the given version.
    fn stacked_metadata(version: &str) -> HashMap<String, String> {
        HashMap::from([
            (META_KIND.to_string(), "train".to_string()),
            (META_LAYOUT.to_string(), LAYOUT_STACKED.to_string()),
            (META_COUNT.to_string(), "2".to_string()),
            (META_PATCH_SIZE.to_string(), "6".to_string()),
            (META_LABEL_SIZE.to_string(), "4".to_string()),
            (META_STRIDE_SIZE.to_string(), "2".to_string()),
            (META_VERSION.to_string(), version.to_string()),
        ])
    }

    fn sample(h: usize, w: usize, seed: u8) -> Array3<u8> {
        Array3::from_shape_fn((h, w, 1), |(y, x, _)| {
            seed.wrapping_add((y * w + x) as u8)
        })
    }

    #[test]
    fn test_stacked_archive_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAIN_CACHE_FILE);
        let archive = PatchArchive::new(
            ArchiveKind::Train,
            geometry(),
            vec![sample(6, 6, 0), sample(6, 6, 50), sample(6, 6, 100)],
            vec![sample(4, 4, 1), sample(4, 4, 51), sample(4, 4, 101)],
        )
        .unwrap();
        archive.save(&path).unwrap();

        let loaded = PatchArchive::load(&path).unwrap();
        assert_eq!(loaded, archive);
        assert!(loaded.matches(ArchiveKind::Train, &geometry()));
        assert!(!loaded.matches(ArchiveKind::Test, &geometry()));
    }

    #[test]
    fn test_variable_shapes_use_item_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TEST_CACHE_FILE);
        let archive = PatchArchive::new(
            ArchiveKind::Test,
            geometry(),
            vec![sample(7, 9, 3), sample(5, 4, 9)],
            vec![sample(5, 7, 3), sample(3, 2, 9)],
        )
        .unwrap();
        archive.save(&path).unwrap();

        let buffer = std::fs::read(&path).unwrap();
        let tensors = SafeTensors::deserialize(&buffer).unwrap();
        assert!(tensors.tensor("data.1").is_ok());
        assert!(tensors.tensor("data").is_err());

        assert_eq!(PatchArchive::load(&path).unwrap(), archive);
    }

    #[test]
    fn test_empty_archive_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.safetensors");
        let archive =
            PatchArchive::new(ArchiveKind::Train, geometry(), Vec::new(), Vec::new()).unwrap();
        archive.save(&path).unwrap();
        assert!(PatchArchive::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        assert!(
            PatchArchive::new(
                ArchiveKind::Train,
                geometry(),
                vec![sample(6, 6, 0)],
                Vec::new()
            )
            .is_err()
        );
    }

    #[test]
    fn test_foreign_safetensors_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.safetensors");
        let bytes = vec![0u8; 4];
        let view = TensorView::new(Dtype::U8, vec![4], &bytes).unwrap();
        safetensors::tensor::serialize_to_file(vec![("data", view)], &None, &path).unwrap();

        assert!(matches!(
            PatchArchive::load(&path),
            Err(FusionError::Container { .. })
        ));
    }

    #[test]
    fn test_missing_label_tensor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.safetensors");
        let bytes = vec![7u8; 2 * 6 * 6];
        let view = TensorView::new(Dtype::U8, vec![2, 6, 6, 1], &bytes).unwrap();
        let metadata = stacked_metadata(CONTAINER_FORMAT_VERSION);
        safetensors::tensor::serialize_to_file(vec![(DATA, view)], &Some(metadata), &path)
            .unwrap();

        let error = PatchArchive::load(&path).unwrap_err();
        assert!(error.to_string().contains("label"));
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.safetensors");
        let data = vec![1u8; 2 * 6 * 6];
        let label = vec![2u8; 2 * 4 * 4];
        let views = vec![
            (DATA, TensorView::new(Dtype::U8, vec![2, 6, 6, 1], &data).unwrap()),
            (LABEL, TensorView::new(Dtype::U8, vec![2, 4, 4, 1], &label).unwrap()),
        ];
        safetensors::tensor::serialize_to_file(views, &Some(stacked_metadata("0")), &path)
            .unwrap();

        match PatchArchive::load(&path) {
            Err(FusionError::Container { message, .. }) => assert!(message.contains("version")),
            other => panic!("expected a container error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_u8_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.safetensors");
        let data = vec![0u8; 2 * 6 * 6 * 4];
        let label = vec![0u8; 2 * 4 * 4];
        let views = vec![
            (DATA, TensorView::new(Dtype::F32, vec![2, 6, 6, 1], &data).unwrap()),
            (LABEL, TensorView::new(Dtype::U8, vec![2, 4, 4, 1], &label).unwrap()),
        ];
        let metadata = stacked_metadata(CONTAINER_FORMAT_VERSION);
        safetensors::tensor::serialize_to_file(views, &Some(metadata), &path).unwrap();

        match PatchArchive::load(&path) {
            Err(FusionError::Container { message, .. }) => assert!(message.contains("dtype")),
            other => panic!("expected a container error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_rank_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank3.safetensors");
        let data = vec![0u8; 2 * 6 * 6];
        let label = vec![0u8; 2 * 4 * 4];
        let views = vec![
            (DATA, TensorView::new(Dtype::U8, vec![2, 6, 6], &data).unwrap()),
            (LABEL, TensorView::new(Dtype::U8, vec![2, 4, 4, 1], &label).unwrap()),
        ];
        let metadata = stacked_metadata(CONTAINER_FORMAT_VERSION);
        safetensors::tensor::serialize_to_file(views, &Some(metadata), &path).unwrap();

        match PatchArchive::load(&path) {
            Err(FusionError::Container { message, .. }) => assert!(message.contains("rank")),
            other => panic!("expected a container error, got {other:?}"),
        }
    }
}
