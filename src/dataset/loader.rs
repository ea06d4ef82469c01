//! Paired mini-batch loading.

use super::accessor::FusionDataset;
use crate::core::errors::{FusionError, FusionResult};
use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// One mini-batch of aligned infrared and visible samples, `(B, 1, H, W)` each.
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub ir_input: Tensor,
    pub ir_label: Tensor,
    pub vi_input: Tensor,
    pub vi_label: Tensor,
}

impl PairBatch {
    pub fn batch_size(&self) -> usize {
        self.ir_input.dims().first().copied().unwrap_or(0)
    }

    /// Generator input: infrared and visible stacked on the channel axis.
    pub fn generator_input(&self) -> candle_core::Result<Tensor> {
        Tensor::cat(&[&self.ir_input, &self.vi_input], 1)
    }
}

/// Iterates an infrared and a visible dataset in lockstep.
///
/// Sample `i` of one dataset is always batched with sample `i` of the other;
/// when shuffling, both follow the same permutation. The final batch of an
/// epoch may be smaller than `batch_size`.
#[derive(Debug)]
pub struct PairedLoader<'a> {
    ir: &'a FusionDataset,
    vi: &'a FusionDataset,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl<'a> PairedLoader<'a> {
    /// Creates a loader over two datasets of equal length.
    ///
    /// # Errors
    ///
    /// Returns `FusionError::DatasetMismatch` if the datasets differ in size and
    /// a configuration error if `batch_size` is zero.
    pub fn new(
        ir: &'a FusionDataset,
        vi: &'a FusionDataset,
        batch_size: usize,
        shuffle: bool,
        seed: Option<u64>,
    ) -> FusionResult<Self> {
        if ir.len() != vi.len() {
            return Err(FusionError::DatasetMismatch {
                infrared: ir.len(),
                visible: vi.len(),
            });
        }
        if batch_size == 0 {
            return Err(FusionError::config_error("batch size must be greater than 0"));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            ir,
            vi,
            batch_size,
            shuffle,
            rng,
        })
    }

    pub fn len(&self) -> usize {
        self.ir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ir.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch, counting a trailing partial batch.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Sample order for the next epoch.
    pub fn next_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        order
    }

    /// Starts a new epoch, drawing a fresh permutation if shuffling.
    pub fn epoch(&mut self, device: &Device) -> PairedEpoch<'a> {
        PairedEpoch {
            ir: self.ir,
            vi: self.vi,
            order: self.next_order(),
            batch_size: self.batch_size,
            cursor: 0,
            device: device.clone(),
        }
    }
}

/// Batches of one epoch, produced on demand.
#[derive(Debug)]
pub struct PairedEpoch<'a> {
    ir: &'a FusionDataset,
    vi: &'a FusionDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    device: Device,
}

impl PairedEpoch<'_> {
    fn assemble(&self, indices: &[usize]) -> FusionResult<PairBatch> {
        let capacity = indices.len();
        let (mut ir_input, mut ir_label) = (Vec::with_capacity(capacity), Vec::with_capacity(capacity));
        let (mut vi_input, mut vi_label) = (Vec::with_capacity(capacity), Vec::with_capacity(capacity));
        for &idx in indices {
            let (input, label) = self.ir.get(idx)?;
            ir_input.push(input);
            ir_label.push(label);
            let (input, label) = self.vi.get(idx)?;
            vi_input.push(input);
            vi_label.push(label);
        }

        let stack = |items: &[Tensor]| -> FusionResult<Tensor> {
            Tensor::stack(items, 0)
                .and_then(|t| t.to_device(&self.device))
                .map_err(|e| FusionError::tensor_operation("stack batch", e))
        };
        Ok(PairBatch {
            ir_input: stack(&ir_input)?,
            ir_label: stack(&ir_label)?,
            vi_input: stack(&vi_input)?,
            vi_label: stack(&vi_label)?,
        })
    }
}

impl Iterator for PairedEpoch<'_> {
    type Item = FusionResult<PairBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.assemble(&indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PairedEpoch<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PatchConfig;
    use crate::dataset::{ArchiveKind, PatchArchive};
    use crate::processors::NormalizeImage;
    use ndarray::Array3;

    /// Sample `i` is filled with the value `i` in both input and label.
    fn dataset(len: usize, offset: u8) -> FusionDataset {
        let geometry = PatchConfig {
            patch_size: 3,
            label_size: 1,
            stride_size: 1,
        };
        let data = (0..len)
            .map(|i| Array3::from_elem((3, 3, 1), i as u8 + offset))
            .collect();
        let label = (0..len)
            .map(|i| Array3::from_elem((1, 1, 1), i as u8 + offset))
            .collect();
        FusionDataset::from_archive(
            PatchArchive::new(ArchiveKind::Train, geometry, data, label).unwrap(),
            NormalizeImage::new(Some(1.0), Some(vec![0.0]), Some(vec![1.0])).unwrap(),
        )
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let ir = dataset(4, 0);
        let vi = dataset(5, 0);
        assert!(matches!(
            PairedLoader::new(&ir, &vi, 2, false, None),
            Err(FusionError::DatasetMismatch {
                infrared: 4,
                visible: 5
            })
        ));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let ir = dataset(4, 0);
        assert!(PairedLoader::new(&ir, &ir, 0, false, None).is_err());
    }

    #[test]
    fn test_batches_keep_partial_tail() {
        let ir = dataset(5, 0);
        let vi = dataset(5, 100);
        let mut loader = PairedLoader::new(&ir, &vi, 2, false, None).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<PairBatch> = loader
            .epoch(&Device::Cpu)
            .collect::<FusionResult<_>>()
            .unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.batch_size()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[0].ir_input.dims(), &[2, 1, 3, 3]);
        assert_eq!(batches[0].vi_label.dims(), &[2, 1, 1, 1]);
        assert_eq!(batches[0].generator_input().unwrap().dims(), &[2, 2, 3, 3]);
    }

    #[test]
    fn test_shuffled_pairs_stay_aligned() {
        let ir = dataset(16, 0);
        let vi = dataset(16, 100);
        let mut loader = PairedLoader::new(&ir, &vi, 4, true, Some(42)).unwrap();

        let mut seen = Vec::new();
        for batch in loader.epoch(&Device::Cpu) {
            let batch = batch.unwrap();
            let ir_ids = batch.ir_label.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let vi_ids = batch.vi_label.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            for (a, b) in ir_ids.iter().zip(&vi_ids) {
                assert_eq!(*a + 100.0, *b);
            }
            seen.extend(ir_ids.iter().map(|&v| v as usize));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let ir = dataset(32, 0);
        let mut a = PairedLoader::new(&ir, &ir, 8, true, Some(7)).unwrap();
        let mut b = PairedLoader::new(&ir, &ir, 8, true, Some(7)).unwrap();
        let first = a.next_order();
        assert_eq!(first, b.next_order());
        assert_ne!(first, (0..32).collect::<Vec<_>>());
    }
}
