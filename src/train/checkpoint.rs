//! Weight checkpoints and training history on disk.
//!
//! Each checkpoint is a pair of safetensors files, `G_{epoch}.safetensors` for
//! the generator and `D_{epoch}.safetensors` for the discriminator, written by
//! [`VarMap::save`](candle_nn::VarMap::save). The JSON training history sits in
//! the same directory.

use super::result::EpochRecord;
use crate::core::constants::HISTORY_FILE;
use crate::core::errors::{FusionError, FusionResult};
use crate::models::FusionNetworks;
use candle_nn::VarMap;
use std::path::{Path, PathBuf};
use tracing::info;

const EXTENSION: &str = "safetensors";

/// Reads and writes checkpoints under one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generator_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("G_{epoch}.{EXTENSION}"))
    }

    pub fn discriminator_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("D_{epoch}.{EXTENSION}"))
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Writes both networks for `epoch`.
    pub fn save(&self, epoch: usize, nets: &FusionNetworks) -> FusionResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        save_vars(nets.generator_vars(), &self.generator_path(epoch))?;
        save_vars(nets.discriminator_vars(), &self.discriminator_path(epoch))?;
        info!("Saved checkpoint for epoch {} to {}", epoch, self.dir.display());
        Ok(())
    }

    /// Restores both networks from the checkpoint of `epoch`.
    pub fn load(&self, epoch: usize, nets: &mut FusionNetworks) -> FusionResult<()> {
        load_vars(nets.generator_vars_mut(), &self.generator_path(epoch))?;
        load_vars(nets.discriminator_vars_mut(), &self.discriminator_path(epoch))?;
        info!("Restored checkpoint for epoch {}", epoch);
        Ok(())
    }

    /// Restores only the generator, from any `G_{epoch}.safetensors` file.
    pub fn load_generator(path: &Path, nets: &mut FusionNetworks) -> FusionResult<()> {
        load_vars(nets.generator_vars_mut(), path)
    }

    /// Highest epoch with both a generator and a discriminator file.
    pub fn latest_epoch(&self) -> FusionResult<Option<usize>> {
        if !self.dir.exists() {
            return Ok(None);
        }
        let mut latest = None;
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(epoch) = name
                .to_str()
                .and_then(|n| n.strip_prefix("G_"))
                .and_then(|n| n.strip_suffix(&format!(".{EXTENSION}")))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            if self.discriminator_path(epoch).exists() {
                latest = latest.max(Some(epoch));
            }
        }
        Ok(latest)
    }

    pub fn save_history(&self, history: &[EpochRecord]) -> FusionResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(history)?;
        std::fs::write(self.history_path(), json)?;
        Ok(())
    }

    /// Loads the training history, or an empty one if none was written yet.
    pub fn load_history(&self) -> FusionResult<Vec<EpochRecord>> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn save_vars(vars: &VarMap, path: &Path) -> FusionResult<()> {
    vars.save(path)
        .map_err(|e| FusionError::checkpoint(&format!("write {}", path.display()), e))
}

/// Loads weights into an existing [`VarMap`]. Every variable must be present
/// in the file with a matching shape.
fn load_vars(vars: &mut VarMap, path: &Path) -> FusionResult<()> {
    if !path.exists() {
        return Err(FusionError::invalid_input(format!(
            "checkpoint {} does not exist",
            path.display()
        )));
    }
    vars.load(path)
        .map_err(|e| FusionError::checkpoint(&format!("read {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ModelConfig, PatchConfig};
    use candle_core::Device;

    fn networks() -> FusionNetworks {
        let model = ModelConfig {
            generator_channels: vec![2],
            discriminator_channels: vec![2],
            kernel_size: 3,
        };
        let patch = PatchConfig {
            patch_size: 8,
            label_size: 6,
            stride_size: 2,
        };
        FusionNetworks::new(&model, &patch, &Device::Cpu).unwrap()
    }

    fn first_weights(vars: &VarMap) -> Vec<f32> {
        let data = vars.data().lock().unwrap();
        let mut names: Vec<&String> = data.keys().collect();
        names.sort();
        data[names[0]].flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn test_paths() {
        let store = CheckpointStore::new("/ckpt");
        assert_eq!(store.generator_path(5), PathBuf::from("/ckpt/G_5.safetensors"));
        assert_eq!(store.discriminator_path(5), PathBuf::from("/ckpt/D_5.safetensors"));
        assert_eq!(store.history_path(), PathBuf::from("/ckpt/history.json"));
    }

    #[test]
    fn test_save_then_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let saved = networks();
        store.save(3, &saved).unwrap();

        let mut restored = networks();
        assert_ne!(
            first_weights(saved.generator_vars()),
            first_weights(restored.generator_vars())
        );
        store.load(3, &mut restored).unwrap();
        assert_eq!(
            first_weights(saved.generator_vars()),
            first_weights(restored.generator_vars())
        );
        assert_eq!(
            first_weights(saved.discriminator_vars()),
            first_weights(restored.discriminator_vars())
        );
    }

    #[test]
    fn test_load_generator_leaves_discriminator() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let saved = networks();
        store.save(1, &saved).unwrap();

        let mut restored = networks();
        let discriminator_before = first_weights(restored.discriminator_vars());
        CheckpointStore::load_generator(&store.generator_path(1), &mut restored).unwrap();
        assert_eq!(
            first_weights(saved.generator_vars()),
            first_weights(restored.generator_vars())
        );
        assert_eq!(
            discriminator_before,
            first_weights(restored.discriminator_vars())
        );
    }

    #[test]
    fn test_latest_epoch_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert_eq!(store.latest_epoch().unwrap(), None);

        let nets = networks();
        store.save(5, &nets).unwrap();
        store.save(10, &nets).unwrap();
        std::fs::write(store.generator_path(15), b"partial").unwrap();
        assert_eq!(store.latest_epoch().unwrap(), Some(10));
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut nets = networks();
        assert!(matches!(
            store.load(1, &mut nets),
            Err(FusionError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));
        assert!(store.load_history().unwrap().is_empty());

        let history = vec![EpochRecord {
            epoch: 1,
            batches: 4,
            d_loss: 0.75,
            g_loss: Some(12.5),
            g_adversarial: Some(0.5),
            g_content: Some(0.12),
            elapsed_secs: 0.3,
        }];
        store.save_history(&history).unwrap();
        assert_eq!(store.load_history().unwrap(), history);
    }
}
