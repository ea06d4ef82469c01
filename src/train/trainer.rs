//! Alternating GAN training loop.

use super::checkpoint::CheckpointStore;
use super::fusion::fuse_pair;
use super::losses::GanLoss;
use super::result::{EpochRecord, EvalReport, LossMeter, TrainResult};
use crate::core::config::{ConfigValidator, TrainConfig};
use crate::core::errors::{FusionError, FusionResult, ProcessingStage};
use crate::dataset::{PairBatch, PairedLoader};
use crate::models::FusionNetworks;
use crate::processors::{NormalizeImage, PatchExtractor};
use candle_core::{Module, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use image::GrayImage;
use std::time::Instant;
use tracing::{debug, info};

fn adam(vars: &VarMap, config: &TrainConfig) -> FusionResult<AdamW> {
    let opt = &config.optimizer;
    let params = ParamsAdamW {
        lr: opt.learning_rate,
        beta1: opt.beta1,
        beta2: opt.beta2,
        eps: opt.eps,
        weight_decay: opt.weight_decay,
    };
    AdamW::new(vars.all_vars(), params)
        .map_err(|e| FusionError::training("create optimizer", e))
}

/// Reads a scalar loss, rejecting NaN and infinity.
fn finite_scalar(loss: &Tensor, what: &str, epoch: usize, batch: usize) -> FusionResult<f32> {
    let value = loss
        .to_scalar::<f32>()
        .map_err(|e| FusionError::tensor_operation(what, e))?;
    if !value.is_finite() {
        return Err(FusionError::processing_message(
            ProcessingStage::Training,
            format!("epoch {epoch}, batch {batch}"),
            format!("{what} is not finite ({value})"),
        ));
    }
    Ok(value)
}

/// Trains the generator and discriminator against each other.
///
/// Each batch takes one discriminator step on the detached fused output and
/// the visible labels. Every `generator_interval`-th batch also takes one
/// generator step against the updated discriminator. Each network has its own
/// Adam optimizer that only sees that network's variables.
pub struct FusionTrainer {
    config: TrainConfig,
    nets: FusionNetworks,
    loss: GanLoss,
    generator_opt: AdamW,
    discriminator_opt: AdamW,
    store: CheckpointStore,
    history: Vec<EpochRecord>,
    completed_epochs: usize,
}

impl FusionTrainer {
    pub fn new(config: TrainConfig, nets: FusionNetworks) -> FusionResult<Self> {
        config.validate()?;
        let generator_opt = adam(nets.generator_vars(), &config)?;
        let discriminator_opt = adam(nets.discriminator_vars(), &config)?;
        let loss = GanLoss::new(config.loss, nets.device())
            .map_err(|e| FusionError::tensor_operation("create loss", e))?;
        let store = CheckpointStore::new(&config.checkpoint_dir);
        info!(
            "Trainer ready: {} parameters on {:?}",
            nets.parameter_count(),
            nets.device()
        );
        Ok(Self {
            config,
            nets,
            loss,
            generator_opt,
            discriminator_opt,
            store,
            history: Vec::new(),
            completed_epochs: 0,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn networks(&self) -> &FusionNetworks {
        &self.nets
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Loads the weights saved for `epoch` without touching training progress.
    pub fn load_checkpoint(&mut self, epoch: usize) -> FusionResult<()> {
        self.store.load(epoch, &mut self.nets)
    }

    /// Continues from the checkpoint of `epoch`: weights are restored, the
    /// stored history is kept up to `epoch`, and training resumes at `epoch + 1`.
    ///
    /// Optimizer moments are not checkpointed and start fresh.
    pub fn resume(&mut self, epoch: usize) -> FusionResult<()> {
        if epoch > self.config.epochs {
            return Err(FusionError::invalid_input(format!(
                "cannot resume from epoch {epoch}, training stops at {}",
                self.config.epochs
            )));
        }
        self.load_checkpoint(epoch)?;
        let mut history = self.store.load_history()?;
        history.retain(|r| r.epoch <= epoch);
        self.history = history;
        self.completed_epochs = epoch;
        info!("Resuming after epoch {}", epoch);
        Ok(())
    }

    /// Runs the remaining epochs over `loader`.
    ///
    /// A checkpoint is written every `log_interval` epochs and after the last
    /// epoch, and `history.json` is rewritten alongside each checkpoint.
    pub fn train(&mut self, loader: &mut PairedLoader<'_>) -> FusionResult<TrainResult> {
        if loader.is_empty() {
            return Err(FusionError::invalid_input("training set is empty"));
        }
        let started = Instant::now();
        let mut checkpoints = Vec::new();
        let first = self.completed_epochs + 1;
        info!(
            "Training epochs {}..={} on {} samples, {} batches per epoch",
            first,
            self.config.epochs,
            loader.len(),
            loader.num_batches()
        );

        for epoch in first..=self.config.epochs {
            info!(
                "Epoch {}/{} started, {} batches",
                epoch,
                self.config.epochs,
                loader.num_batches()
            );
            let record = self.train_epoch(epoch, loader)?;
            let g_loss = record
                .g_loss
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.6}"));
            self.history.push(record);
            self.completed_epochs = epoch;

            if epoch % self.config.log_interval == 0 || epoch == self.config.epochs {
                let d_loss = self.history.last().map_or(f32::NAN, |r| r.d_loss);
                info!("Epoch {} | G_loss {} | D_loss {:.6}", epoch, g_loss, d_loss);
                self.store.save(epoch, &self.nets)?;
                self.store.save_history(&self.history)?;
                checkpoints.push(epoch);
            }
        }

        Ok(TrainResult {
            final_epoch: self.completed_epochs,
            history: self.history.clone(),
            checkpoints,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    fn train_epoch(&mut self, epoch: usize, loader: &mut PairedLoader<'_>) -> FusionResult<EpochRecord> {
        let started = Instant::now();
        let device = self.nets.device().clone();
        let (mut d_meter, mut g_meter) = (LossMeter::default(), LossMeter::default());
        let (mut adv_meter, mut content_meter) = (LossMeter::default(), LossMeter::default());
        let mut batches = 0;

        for (idx, batch) in loader.epoch(&device).enumerate() {
            let batch = batch?;
            let fused = self
                .nets
                .generator
                .forward(&batch.generator_input()?)
                .map_err(|e| FusionError::training("generator forward", e))?;

            let d_loss = self
                .discriminator_loss(&fused.detach(), &batch)
                .map_err(|e| FusionError::training("discriminator loss", e))?;
            d_meter.add(finite_scalar(&d_loss, "discriminator loss", epoch, idx)?);
            self.discriminator_opt
                .backward_step(&d_loss)
                .map_err(|e| FusionError::training("discriminator step", e))?;

            if (idx + 1) % self.config.generator_interval == 0 {
                let fake_scores = self
                    .nets
                    .discriminator
                    .forward(&fused)
                    .map_err(|e| FusionError::training("discriminator forward", e))?;
                let g = self
                    .loss
                    .generator(&fused, &fake_scores, &batch.ir_label, &batch.vi_label)
                    .map_err(|e| FusionError::training("generator loss", e))?;
                g_meter.add(finite_scalar(&g.total, "generator loss", epoch, idx)?);
                adv_meter.add(finite_scalar(&g.adversarial, "adversarial loss", epoch, idx)?);
                content_meter.add(finite_scalar(&g.content, "content loss", epoch, idx)?);
                self.generator_opt
                    .backward_step(&g.total)
                    .map_err(|e| FusionError::training("generator step", e))?;
            }
            batches += 1;
        }

        let record = EpochRecord {
            epoch,
            batches,
            d_loss: d_meter.mean().unwrap_or(0.0),
            g_loss: g_meter.mean(),
            g_adversarial: adv_meter.mean(),
            g_content: content_meter.mean(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        debug!("Epoch {} finished in {:.2}s", epoch, record.elapsed_secs);
        Ok(record)
    }

    fn discriminator_loss(&self, fused: &Tensor, batch: &PairBatch) -> candle_core::Result<Tensor> {
        let fake_scores = self.nets.discriminator.forward(fused)?;
        let real_scores = self.nets.discriminator.forward(&batch.vi_label)?;
        self.loss.discriminator(&fake_scores, &real_scores)
    }

    /// Mean losses of the current networks over `loader`, without updating
    /// any weights. Means are weighted by batch size.
    pub fn evaluate(&self, loader: &mut PairedLoader<'_>) -> FusionResult<EvalReport> {
        if loader.is_empty() {
            return Err(FusionError::invalid_input("evaluation set is empty"));
        }
        let device = self.nets.device().clone();
        let mut sums = [0f64; 4];
        let mut samples = 0usize;

        for (idx, batch) in loader.epoch(&device).enumerate() {
            let batch = batch?;
            let size = batch.batch_size();
            let losses = self
                .evaluate_batch(&batch)
                .map_err(|e| FusionError::training("evaluation", e))?;
            let names = ["discriminator loss", "generator loss", "adversarial loss", "content loss"];
            for ((sum, loss), name) in sums.iter_mut().zip(&losses).zip(names) {
                *sum += finite_scalar(loss, name, 0, idx)? as f64 * size as f64;
            }
            samples += size;
        }

        let mean = |i: usize| (sums[i] / samples as f64) as f32;
        let report = EvalReport {
            samples,
            d_loss: mean(0),
            g_loss: mean(1),
            g_adversarial: mean(2),
            g_content: mean(3),
        };
        info!(
            "Evaluated {} samples | G_loss {:.6} | D_loss {:.6}",
            report.samples, report.g_loss, report.d_loss
        );
        Ok(report)
    }

    /// Fuses one whole image pair with the current generator.
    pub fn fuse_pair(&self, infrared: &GrayImage, visible: &GrayImage) -> FusionResult<GrayImage> {
        fuse_pair(
            &self.nets,
            &PatchExtractor::new(self.config.patch)?,
            &NormalizeImage::for_fusion(),
            infrared,
            visible,
        )
    }

    fn evaluate_batch(&self, batch: &PairBatch) -> candle_core::Result<[Tensor; 4]> {
        let fused = self.nets.generator.forward(&batch.generator_input()?)?;
        let d_loss = self.discriminator_loss(&fused, batch)?;
        let fake_scores = self.nets.discriminator.forward(&fused)?;
        let g = self
            .loss
            .generator(&fused, &fake_scores, &batch.ir_label, &batch.vi_label)?;
        Ok([d_loss, g.total, g.adversarial, g.content])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ModelConfig, PatchConfig};
    use crate::dataset::{ArchiveKind, DatasetPreparer, FusionDataset};
    use candle_core::Device;
    use image::Luma;
    use std::path::Path;

    fn write_images(dir: &Path, seed: u32) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 1..=2u32 {
            GrayImage::from_fn(20, 20, |x, y| Luma([((x * 7 + y * 3 + i * seed) % 256) as u8]))
                .save(dir.join(format!("{i}.png")))
                .unwrap();
        }
    }

    fn config(root: &Path) -> TrainConfig {
        TrainConfig {
            ir_dir: root.join("Train_ir"),
            vi_dir: root.join("Train_vi"),
            checkpoint_dir: root.join("checkpoint"),
            log_dir: root.join("log"),
            batch_size: 4,
            epochs: 3,
            log_interval: 2,
            generator_interval: 2,
            seed: Some(1),
            device: "cpu".to_string(),
            patch: PatchConfig {
                patch_size: 10,
                label_size: 8,
                stride_size: 5,
            },
            model: ModelConfig {
                generator_channels: vec![4],
                discriminator_channels: vec![4],
                kernel_size: 3,
            },
            ..TrainConfig::default()
        }
    }

    fn datasets(config: &TrainConfig, kind: ArchiveKind) -> (FusionDataset, FusionDataset) {
        write_images(&config.ir_dir, 11);
        write_images(&config.vi_dir, 29);
        let preparer = DatasetPreparer::new(config.patch, &config.checkpoint_dir).unwrap();
        (
            FusionDataset::open(&preparer, &config.ir_dir, kind).unwrap(),
            FusionDataset::open(&preparer, &config.vi_dir, kind).unwrap(),
        )
    }

    fn trainer(config: &TrainConfig) -> FusionTrainer {
        let nets = FusionNetworks::new(&config.model, &config.patch, &Device::Cpu).unwrap();
        FusionTrainer::new(config.clone(), nets).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            generator_interval: 0,
            ..config(root.path())
        };
        let nets = FusionNetworks::new(&config.model, &config.patch, &Device::Cpu).unwrap();
        assert!(FusionTrainer::new(config, nets).is_err());
    }

    #[test]
    fn test_training_writes_checkpoints_and_history() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let (ir, vi) = datasets(&config, ArchiveKind::Train);
        // rows and cols 0..10 step 5 -> 4 patches per image
        assert_eq!(ir.len(), 8);
        let mut loader = PairedLoader::new(&ir, &vi, config.batch_size, true, config.seed).unwrap();

        let mut trainer = trainer(&config);
        let result = trainer.train(&mut loader).unwrap();

        assert_eq!(result.final_epoch, 3);
        assert_eq!(result.checkpoints, vec![2, 3]);
        assert_eq!(result.history.len(), 3);
        for record in &result.history {
            assert_eq!(record.batches, 2);
            assert!(record.d_loss.is_finite());
            // one generator step per epoch with two batches
            assert!(record.g_loss.is_some_and(f32::is_finite));
        }

        let store = trainer.checkpoints();
        assert!(store.generator_path(2).exists());
        assert!(store.discriminator_path(3).exists());
        assert!(!store.generator_path(1).exists());
        assert_eq!(store.latest_epoch().unwrap(), Some(3));
        assert_eq!(store.load_history().unwrap(), result.history);
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_epoch_start_is_logged_with_batch_count() {
        let root = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            epochs: 1,
            ..config(root.path())
        };
        let (ir, vi) = datasets(&config, ArchiveKind::Train);
        let mut loader = PairedLoader::new(&ir, &vi, config.batch_size, false, None).unwrap();
        let mut trainer = trainer(&config);

        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || trainer.train(&mut loader).unwrap());

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Epoch 1/1 started, 2 batches"), "{output}");
    }

    #[test]
    fn test_generator_waits_for_interval() {
        let root = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            epochs: 1,
            generator_interval: 3,
            ..config(root.path())
        };
        let (ir, vi) = datasets(&config, ArchiveKind::Train);
        let mut loader = PairedLoader::new(&ir, &vi, config.batch_size, false, None).unwrap();

        let result = trainer(&config).train(&mut loader).unwrap();
        assert_eq!(result.history[0].batches, 2);
        assert_eq!(result.history[0].g_loss, None);
    }

    #[test]
    fn test_resume_continues_after_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let (ir, vi) = datasets(&config, ArchiveKind::Train);
        let mut loader = PairedLoader::new(&ir, &vi, config.batch_size, true, config.seed).unwrap();
        trainer(&config).train(&mut loader).unwrap();

        let mut resumed = trainer(&config);
        resumed.resume(2).unwrap();
        assert_eq!(resumed.history().len(), 2);
        let result = resumed.train(&mut loader).unwrap();
        assert_eq!(result.checkpoints, vec![3]);
        assert_eq!(result.history.len(), 3);
        assert!(resumed.resume(4).is_err());
    }

    #[test]
    fn test_evaluate_on_padded_test_set() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let (ir, vi) = datasets(&config, ArchiveKind::Test);
        let mut loader = PairedLoader::new(&ir, &vi, 1, false, None).unwrap();

        let report = trainer(&config).evaluate(&mut loader).unwrap();
        assert_eq!(report.samples, 2);
        assert!(report.g_loss.is_finite());
        assert!(report.d_loss > 0.0);
    }

    #[test]
    fn test_fuse_pair_keeps_source_size() {
        let root = tempfile::tempdir().unwrap();
        let trainer = trainer(&config(root.path()));
        let ir = GrayImage::from_pixel(15, 11, Luma([200]));
        let vi = GrayImage::from_fn(15, 11, |x, _| Luma([(x * 16) as u8]));
        assert_eq!(trainer.fuse_pair(&ir, &vi).unwrap().dimensions(), (15, 11));
    }
}
