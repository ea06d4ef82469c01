//! Fusion GAN command line
//!
//! Trains, evaluates, and applies the infrared/visible fusion GAN.
//!
//! # Usage
//!
//! ```bash
//! fusion-gan train [OPTIONS] [--resume-epoch N]
//! fusion-gan evaluate --epoch N [OPTIONS]
//! fusion-gan fuse --generator checkpoint/G_30.safetensors --output-dir fused/ [OPTIONS]
//! ```
//!
//! # Shared options
//!
//! * `-b, --batch-size` - Mini-batch size (default: 32)
//! * `-p, --patch-size` - Generator input patch size (default: 160)
//! * `-l, --label-size` - Label window size (default: 152)
//! * `-s, --stride-size` - Patch stride (default: 60)
//! * `-e, --epochs` - Number of epochs (default: 30)
//! * `-c, --checkpoint-dir` - Checkpoint and cache directory (default: ./checkpoint)
//! * `--log-dir` - Log directory (default: ./log)
//! * `--log-interval` - Epochs between loss reports and checkpoints (default: 5)
//! * `--generator-interval` - Batches per generator step (default: 2)
//! * `--ir-dir`, `--vi-dir` - Infrared and visible image directories
//! * `--device` - `auto`, `cpu`, `cuda`, or `cuda:N`
//! * `--seed` - Seed for shuffling
//! * `--config` - JSON configuration file; flags override its values
//!
//! # Example
//!
//! ```bash
//! fusion-gan train -e 10 --ir-dir data/Train_ir --vi-dir data/Train_vi
//! ```

use clap::{Args, Parser, Subcommand};
use fusion_gan::core::config::{ConfigValidator, TrainConfig};
use fusion_gan::core::errors::FusionResult;
use fusion_gan::dataset::{ArchiveKind, DatasetPreparer, FusionDataset, PairedLoader};
use fusion_gan::models::FusionNetworks;
use fusion_gan::train::{FusionTrainer, ImageFuser};
use fusion_gan::utils::{init_tracing_with_log_dir, parse_device};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser)]
#[command(name = "fusion-gan")]
#[command(about = "Infrared and visible image fusion with a generative adversarial network")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Train the generator and discriminator
    Train {
        /// Continue from the checkpoint of this epoch
        #[arg(long)]
        resume_epoch: Option<usize>,
    },
    /// Report losses of a checkpoint on whole-image test sets
    Evaluate {
        /// Epoch of the checkpoint to evaluate
        #[arg(long)]
        epoch: usize,
    },
    /// Fuse image pairs with a trained generator
    Fuse {
        /// Generator weights (G_{epoch}.safetensors)
        #[arg(long)]
        generator: PathBuf,

        /// Directory for the fused images
        #[arg(short, long)]
        output_dir: PathBuf,
    },
}

/// Options shared by every subcommand. Unset options keep the value from
/// `--config` or the built-in default.
#[derive(Args)]
struct CommonArgs {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mini-batch size
    #[arg(short, long, global = true)]
    batch_size: Option<usize>,

    /// Generator input patch size
    #[arg(short, long, global = true)]
    patch_size: Option<usize>,

    /// Label window size
    #[arg(short, long, global = true)]
    label_size: Option<usize>,

    /// Step between patch origins
    #[arg(short, long, global = true)]
    stride_size: Option<usize>,

    /// Number of training epochs
    #[arg(short, long, global = true)]
    epochs: Option<usize>,

    /// Directory for checkpoints and patch caches
    #[arg(short, long, global = true)]
    checkpoint_dir: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Epochs between loss reports and checkpoints
    #[arg(long, global = true)]
    log_interval: Option<usize>,

    /// Batches per generator update
    #[arg(long, global = true)]
    generator_interval: Option<usize>,

    /// Infrared image directory
    #[arg(long, global = true)]
    ir_dir: Option<PathBuf>,

    /// Visible image directory
    #[arg(long, global = true)]
    vi_dir: Option<PathBuf>,

    /// Device to use (e.g., 'auto', 'cpu', 'cuda', 'cuda:0')
    #[arg(long, global = true)]
    device: Option<String>,

    /// Seed for shuffling
    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl CommonArgs {
    fn resolve(&self) -> FusionResult<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        macro_rules! override_with {
            ($($field:ident => $($target:ident).+),* $(,)?) => {
                $(if let Some(value) = self.$field.clone() {
                    config.$($target).+ = value;
                })*
            };
        }
        override_with!(
            batch_size => batch_size,
            patch_size => patch.patch_size,
            label_size => patch.label_size,
            stride_size => patch.stride_size,
            epochs => epochs,
            checkpoint_dir => checkpoint_dir,
            log_dir => log_dir,
            log_interval => log_interval,
            generator_interval => generator_interval,
            ir_dir => ir_dir,
            vi_dir => vi_dir,
            device => device,
        );
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            error!("{}", message);
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> FusionResult<()> {
    let config = cli.common.resolve()?;
    init_tracing_with_log_dir(&config.log_dir)?;
    let device = parse_device(&config.device)?;
    info!("Using device {:?}", device);

    match cli.command {
        Command::Train { resume_epoch } => {
            let preparer = DatasetPreparer::new(config.patch, &config.checkpoint_dir)?;
            let ir = FusionDataset::open(&preparer, &config.ir_dir, ArchiveKind::Train)?;
            let vi = FusionDataset::open(&preparer, &config.vi_dir, ArchiveKind::Train)?;
            let mut loader =
                PairedLoader::new(&ir, &vi, config.batch_size, config.shuffle, config.seed)?;

            let nets = FusionNetworks::new(&config.model, &config.patch, &device)?;
            let mut trainer = FusionTrainer::new(config, nets)?;
            if let Some(epoch) = resume_epoch {
                trainer.resume(epoch)?;
            }
            let result = trainer.train(&mut loader)?;
            info!(
                "Training finished at epoch {} in {:.1}s, checkpoints: {:?}",
                result.final_epoch, result.elapsed_secs, result.checkpoints
            );
        }
        Command::Evaluate { epoch } => {
            let preparer = DatasetPreparer::new(config.patch, &config.checkpoint_dir)?;
            let ir = FusionDataset::open(&preparer, &config.ir_dir, ArchiveKind::Test)?;
            let vi = FusionDataset::open(&preparer, &config.vi_dir, ArchiveKind::Test)?;
            // Whole test images differ in size, so they cannot share a batch.
            let mut loader = PairedLoader::new(&ir, &vi, 1, false, None)?;

            let nets = FusionNetworks::new(&config.model, &config.patch, &device)?;
            let mut trainer = FusionTrainer::new(config, nets)?;
            trainer.load_checkpoint(epoch)?;
            let report = trainer.evaluate(&mut loader)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Fuse {
            generator,
            output_dir,
        } => {
            let fuser = ImageFuser::from_checkpoint(&config.model, config.patch, &generator, &device)?;
            let written = fuser.fuse_directories(&config.ir_dir, &config.vi_dir, &output_dir)?;
            info!("Fused {} image pairs", written.len());
        }
    }
    Ok(())
}
