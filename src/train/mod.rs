//! Training, evaluation, and inference.
//!
//! [`FusionTrainer`] runs the adversarial loop over a [`PairedLoader`](crate::dataset::PairedLoader),
//! saving weights through a [`CheckpointStore`]. [`ImageFuser`] loads a saved
//! generator and fuses full-size image pairs.

pub mod checkpoint;
pub mod fusion;
pub mod losses;
pub mod result;
pub mod trainer;

pub use checkpoint::CheckpointStore;
pub use fusion::ImageFuser;
pub use losses::{GanLoss, GeneratorLoss};
pub use result::{EpochRecord, EvalReport, TrainResult};
pub use trainer::FusionTrainer;
