//! Training and evaluation result types

use serde::{Deserialize, Serialize};

/// Mean losses of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    /// Batches processed
    pub batches: usize,
    /// Mean discriminator loss over all batches
    pub d_loss: f32,
    /// Mean generator loss over generator steps, `None` if the generator never stepped
    pub g_loss: Option<f32>,
    /// Mean adversarial part of the generator loss
    pub g_adversarial: Option<f32>,
    /// Mean content part of the generator loss
    pub g_content: Option<f32>,
    /// Wall time of the epoch in seconds
    pub elapsed_secs: f64,
}

/// Result of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResult {
    /// Last epoch completed (1-based, 0 if none)
    pub final_epoch: usize,
    /// Per-epoch losses, including epochs restored on resume
    pub history: Vec<EpochRecord>,
    /// Epochs for which checkpoints were written in this run
    pub checkpoints: Vec<usize>,
    /// Total training time in seconds
    pub elapsed_secs: f64,
}

impl TrainResult {
    pub fn last(&self) -> Option<&EpochRecord> {
        self.history.last()
    }
}

/// Mean losses over an evaluation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub samples: usize,
    pub d_loss: f32,
    pub g_loss: f32,
    pub g_adversarial: f32,
    pub g_content: f32,
}

/// Running sums for averaging losses.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LossMeter {
    sum: f64,
    count: usize,
}

impl LossMeter {
    pub(crate) fn add(&mut self, value: f32) {
        self.sum += value as f64;
        self.count += 1;
    }

    pub(crate) fn mean(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}
