//! # Training
//!
//! Fitting noise predictors by denoising score matching.

mod trainer;

pub use trainer::{Trainer, TrainingConfig};

use burn::tensor::backend::AutodiffBackend;

use crate::data::PointCloud;
use crate::error::Result;
use crate::models::{ScoreNetwork, ScoreNetworkConfig};
use crate::monitor::TrainingMonitor;
use crate::schedulers::Scheduler;

#[derive(Debug)]
pub struct TrainingOutput<B: AutodiffBackend> {
    pub model: ScoreNetwork<B>,
    pub losses: Vec<f64>,
}

/// Builds a fresh network with Adam and trains it on `data`.
pub fn train<B: AutodiffBackend, M: TrainingMonitor>(
    network: &ScoreNetworkConfig,
    scheduler: impl Into<Scheduler>,
    config: TrainingConfig,
    data: &PointCloud,
    monitor: &mut M,
    device: &B::Device,
) -> Result<TrainingOutput<B>> {
    B::seed(config.seed);
    let model = network.init::<B>(device);
    let optim = config.optimizer.init();

    let mut trainer = Trainer::new(model, optim, scheduler, config)?;
    let losses = trainer.fit(data, monitor, device)?.to_vec();

    Ok(TrainingOutput {
        model: trainer.into_model(),
        losses,
    })
}
