//! Denoising score matching.

use burn::config::Config;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, ElementConversion, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::data::{CyclicBatcher, PointCloud};
use crate::error::{self, DiffusionError};
use crate::models::{NoisePredictor, ScoreNetwork};
use crate::monitor::TrainingMonitor;
use crate::pipelines::sample;
use crate::schedulers::{DiffusionScheduler, Scheduler};

/// Training configuration.
#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    #[config(default = 1000)]
    pub num_iterations: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Run a full reverse pass every this many iterations, 0 to never sample.
    #[config(default = 10000)]
    pub sample_every: usize,
    /// Number of points generated by each monitoring pass.
    #[config(default = 500)]
    pub monitor_samples: usize,
    #[config(default = 1000)]
    pub log_every: usize,
    #[config(default = false)]
    pub progress_bar: bool,
}

impl TrainingConfig {
    fn validate(&self) -> error::Result<()> {
        if self.num_iterations == 0 {
            return Err(DiffusionError::config("num_iterations must be positive"));
        }
        if self.batch_size == 0 {
            return Err(DiffusionError::config("batch_size must be positive"));
        }
        if !(self.learning_rate > 0. && self.learning_rate.is_finite()) {
            return Err(DiffusionError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.sample_every > 0 && self.monitor_samples == 0 {
            return Err(DiffusionError::config(
                "monitor_samples must be positive when sampling is enabled",
            ));
        }
        Ok(())
    }
}

/// Fits a [score network](ScoreNetwork) to predict the noise injected by the
/// forward process of `scheduler`.
pub struct Trainer<B: AutodiffBackend, O> {
    model: ScoreNetwork<B>,
    optim: O,
    scheduler: Scheduler,
    config: TrainingConfig,
    rng: StdRng,
    losses: Vec<f64>,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ScoreNetwork<B>, B>,
{
    pub fn new(
        model: ScoreNetwork<B>,
        optim: O,
        scheduler: impl Into<Scheduler>,
        config: TrainingConfig,
    ) -> error::Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            model,
            optim,
            scheduler: scheduler.into(),
            config,
            rng,
            losses: Vec::new(),
        })
    }

    pub fn model(&self) -> &ScoreNetwork<B> {
        &self.model
    }

    pub fn into_model(self) -> ScoreNetwork<B> {
        self.model
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Loss of every optimization step taken so far.
    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    /// One timestep per example, uniform over the whole schedule.
    pub fn sample_timesteps(&mut self, batch_size: usize) -> Vec<usize> {
        let total = self.scheduler.schedule().total_timesteps();
        (0..batch_size).map(|_| self.rng.gen_range(0..total)).collect()
    }

    /// Takes one optimization step on `clean` with freshly drawn timesteps and
    /// noise, returning the loss before the update.
    pub fn train_step(&mut self, clean: Tensor<B, 2>) -> error::Result<f64> {
        let [batch_size, data_dim] = clean.dims();
        let timesteps = self.sample_timesteps(batch_size);
        let noise = Tensor::random(
            [batch_size, data_dim],
            Distribution::Normal(0., 1.),
            &clean.device(),
        );

        self.train_step_with(clean, &timesteps, noise)
    }

    /// Takes one optimization step with the given timesteps and noise.
    ///
    /// A non finite loss is reported before any parameter is touched.
    pub fn train_step_with(
        &mut self,
        clean: Tensor<B, 2>,
        timesteps: &[usize],
        noise: Tensor<B, 2>,
    ) -> error::Result<f64> {
        let noisy = self
            .scheduler
            .schedule()
            .add_noise(clean, noise.clone(), timesteps)?;
        let predicted_noise = self.model.predict(noisy, timesteps);

        let loss = MseLoss::new().forward(predicted_noise, noise, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(DiffusionError::NumericInstability {
                context: format!("training loss at step {}", self.losses.len()),
                value: loss_value,
            });
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optim
            .step(self.config.learning_rate, self.model.clone(), grads);
        self.losses.push(loss_value);

        Ok(loss_value)
    }

    /// Full reverse pass on the inference copy of the current model.
    pub fn generate(
        &self,
        num_samples: usize,
        device: &B::Device,
    ) -> error::Result<Tensor<B::InnerBackend, 2>> {
        let model = self.model.valid();
        let output = sample(&model, &self.scheduler, num_samples, false, device)?;
        Ok(output.sample)
    }

    /// Runs `num_iterations` steps over cyclic shuffled batches of `data`.
    pub fn fit<M: TrainingMonitor>(
        &mut self,
        data: &PointCloud,
        monitor: &mut M,
        device: &B::Device,
    ) -> error::Result<&[f64]> {
        if data.dim() != self.model.data_dim() {
            return Err(DiffusionError::shape(format!(
                "model expects {}-dimensional points, dataset has {}",
                self.model.data_dim(),
                data.dim()
            )));
        }

        B::seed(self.config.seed);
        let mut batcher =
            CyclicBatcher::new(data, self.config.batch_size, self.config.seed.wrapping_add(1))?;

        let progress = if self.config.progress_bar {
            let progress = ProgressBar::new(self.config.num_iterations as u64);
            progress.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            progress
        } else {
            ProgressBar::hidden()
        };

        info!(
            num_iterations = self.config.num_iterations,
            batch_size = self.config.batch_size,
            dataset_size = data.len(),
            "starting training"
        );

        for iteration in 0..self.config.num_iterations {
            let clean = batcher.next_batch::<B>(device);
            let loss = self.train_step(clean)?;

            if self.config.log_every > 0 && iteration % self.config.log_every == 0 {
                info!(iteration, loss, epoch = batcher.epoch(), "training");
            }

            if self.config.sample_every > 0 && iteration % self.config.sample_every == 0 {
                debug!(iteration, "sampling for monitoring");
                let samples = self.generate(self.config.monitor_samples, device)?;
                monitor.on_samples(iteration, data, &PointCloud::from_tensor(samples)?)?;
            }

            progress.set_message(format!("loss: {loss:.6}"));
            progress.inc(1);
        }
        progress.finish_and_clear();

        monitor.on_finish(&self.losses)?;
        info!(
            final_loss = self.losses.last().copied().unwrap_or(f64::NAN),
            "training complete"
        );

        Ok(&self.losses)
    }
}
