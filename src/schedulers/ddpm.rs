//! Denoising Diffusion Probabilistic Models, J. Ho et al., 2020.
//! https://arxiv.org/abs/2006.11239

use burn::config::Config;
use burn::tensor::{backend::Backend, Distribution, Tensor};

use super::{BetaSchedule, DiffusionScheduler, NoiseSchedule, NoiseScheduleConfig};
use crate::error;
use crate::utils::ensure_same_shape;

/// The configuration for the DDPM scheduler.
#[derive(Config, Debug)]
pub struct DDPMSchedulerConfig {
    /// The value of beta at the beginning of training.
    #[config(default = 0.0001)]
    pub beta_start: f64,
    /// The value of beta at the end of training.
    #[config(default = 0.02)]
    pub beta_end: f64,
    /// How beta evolved during training.
    #[config(default = "BetaSchedule::Linear")]
    pub beta_schedule: BetaSchedule,
    /// number of diffusion steps used to train the model
    #[config(default = 1000)]
    pub train_timesteps: usize,
}

impl DDPMSchedulerConfig {
    pub fn init(&self) -> error::Result<DDPMScheduler> {
        let schedule = NoiseScheduleConfig::new()
            .with_total_timesteps(self.train_timesteps)
            .with_beta_start(self.beta_start)
            .with_beta_end(self.beta_end)
            .with_beta_schedule(self.beta_schedule)
            .init()?;
        let timesteps = (0..self.train_timesteps).rev().collect();

        Ok(DDPMScheduler {
            timesteps,
            schedule,
            config: self.clone(),
        })
    }
}

/// Ancestral sampler visiting every training timestep from `T - 1` down to `0`.
#[derive(Debug, Clone)]
pub struct DDPMScheduler {
    timesteps: Vec<usize>,
    schedule: NoiseSchedule,
    config: DDPMSchedulerConfig,
}

impl DDPMScheduler {
    pub fn config(&self) -> &DDPMSchedulerConfig {
        &self.config
    }

    /// Reconstructs `x_0` from `x_t` and the predicted noise.
    pub fn predict_original_sample<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> error::Result<Tensor<B, D>> {
        self.schedule.check_timestep(timestep)?;
        ensure_same_shape(&sample, &model_output, "model output must match the sample shape")?;

        let s1 = self.schedule.sqrt_inv_alphas_cumprod()[timestep];
        let s2 = self.schedule.sqrt_inv_alphas_cumprod_minus_one()[timestep];

        Ok(sample.mul_scalar(s1) - model_output.mul_scalar(s2))
    }

    /// Mean of `q(x_{t-1} | x_t, x_0)` with `x_0` reconstructed from the
    /// predicted noise.
    pub fn posterior_mean<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> error::Result<Tensor<B, D>> {
        let pred_original_sample =
            self.predict_original_sample(model_output, timestep, sample.clone())?;

        let s1 = self.schedule.posterior_mean_coef1()[timestep];
        let s2 = self.schedule.posterior_mean_coef2()[timestep];

        Ok(pred_original_sample.mul_scalar(s1) + sample.mul_scalar(s2))
    }

    // Perform a backward step
    pub fn step<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> error::Result<Tensor<B, D>> {
        let prev_sample = self.posterior_mean(model_output, timestep, sample)?;

        if timestep == 0 {
            return Ok(prev_sample);
        }

        let std_dev_t = self.schedule.get_variance(timestep).sqrt();
        let noise = Tensor::random(
            prev_sample.shape(),
            Distribution::Normal(0., 1.),
            &prev_sample.device(),
        );

        Ok(prev_sample + noise.mul_scalar(std_dev_t))
    }
}

impl DiffusionScheduler for DDPMScheduler {
    fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    fn timesteps(&self) -> &[usize] {
        self.timesteps.as_slice()
    }

    fn step<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> error::Result<Tensor<B, D>> {
        DDPMScheduler::step(self, model_output, timestep, sample)
    }
}
