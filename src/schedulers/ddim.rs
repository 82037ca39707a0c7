//! Denoising Diffusion Implicit Models, J. Song et al., 2020.
//! https://arxiv.org/abs/2010.02502

use burn::config::Config;
use burn::tensor::{backend::Backend, Distribution, Tensor};

use super::{BetaSchedule, DiffusionScheduler, NoiseSchedule, NoiseScheduleConfig};
use crate::error::{self, DiffusionError};
use crate::utils::ensure_same_shape;

/// The configuration for the DDIM scheduler.
#[derive(Config, Debug)]
pub struct DDIMSchedulerConfig {
    /// The value of beta at the beginning of training.
    #[config(default = 0.0001)]
    pub beta_start: f64,
    /// The value of beta at the end of training.
    #[config(default = 0.02)]
    pub beta_end: f64,
    /// How beta evolved during training.
    #[config(default = "BetaSchedule::Linear")]
    pub beta_schedule: BetaSchedule,
    /// The amount of noise to be added at each step, from 0 (deterministic)
    /// to 1 (as much as DDPM).
    #[config(default = 0.)]
    pub eta: f64,
    /// number of diffusion steps used to train the model
    #[config(default = 1000)]
    pub train_timesteps: usize,
    /// number of reverse steps taken at inference, must divide `train_timesteps`
    #[config(default = 50)]
    pub inference_timesteps: usize,
}

impl DDIMSchedulerConfig {
    pub fn init(&self) -> error::Result<DDIMScheduler> {
        let schedule = NoiseScheduleConfig::new()
            .with_total_timesteps(self.train_timesteps)
            .with_beta_start(self.beta_start)
            .with_beta_end(self.beta_end)
            .with_beta_schedule(self.beta_schedule)
            .init()?;

        let inference_steps = self.inference_timesteps;
        if inference_steps == 0 || inference_steps > self.train_timesteps {
            return Err(DiffusionError::config(format!(
                "inference_timesteps must be in 1..={}, got {inference_steps}",
                self.train_timesteps
            )));
        }
        if self.train_timesteps % inference_steps != 0 {
            return Err(DiffusionError::config(format!(
                "inference_timesteps ({inference_steps}) must divide train_timesteps ({})",
                self.train_timesteps
            )));
        }
        if !(0. ..=1.).contains(&self.eta) {
            return Err(DiffusionError::config(format!(
                "eta must be in [0, 1], got {}",
                self.eta
            )));
        }

        let step_ratio = self.train_timesteps / inference_steps;
        let timesteps = (0..inference_steps).map(|s| s * step_ratio).rev().collect();

        Ok(DDIMScheduler {
            timesteps,
            schedule,
            step_ratio,
            config: self.clone(),
        })
    }
}

/// Strided sampler whose stochasticity is set by `eta`.
#[derive(Debug, Clone)]
pub struct DDIMScheduler {
    timesteps: Vec<usize>,
    schedule: NoiseSchedule,
    step_ratio: usize,
    config: DDIMSchedulerConfig,
}

impl DDIMScheduler {
    pub fn config(&self) -> &DDIMSchedulerConfig {
        &self.config
    }

    /// Distance between two consecutive visited timesteps.
    pub fn step_ratio(&self) -> usize {
        self.step_ratio
    }

    // Perform a backward step
    pub fn step<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> error::Result<Tensor<B, D>> {
        self.schedule.check_timestep(timestep)?;
        ensure_same_shape(&sample, &model_output, "model output must match the sample shape")?;

        let alphas_cumprod = self.schedule.alphas_cumprod();
        let alpha_prod_t = alphas_cumprod[timestep];
        // Stepping below t = 0 lands on clean data, where alpha_bar is 1.
        let alpha_prod_t_prev = match timestep.checked_sub(self.step_ratio) {
            Some(prev_timestep) => alphas_cumprod[prev_timestep],
            None => 1.0,
        };
        let beta_prod_t = 1. - alpha_prod_t;

        let pred_original_sample = sample
            .sub(model_output.clone().mul_scalar(beta_prod_t.sqrt()))
            .div_scalar(alpha_prod_t.sqrt());
        let pred_epsilon = model_output;

        let variance = self.schedule.get_variance(timestep);
        let std_dev_t = self.config.eta * variance.sqrt();

        let direction_scale = (1. - alpha_prod_t_prev - std_dev_t * std_dev_t).max(0.).sqrt();
        let pred_sample_direction = pred_epsilon.mul_scalar(direction_scale);
        let prev_sample =
            pred_original_sample.mul_scalar(alpha_prod_t_prev.sqrt()) + pred_sample_direction;

        if self.config.eta > 0. {
            let noise = Tensor::random(
                prev_sample.shape(),
                Distribution::Normal(0., 1.),
                &prev_sample.device(),
            );
            Ok(prev_sample + noise.mul_scalar(std_dev_t))
        } else {
            Ok(prev_sample)
        }
    }
}

impl DiffusionScheduler for DDIMScheduler {
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
        DDIMScheduler::step(self, model_output, timestep, sample)
    }
}
