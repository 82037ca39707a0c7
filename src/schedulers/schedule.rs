//! Noise schedule shared by every reverse process.
//!
//! All coefficients are computed once on the host in `f64` and are never
//! mutated afterwards.

use burn::config::Config;
use burn::tensor::{backend::Backend, Tensor};

use super::BetaSchedule;
use crate::error::{self, DiffusionError};
use crate::utils::{ensure_same_shape, per_example_coefficients};

/// Lower bound for the posterior variance of non terminal steps.
pub const MIN_VARIANCE: f64 = 1e-20;

/// The configuration of a [noise schedule](NoiseSchedule).
#[derive(Config, Debug)]
pub struct NoiseScheduleConfig {
    /// Number of diffusion steps used to train the model.
    #[config(default = 1000)]
    pub total_timesteps: usize,
    /// The value of beta at the beginning of training.
    #[config(default = 0.0001)]
    pub beta_start: f64,
    /// The value of beta at the end of training.
    #[config(default = 0.02)]
    pub beta_end: f64,
    /// How beta evolves during training.
    #[config(default = "BetaSchedule::Linear")]
    pub beta_schedule: BetaSchedule,
}

impl NoiseScheduleConfig {
    /// Checks the bounds and precomputes every coefficient.
    pub fn init(&self) -> error::Result<NoiseSchedule> {
        if self.total_timesteps < 1 {
            return Err(DiffusionError::config(
                "total_timesteps must be at least 1",
            ));
        }
        let in_unit = |beta: f64| beta > 0. && beta < 1.;
        if !in_unit(self.beta_start) || !in_unit(self.beta_end) || self.beta_start >= self.beta_end
        {
            return Err(DiffusionError::config(format!(
                "expected 0 < beta_start < beta_end < 1, got beta_start={} beta_end={}",
                self.beta_start, self.beta_end
            )));
        }

        let betas = match self.beta_schedule {
            BetaSchedule::Linear => linspace(self.beta_start, self.beta_end, self.total_timesteps),
            BetaSchedule::ScaledLinear => linspace(
                self.beta_start.sqrt(),
                self.beta_end.sqrt(),
                self.total_timesteps,
            )
            .into_iter()
            .map(|b| b * b)
            .collect(),
        };

        let schedule = NoiseSchedule::from_betas(betas);
        if let Some(timestep) = schedule.first_degenerate_timestep() {
            return Err(DiffusionError::config(format!(
                "betas from {} to {} over {} steps drive alpha_bar to {:e} at timestep {timestep}",
                self.beta_start,
                self.beta_end,
                self.total_timesteps,
                schedule.alphas_cumprod[timestep]
            )));
        }

        Ok(schedule)
    }
}

/// Precomputed coefficients of a discrete diffusion process.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
    alphas_cumprod_prev: Vec<f64>,
    sqrt_alphas_cumprod: Vec<f64>,
    sqrt_one_minus_alphas_cumprod: Vec<f64>,
    sqrt_inv_alphas_cumprod: Vec<f64>,
    sqrt_inv_alphas_cumprod_minus_one: Vec<f64>,
    posterior_mean_coef1: Vec<f64>,
    posterior_mean_coef2: Vec<f64>,
}

impl NoiseSchedule {
    fn from_betas(betas: Vec<f64>) -> Self {
        let alphas: Vec<f64> = betas.iter().map(|beta| 1. - beta).collect();

        let mut alphas_cumprod = Vec::with_capacity(alphas.len());
        for alpha in &alphas {
            alphas_cumprod.push(alpha * alphas_cumprod.last().copied().unwrap_or(1.0));
        }

        let alphas_cumprod_prev: Vec<f64> = core::iter::once(1.0)
            .chain(alphas_cumprod[..alphas_cumprod.len() - 1].iter().copied())
            .collect();

        let sqrt_alphas_cumprod = alphas_cumprod.iter().map(|a| a.sqrt()).collect();
        let sqrt_one_minus_alphas_cumprod = alphas_cumprod.iter().map(|a| (1. - a).sqrt()).collect();
        let sqrt_inv_alphas_cumprod = alphas_cumprod.iter().map(|a| (1. / a).sqrt()).collect();
        let sqrt_inv_alphas_cumprod_minus_one =
            alphas_cumprod.iter().map(|a| (1. / a - 1.).sqrt()).collect();

        let mut posterior_mean_coef1 = Vec::with_capacity(betas.len());
        let mut posterior_mean_coef2 = Vec::with_capacity(betas.len());
        for t in 0..betas.len() {
            let denominator = 1. - alphas_cumprod[t];
            posterior_mean_coef1.push(betas[t] * alphas_cumprod_prev[t].sqrt() / denominator);
            posterior_mean_coef2
                .push((1. - alphas_cumprod_prev[t]) * alphas[t].sqrt() / denominator);
        }

        Self {
            betas,
            alphas,
            alphas_cumprod,
            alphas_cumprod_prev,
            sqrt_alphas_cumprod,
            sqrt_one_minus_alphas_cumprod,
            sqrt_inv_alphas_cumprod,
            sqrt_inv_alphas_cumprod_minus_one,
            posterior_mean_coef1,
            posterior_mean_coef2,
        }
    }

    /// First timestep where alpha_bar underflowed to zero or a derived
    /// coefficient is not finite.
    fn first_degenerate_timestep(&self) -> Option<usize> {
        (0..self.total_timesteps()).find(|&t| {
            let coefficients = [
                self.sqrt_inv_alphas_cumprod[t],
                self.sqrt_inv_alphas_cumprod_minus_one[t],
                self.posterior_mean_coef1[t],
                self.posterior_mean_coef2[t],
            ];
            self.alphas_cumprod[t] <= 0. || coefficients.iter().any(|c| !c.is_finite())
        })
    }

    pub fn total_timesteps(&self) -> usize {
        self.betas.len()
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    pub fn alphas_cumprod(&self) -> &[f64] {
        &self.alphas_cumprod
    }

    pub fn alphas_cumprod_prev(&self) -> &[f64] {
        &self.alphas_cumprod_prev
    }

    pub fn sqrt_alphas_cumprod(&self) -> &[f64] {
        &self.sqrt_alphas_cumprod
    }

    pub fn sqrt_one_minus_alphas_cumprod(&self) -> &[f64] {
        &self.sqrt_one_minus_alphas_cumprod
    }

    pub fn sqrt_inv_alphas_cumprod(&self) -> &[f64] {
        &self.sqrt_inv_alphas_cumprod
    }

    pub fn sqrt_inv_alphas_cumprod_minus_one(&self) -> &[f64] {
        &self.sqrt_inv_alphas_cumprod_minus_one
    }

    pub fn posterior_mean_coef1(&self) -> &[f64] {
        &self.posterior_mean_coef1
    }

    pub fn posterior_mean_coef2(&self) -> &[f64] {
        &self.posterior_mean_coef2
    }

    pub(crate) fn check_timestep(&self, timestep: usize) -> error::Result<()> {
        if timestep >= self.total_timesteps() {
            return Err(DiffusionError::TimestepOutOfRange {
                timestep,
                total: self.total_timesteps(),
            });
        }
        Ok(())
    }

    /// Variance of the posterior `q(x_{t-1} | x_t, x_0)`.
    ///
    /// Exactly zero at the terminal step, clipped to [`MIN_VARIANCE`] otherwise.
    pub fn get_variance(&self, timestep: usize) -> f64 {
        if timestep == 0 {
            return 0.;
        }

        let variance = self.betas[timestep] * (1. - self.alphas_cumprod_prev[timestep])
            / (1. - self.alphas_cumprod[timestep]);
        variance.max(MIN_VARIANCE)
    }

    /// Samples `q(x_t | x_0)` in closed form, with one timestep per example.
    ///
    /// `x_t = sqrt(alpha_bar_t) * x_0 + sqrt(1 - alpha_bar_t) * noise`
    pub fn add_noise<B: Backend, const D: usize>(
        &self,
        original: Tensor<B, D>,
        noise: Tensor<B, D>,
        timesteps: &[usize],
    ) -> error::Result<Tensor<B, D>> {
        ensure_same_shape(&original, &noise, "noise must match the sample shape")?;
        let batch_size = original.dims()[0];
        if timesteps.len() != batch_size {
            return Err(DiffusionError::shape(format!(
                "got {} timesteps for a batch of {batch_size} samples",
                timesteps.len()
            )));
        }

        let mut signal = Vec::with_capacity(batch_size);
        let mut noise_level = Vec::with_capacity(batch_size);
        for &t in timesteps {
            self.check_timestep(t)?;
            signal.push(self.sqrt_alphas_cumprod[t]);
            noise_level.push(self.sqrt_one_minus_alphas_cumprod[t]);
        }

        let device = original.device();
        let signal = per_example_coefficients::<B, D>(&signal, &device);
        let noise_level = per_example_coefficients::<B, D>(&noise_level, &device);

        Ok(original * signal + noise * noise_level)
    }
}

/// `num_steps` evenly spaced values from `start` to `end`, both included.
fn linspace(start: f64, end: f64, num_steps: usize) -> Vec<f64> {
    if num_steps == 1 {
        return vec![start];
    }
    let step_size = (end - start) / (num_steps - 1) as f64;
    (0..num_steps).map(|i| start + step_size * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Data;

    fn default_schedule() -> NoiseSchedule {
        NoiseScheduleConfig::new().init().unwrap()
    }

    #[test]
    fn test_linear_schedule_endpoints() {
        let schedule = default_schedule();

        assert_eq!(schedule.total_timesteps(), 1000);
        assert!((schedule.betas()[0] - 1e-4).abs() < 1e-12);
        assert!((schedule.betas()[999] - 0.02).abs() < 1e-12);
        assert!((schedule.alphas_cumprod()[0] - 0.9999).abs() < 1e-12);
        assert!(schedule.alphas_cumprod()[999] < 1e-4);
    }

    #[test]
    fn test_alphas_cumprod_non_increasing_in_unit_interval() {
        for config in [
            NoiseScheduleConfig::new(),
            NoiseScheduleConfig::new()
                .with_total_timesteps(10)
                .with_beta_start(0.1)
                .with_beta_end(0.9),
            NoiseScheduleConfig::new()
                .with_total_timesteps(1)
                .with_beta_schedule(BetaSchedule::ScaledLinear),
        ] {
            let schedule = config.init().unwrap();
            let alphas_cumprod = schedule.alphas_cumprod();

            assert!(alphas_cumprod.iter().all(|a| *a > 0. && *a <= 1.));
            assert!(alphas_cumprod.windows(2).all(|w| w[1] <= w[0]));
            assert_eq!(schedule.alphas_cumprod_prev()[0], 1.0);
        }
    }

    #[test]
    fn test_derived_coefficients() {
        let schedule = default_schedule();

        for t in [1, 500, 999] {
            let a = schedule.alphas_cumprod()[t];
            assert_eq!(schedule.alphas_cumprod_prev()[t], schedule.alphas_cumprod()[t - 1]);
            assert!((schedule.sqrt_inv_alphas_cumprod()[t] - (1. / a).sqrt()).abs() < 1e-9);
            assert!(
                (schedule.sqrt_inv_alphas_cumprod_minus_one()[t] - (1. / a - 1.).sqrt()).abs()
                    < 1e-9
            );
        }
        // At t = 0 the posterior collapses onto the predicted clean sample.
        assert!((schedule.posterior_mean_coef1()[0] - 1.).abs() < 1e-9);
        assert_eq!(schedule.posterior_mean_coef2()[0], 0.);
    }

    #[test]
    fn test_variance() {
        let schedule = default_schedule();

        assert_eq!(schedule.get_variance(0), 0.);
        for t in 1..schedule.total_timesteps() {
            let variance = schedule.get_variance(t);
            assert!(variance >= MIN_VARIANCE);
            assert!(variance <= schedule.betas()[t]);
        }
    }

    #[test]
    fn test_invalid_configs() {
        let invalid = [
            NoiseScheduleConfig::new().with_total_timesteps(0),
            NoiseScheduleConfig::new().with_beta_start(0.02).with_beta_end(0.02),
            NoiseScheduleConfig::new().with_beta_start(0.03),
            NoiseScheduleConfig::new().with_beta_start(0.),
            NoiseScheduleConfig::new().with_beta_end(1.),
        ];

        for config in invalid {
            assert!(matches!(config.init(), Err(DiffusionError::Configuration(_))));
        }
    }

    #[test]
    fn test_underflowing_alphas_cumprod_is_rejected() {
        let config = NoiseScheduleConfig::new()
            .with_total_timesteps(1000)
            .with_beta_start(0.5)
            .with_beta_end(0.99);

        assert!(matches!(config.init(), Err(DiffusionError::Configuration(_))));

        // Same bounds over a short horizon keep alpha_bar representable.
        let schedule = config.with_total_timesteps(20).init().unwrap();
        assert!(schedule.alphas_cumprod().iter().all(|a| *a > 0.));
        assert!(schedule.sqrt_inv_alphas_cumprod().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_add_noise_without_noise_scales_sample() {
        let device = <TestBackend as Backend>::Device::default();
        let schedule = default_schedule();

        let original: Tensor<TestBackend, 2> = Tensor::from_floats([[1., 1.]], &device);
        let noise: Tensor<TestBackend, 2> = Tensor::zeros([1, 2], &device);

        let noisy = schedule.add_noise(original, noise, &[0]).unwrap();

        let expected = schedule.sqrt_alphas_cumprod()[0] as f32;
        noisy
            .to_data()
            .assert_approx_eq(&Data::from([[expected, expected]]), 5);
    }

    #[test]
    fn test_add_noise_per_example_timesteps() {
        let device = <TestBackend as Backend>::Device::default();
        let schedule = default_schedule();

        let original: Tensor<TestBackend, 2> = Tensor::from_floats([[1., 2.], [1., 2.]], &device);
        let noise: Tensor<TestBackend, 2> = Tensor::ones([2, 2], &device);

        let noisy = schedule.add_noise(original, noise, &[0, 999]).unwrap();

        let [s0, s1] = [schedule.sqrt_alphas_cumprod()[0], schedule.sqrt_alphas_cumprod()[999]];
        let [n0, n1] = [
            schedule.sqrt_one_minus_alphas_cumprod()[0],
            schedule.sqrt_one_minus_alphas_cumprod()[999],
        ];
        noisy.to_data().assert_approx_eq(
            &Data::from([
                [(s0 + n0) as f32, (2. * s0 + n0) as f32],
                [(s1 + n1) as f32, (2. * s1 + n1) as f32],
            ]),
            4,
        );
    }

    #[test]
    fn test_add_noise_rejects_bad_inputs() {
        let device = <TestBackend as Backend>::Device::default();
        let schedule = default_schedule();
        let original: Tensor<TestBackend, 2> = Tensor::zeros([2, 2], &device);

        let result = schedule.add_noise(original.clone(), Tensor::zeros([3, 2], &device), &[0, 1]);
        assert!(matches!(result, Err(DiffusionError::Shape(_))));

        let result = schedule.add_noise(original.clone(), Tensor::zeros([2, 2], &device), &[0]);
        assert!(matches!(result, Err(DiffusionError::Shape(_))));

        let result = schedule.add_noise(original, Tensor::zeros([2, 2], &device), &[0, 1000]);
        assert!(matches!(
            result,
            Err(DiffusionError::TimestepOutOfRange { timestep: 1000, total: 1000 })
        ));
    }
}
