use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use tracing::debug;

use crate::error::{DiffusionError, Result};
use crate::models::NoisePredictor;
use crate::schedulers::DiffusionScheduler;
use crate::utils::{ensure_finite, ensure_same_shape};

/// Result of a full reverse pass.
#[derive(Debug, Clone)]
pub struct SamplingOutput<B: Backend> {
    /// `[num_samples, data_dim]` points at timestep 0.
    pub sample: Tensor<B, 2>,
    /// The sample after each visited timestep, empty unless requested.
    pub trajectory: Vec<Tensor<B, 2>>,
}

/// Draws `num_samples` points by denoising standard normal noise.
///
/// The predictor is only read, pass the inference copy of a trained module
/// (`AutodiffModule::valid`) so that no gradient graph is recorded.
pub fn sample<B, P, S>(
    predictor: &P,
    scheduler: &S,
    num_samples: usize,
    record_trajectory: bool,
    device: &B::Device,
) -> Result<SamplingOutput<B>>
where
    B: Backend,
    P: NoisePredictor<B>,
    S: DiffusionScheduler,
{
    if num_samples == 0 {
        return Err(DiffusionError::config("num_samples must be positive"));
    }
    let initial = Tensor::random(
        [num_samples, predictor.data_dim()],
        Distribution::Normal(0., 1.),
        device,
    );

    denoise(predictor, scheduler, initial, record_trajectory)
}

/// Walks `initial` through every timestep of the scheduler, from the noisiest
/// one down to `0`.
pub fn denoise<B, P, S>(
    predictor: &P,
    scheduler: &S,
    initial: Tensor<B, 2>,
    record_trajectory: bool,
) -> Result<SamplingOutput<B>>
where
    B: Backend,
    P: NoisePredictor<B>,
    S: DiffusionScheduler,
{
    let [num_samples, data_dim] = initial.dims();
    if data_dim != predictor.data_dim() {
        return Err(DiffusionError::shape(format!(
            "predictor expects {}-dimensional points, got {data_dim}",
            predictor.data_dim()
        )));
    }

    let timesteps = scheduler.timesteps();
    debug!(
        num_samples,
        num_steps = timesteps.len(),
        "running reverse diffusion"
    );

    let mut trajectory = Vec::with_capacity(if record_trajectory { timesteps.len() } else { 0 });
    let mut sample = initial;
    for &timestep in timesteps {
        let batch_timesteps = vec![timestep; num_samples];
        let model_output = predictor.predict(sample.clone(), &batch_timesteps);
        ensure_same_shape(&sample, &model_output, "predicted noise must match the sample")?;

        sample = scheduler.step(model_output, timestep, sample)?;
        if record_trajectory {
            trajectory.push(sample.clone());
        }
    }

    ensure_finite(&sample, "generated samples")?;

    Ok(SamplingOutput { sample, trajectory })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreNetworkConfig;
    use crate::schedulers::{DDIMSchedulerConfig, DDPMSchedulerConfig, Scheduler};
    use crate::TestBackend;
    use burn::tensor::Data;

    /// Predicts a fixed fraction of the sample.
    struct ScaledIdentity;

    impl<B: Backend> NoisePredictor<B> for ScaledIdentity {
        fn data_dim(&self) -> usize {
            2
        }

        fn predict(&self, samples: Tensor<B, 2>, _timesteps: &[usize]) -> Tensor<B, 2> {
            samples.mul_scalar(0.5)
        }
    }

    struct WrongShape;

    impl<B: Backend> NoisePredictor<B> for WrongShape {
        fn data_dim(&self) -> usize {
            2
        }

        fn predict(&self, samples: Tensor<B, 2>, _timesteps: &[usize]) -> Tensor<B, 2> {
            let [n, _] = samples.dims();
            Tensor::zeros([n, 3], &samples.device())
        }
    }

    #[test]
    fn test_trajectory_has_one_entry_per_step() {
        let device = <TestBackend as Backend>::Device::default();
        let scheduler = DDIMSchedulerConfig::new()
            .with_train_timesteps(100)
            .with_inference_timesteps(10)
            .init()
            .unwrap();

        let output = sample::<TestBackend, _, _>(&ScaledIdentity, &scheduler, 8, true, &device)
            .unwrap();

        assert_eq!(output.trajectory.len(), 10);
        assert_eq!(output.sample.dims(), [8, 2]);
        output
            .trajectory
            .last()
            .unwrap()
            .to_data()
            .assert_approx_eq(&output.sample.to_data(), 6);
    }

    #[test]
    fn test_trajectory_skipped_unless_requested() {
        let device = <TestBackend as Backend>::Device::default();
        let scheduler: Scheduler = DDPMSchedulerConfig::new()
            .with_train_timesteps(20)
            .init()
            .unwrap()
            .into();

        let output = sample::<TestBackend, _, _>(&ScaledIdentity, &scheduler, 4, false, &device)
            .unwrap();

        assert!(output.trajectory.is_empty());
    }

    #[test]
    fn test_ddim_denoise_is_reproducible() {
        let device = <TestBackend as Backend>::Device::default();
        let scheduler = DDIMSchedulerConfig::new().init().unwrap();
        let network = ScoreNetworkConfig::new()
            .with_hidden_size(8)
            .init::<TestBackend>(&device);
        let initial: Tensor<TestBackend, 2> =
            Tensor::from_floats([[0.5, -1.], [1.5, 0.2]], &device);

        let first = denoise(&network, &scheduler, initial.clone(), false).unwrap();
        let second = denoise(&network, &scheduler, initial, false).unwrap();

        assert_eq!(first.sample.into_data().value, second.sample.into_data().value);
    }

    #[test]
    fn test_rejects_mismatched_predictor() {
        let device = <TestBackend as Backend>::Device::default();
        let scheduler = DDPMSchedulerConfig::new()
            .with_train_timesteps(10)
            .init()
            .unwrap();

        let result = sample::<TestBackend, _, _>(&WrongShape, &scheduler, 4, false, &device);
        assert!(matches!(result, Err(DiffusionError::Shape(_))));

        let initial: Tensor<TestBackend, 2> = Tensor::zeros([4, 3], &device);
        let result = denoise(&ScaledIdentity, &scheduler, initial, false);
        assert!(matches!(result, Err(DiffusionError::Shape(_))));

        let result = sample::<TestBackend, _, _>(&ScaledIdentity, &scheduler, 0, false, &device);
        assert!(matches!(result, Err(DiffusionError::Configuration(_))));
    }

    #[test]
    fn test_deterministic_ddim_from_zero_noise_stays_at_origin() {
        let device = <TestBackend as Backend>::Device::default();
        let scheduler = DDIMSchedulerConfig::new()
            .with_inference_timesteps(20)
            .init()
            .unwrap();
        let initial: Tensor<TestBackend, 2> = Tensor::zeros([3, 2], &device);

        let output = denoise(&ScaledIdentity, &scheduler, initial, false).unwrap();

        output
            .sample
            .to_data()
            .assert_approx_eq(&Data::from([[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]]), 5);
    }
}
