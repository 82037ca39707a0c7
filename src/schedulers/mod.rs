//! # Schedulers
//!
//! One shared [noise schedule](NoiseSchedule) and two interchangeable reverse
//! transitions built on top of it: ancestral DDPM steps and strided DDIM steps.

pub mod ddim;
pub mod ddpm;
pub mod schedule;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

pub use ddim::{DDIMScheduler, DDIMSchedulerConfig};
pub use ddpm::{DDPMScheduler, DDPMSchedulerConfig};
pub use schedule::{NoiseSchedule, NoiseScheduleConfig};

use crate::error::Result;

/// This represents how beta ranges from its minimum value to the maximum
/// during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetaSchedule {
    /// Linear interpolation.
    Linear,
    /// Linear interpolation of the square root of beta.
    ScaledLinear,
}

/// A reverse diffusion transition.
///
/// Implementations walk [`timesteps`](DiffusionScheduler::timesteps) in order,
/// feeding each output back as the next `sample`.
pub trait DiffusionScheduler {
    /// The schedule the transition reads its coefficients from.
    fn schedule(&self) -> &NoiseSchedule;

    /// The strictly decreasing timesteps visited by a full reverse pass.
    fn timesteps(&self) -> &[usize];

    /// Maps `x_t` to the sample at the next visited timestep.
    fn step<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> Result<Tensor<B, D>>;
}

/// Either of the two reverse transitions, picked at runtime.
#[derive(Debug, Clone)]
pub enum Scheduler {
    Ddpm(DDPMScheduler),
    Ddim(DDIMScheduler),
}

impl DiffusionScheduler for Scheduler {
    fn schedule(&self) -> &NoiseSchedule {
        match self {
            Scheduler::Ddpm(scheduler) => scheduler.schedule(),
            Scheduler::Ddim(scheduler) => scheduler.schedule(),
        }
    }

    fn timesteps(&self) -> &[usize] {
        match self {
            Scheduler::Ddpm(scheduler) => scheduler.timesteps(),
            Scheduler::Ddim(scheduler) => scheduler.timesteps(),
        }
    }

    fn step<B: Backend, const D: usize>(
        &self,
        model_output: Tensor<B, D>,
        timestep: usize,
        sample: Tensor<B, D>,
    ) -> Result<Tensor<B, D>> {
        match self {
            Scheduler::Ddpm(scheduler) => scheduler.step(model_output, timestep, sample),
            Scheduler::Ddim(scheduler) => scheduler.step(model_output, timestep, sample),
        }
    }
}

impl From<DDPMScheduler> for Scheduler {
    fn from(scheduler: DDPMScheduler) -> Self {
        Scheduler::Ddpm(scheduler)
    }
}

impl From<DDIMScheduler> for Scheduler {
    fn from(scheduler: DDIMScheduler) -> Self {
        Scheduler::Ddim(scheduler)
    }
}
