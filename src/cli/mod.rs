pub mod sample;
pub mod train;

#[cfg(feature = "wgpu")]
pub type Backend = burn::backend::Wgpu;

#[cfg(all(feature = "torch", not(feature = "wgpu")))]
pub type Backend = burn::backend::LibTorch<f32>;

#[cfg(all(feature = "ndarray", not(any(feature = "torch", feature = "wgpu"))))]
pub type Backend = burn::backend::NdArray<f32>;

pub type TrainBackend = burn::backend::Autodiff<Backend>;

pub type Device = <Backend as burn::tensor::backend::Backend>::Device;

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum BetaScheduleArg {
    Linear,
    ScaledLinear,
}

impl From<BetaScheduleArg> for toy_diffusion_burn::schedulers::BetaSchedule {
    fn from(value: BetaScheduleArg) -> Self {
        match value {
            BetaScheduleArg::Linear => Self::Linear,
            BetaScheduleArg::ScaledLinear => Self::ScaledLinear,
        }
    }
}
