//! # Toy diffusion models
//!
//! Denoising diffusion (DDPM) and implicit (DDIM) samplers over small point
//! clouds such as a 2D spiral, trained by denoising score matching with
//! [Burn](https://github.com/tracel-ai/burn).

pub mod checkpoint;
pub mod data;
pub mod error;
pub mod models;
pub mod monitor;
pub mod pipelines;
pub mod schedulers;
pub mod training;
pub mod utils;

pub use error::{DiffusionError, Result};

#[cfg(all(test, feature = "ndarray"))]
use burn::backend::ndarray;

#[cfg(all(test, feature = "ndarray"))]
pub type TestBackend = ndarray::NdArray<f32>;

#[cfg(all(test, feature = "ndarray"))]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
