//! # Models
//!
//! Noise predictors to be used in a diffusion loop.

pub mod embeddings;
pub mod score_network;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

pub use score_network::{ScoreNetwork, ScoreNetworkConfig};

/// Maps a batch of noisy samples and their timesteps to the predicted noise.
///
/// `samples` is `[batch, data_dim]`, `timesteps` holds one entry per row and
/// the output has the same shape as `samples`. Callers check the batch sizes
/// agree; implementations may panic otherwise.
pub trait NoisePredictor<B: Backend> {
    fn data_dim(&self) -> usize;

    fn predict(&self, samples: Tensor<B, 2>, timesteps: &[usize]) -> Tensor<B, 2>;
}
