//! Score Network
//!
//! A small feed forward network playing the role a UNet plays for images: it
//! reads a noisy point together with an encoding of its timestep and predicts
//! the noise that was mixed into it.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::embeddings::SinusoidalPositionalEmbedding;
use super::NoisePredictor;

/// Configuration for a [score network](ScoreNetwork).
#[derive(Config, Debug)]
pub struct ScoreNetworkConfig {
    /// Dimension of the data points.
    #[config(default = 2)]
    pub data_dim: usize,
    /// Width of the sinusoidal timestep encoding.
    #[config(default = 10)]
    pub time_embedding_dim: usize,
    #[config(default = 128)]
    pub hidden_size: usize,
}

impl ScoreNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ScoreNetwork<B> {
        let input_dim = self.data_dim + self.time_embedding_dim;

        ScoreNetwork {
            linear_1: LinearConfig::new(input_dim, self.hidden_size).init(device),
            linear_2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            linear_3: LinearConfig::new(self.hidden_size, self.data_dim).init(device),
            data_dim: self.data_dim,
            time_embedding_dim: self.time_embedding_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct ScoreNetwork<B: Backend> {
    linear_1: Linear<B>,
    linear_2: Linear<B>,
    linear_3: Linear<B>,
    data_dim: usize,
    time_embedding_dim: usize,
}

impl<B: Backend> ScoreNetwork<B> {
    /// # Shapes
    ///
    /// - xs: `[batch, data_dim]`
    /// - timesteps: `batch` entries
    /// - output: `[batch, data_dim]`
    ///
    /// # Panics
    ///
    /// If `timesteps` does not hold one entry per row of `xs`.
    pub fn forward(&self, xs: Tensor<B, 2>, timesteps: &[usize]) -> Tensor<B, 2> {
        let [batch_size, _] = xs.dims();
        assert_eq!(
            timesteps.len(),
            batch_size,
            "expected one timestep per sample"
        );

        let time_embedding = SinusoidalPositionalEmbedding::new(self.time_embedding_dim)
            .forward::<B>(timesteps, &xs.device());

        let xs = Tensor::cat(vec![xs, time_embedding], 1);
        let xs = relu(self.linear_1.forward(xs));
        let xs = relu(self.linear_2.forward(xs));
        self.linear_3.forward(xs)
    }
}

impl<B: Backend> NoisePredictor<B> for ScoreNetwork<B> {
    fn data_dim(&self) -> usize {
        self.data_dim
    }

    fn predict(&self, samples: Tensor<B, 2>, timesteps: &[usize]) -> Tensor<B, 2> {
        self.forward(samples, timesteps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Shape;

    #[test]
    fn test_output_matches_input_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let network = ScoreNetworkConfig::new()
            .with_hidden_size(16)
            .init::<TestBackend>(&device);

        let xs: Tensor<TestBackend, 2> = Tensor::zeros([5, 2], &device);
        let output = network.predict(xs, &[0, 1, 2, 500, 999]);

        assert_eq!(output.shape(), Shape::from([5, 2]));
        assert_eq!(network.data_dim(), 2);
    }

    #[test]
    fn test_timestep_conditions_output() {
        let device = <TestBackend as Backend>::Device::default();
        let network = ScoreNetworkConfig::new().init::<TestBackend>(&device);

        let xs: Tensor<TestBackend, 2> = Tensor::ones([2, 2], &device);
        let output = network.predict(xs, &[3, 700]).into_data().value;

        assert_ne!(output[0..2], output[2..4]);
    }

    #[test]
    #[should_panic(expected = "expected one timestep per sample")]
    fn test_timestep_count_must_match_batch() {
        let device = <TestBackend as Backend>::Device::default();
        let network = ScoreNetworkConfig::new().init::<TestBackend>(&device);

        let xs: Tensor<TestBackend, 2> = Tensor::zeros([2, 2], &device);
        network.predict(xs, &[1]);
    }
}
