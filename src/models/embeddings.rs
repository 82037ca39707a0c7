use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::utils::matrix_from_rows;

/// Sinusoidal encoding of integer timesteps.
///
/// Even columns hold `sin(t * w_i)` and odd columns `cos(t * w_i)` with
/// `w_i = 10000^(-2i / embedding_dim)`.
#[derive(Debug, Clone, Copy)]
pub struct SinusoidalPositionalEmbedding {
    embedding_dim: usize,
}

impl SinusoidalPositionalEmbedding {
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn frequencies(&self) -> Vec<f32> {
        let half_dim = (self.embedding_dim + 1) / 2;
        let scale = -f64::ln(10000.) / self.embedding_dim as f64;
        (0..half_dim)
            .map(|i| ((2 * i) as f64 * scale).exp() as f32)
            .collect()
    }

    /// Returns a `[timesteps.len(), embedding_dim]` tensor.
    pub fn forward<B: Backend>(&self, timesteps: &[usize], device: &B::Device) -> Tensor<B, 2> {
        let batch_size = timesteps.len();
        let frequencies = self.frequencies();
        let half_dim = frequencies.len();

        let positions: Vec<f32> = timesteps.iter().map(|t| *t as f32).collect();
        let positions = matrix_from_rows::<B>(&positions, batch_size, 1, device);
        let frequencies = matrix_from_rows::<B>(&frequencies, 1, half_dim, device);
        let angles = positions.matmul(frequencies);

        // [batch, half, 2] then flattened, so sin and cos alternate.
        let emb: Tensor<B, 3> = Tensor::cat(
            vec![
                angles.clone().sin().unsqueeze_dim(2),
                angles.cos().unsqueeze_dim(2),
            ],
            2,
        );
        let emb: Tensor<B, 2> = emb.reshape([batch_size, 2 * half_dim]);

        if self.embedding_dim % 2 == 1 {
            emb.slice([0..batch_size, 0..self.embedding_dim])
        } else {
            emb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::{Data, Shape};

    #[test]
    fn test_positional_embedding_even_dim() {
        let device = <TestBackend as Backend>::Device::default();
        let embedding = SinusoidalPositionalEmbedding::new(4);

        let emb = embedding.forward::<TestBackend>(&[0, 1, 2], &device);

        assert_eq!(emb.shape(), Shape::from([3, 4]));
        emb.to_data().assert_approx_eq(
            &Data::from([
                [0.0000, 1.0000, 0.0000, 1.0000],
                [0.8415, 0.5403, 0.0100, 0.9999],
                [0.9093, -0.4161, 0.0200, 0.9998],
            ]),
            3,
        );
    }

    #[test]
    fn test_positional_embedding_odd_dim() {
        let device = <TestBackend as Backend>::Device::default();
        let embedding = SinusoidalPositionalEmbedding::new(3);

        let emb = embedding.forward::<TestBackend>(&[1, 4], &device);

        assert_eq!(emb.shape(), Shape::from([2, 3]));
        let w = f64::powf(10000., -2. / 3.);
        emb.to_data().assert_approx_eq(
            &Data::from([
                [1f64.sin() as f32, 1f64.cos() as f32, w.sin() as f32],
                [4f64.sin() as f32, 4f64.cos() as f32, (4. * w).sin() as f32],
            ]),
            3,
        );
    }
}
