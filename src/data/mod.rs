//! # Data
//!
//! Finite point clouds, the toy distributions they are drawn from, and the
//! cyclic shuffled batching used during training.

pub mod distributions;
pub mod loader;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

pub use distributions::{gaussian_mixture, smiley_face, spiral};
pub use loader::CyclicBatcher;

use crate::error::{DiffusionError, Result};
use crate::utils::matrix_from_rows;

/// A finite set of points in `R^dim`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    dim: usize,
    values: Vec<f32>,
}

impl PointCloud {
    pub fn new(dim: usize, values: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(DiffusionError::config("points need at least one dimension"));
        }
        if values.is_empty() || values.len() % dim != 0 {
            return Err(DiffusionError::shape(format!(
                "{} values do not form a non-empty set of {dim}-dimensional points",
                values.len()
            )));
        }
        Ok(Self { dim, values })
    }

    /// Copies a `[len, dim]` tensor back to the host.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>) -> Result<Self> {
        let [_, dim] = tensor.dims();
        let values = tensor
            .into_data()
            .value
            .into_iter()
            .map(|v| v.elem::<f32>())
            .collect();
        Self::new(dim, values)
    }

    pub fn from_points<const D: usize>(points: &[[f32; D]]) -> Result<Self> {
        Self::new(D, points.iter().flatten().copied().collect())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.values.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn point(&self, index: usize) -> &[f32] {
        &self.values[index * self.dim..(index + 1) * self.dim]
    }

    pub fn points(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks(self.dim)
    }

    /// `[indices.len(), dim]` tensor holding the selected points in order.
    pub fn batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Tensor<B, 2> {
        let values: Vec<f32> = indices
            .iter()
            .flat_map(|&i| self.point(i).iter().copied())
            .collect();
        matrix_from_rows(&values, indices.len(), self.dim, device)
    }

    /// Every point as a `[len, dim]` tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        matrix_from_rows(&self.values, self.len(), self.dim, device)
    }
}
