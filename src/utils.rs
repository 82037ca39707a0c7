use burn::tensor::backend::Backend;
use burn::tensor::{Data, ElementConversion, Shape, Tensor};
use num_traits::ToPrimitive;

use crate::error::{DiffusionError, Result};

/// Builds a `[batch, 1, ..., 1]` tensor from one scalar per example, ready to be
/// broadcast against a batch of samples of rank `D`.
pub(crate) fn per_example_coefficients<B: Backend, const D: usize>(
    values: &[f64],
    device: &B::Device,
) -> Tensor<B, D> {
    let coefficients: Vec<B::FloatElem> = values.iter().map(|v| v.elem()).collect();
    let mut dims = [1; D];
    dims[0] = values.len();

    let data: Data<B::FloatElem, 1> = Data::new(coefficients, Shape::new([values.len()]));
    Tensor::<B, 1>::from_data(data, device).reshape(dims)
}

/// Builds a `[rows, cols]` tensor from row-major host values.
pub(crate) fn matrix_from_rows<B: Backend>(
    values: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let elems: Vec<B::FloatElem> = values.iter().map(|v| v.elem()).collect();
    let data: Data<B::FloatElem, 2> = Data::new(elems, Shape::new([rows, cols]));
    Tensor::from_data(data, device)
}

pub(crate) fn ensure_same_shape<B: Backend, const D: usize>(
    lhs: &Tensor<B, D>,
    rhs: &Tensor<B, D>,
    what: &str,
) -> Result<()> {
    let (lhs, rhs) = (lhs.dims(), rhs.dims());
    if lhs != rhs {
        return Err(DiffusionError::shape(format!(
            "{what}: expected {lhs:?}, got {rhs:?}"
        )));
    }
    Ok(())
}

/// Fails with [`DiffusionError::NumericInstability`] on the first NaN or
/// infinite element.
pub fn ensure_finite<B: Backend, const D: usize>(tensor: &Tensor<B, D>, context: &str) -> Result<()> {
    let data = tensor.to_data();
    let bad = data
        .value
        .iter()
        .map(|v| v.to_f64().unwrap_or(f64::NAN))
        .find(|v| !v.is_finite());

    match bad {
        Some(value) => Err(DiffusionError::NumericInstability {
            context: context.to_string(),
            value,
        }),
        None => Ok(()),
    }
}
