//! Toy 2D distributions.

use core::f64::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;

use super::PointCloud;
use crate::error::{DiffusionError, Result};

fn check_count(num_samples: usize) -> Result<()> {
    if num_samples == 0 {
        return Err(DiffusionError::config("num_samples must be positive"));
    }
    Ok(())
}

fn gaussian<R: Rng>(rng: &mut R, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

/// An Archimedean spiral of `num_samples` evenly spaced points, with optional
/// isotropic Gaussian jitter, scaled by `rescale_factor`.
pub fn spiral<R: Rng>(
    num_samples: usize,
    std: f64,
    rescale_factor: f64,
    rng: &mut R,
) -> Result<PointCloud> {
    check_count(num_samples)?;

    let mut values = Vec::with_capacity(2 * num_samples);
    for i in 0..num_samples {
        let t = 1.5 * PI * (1. + 2. * i as f64 / num_samples as f64);
        let x = t * t.cos() + gaussian(rng, std);
        let y = t * t.sin() + gaussian(rng, std);
        values.push((x * rescale_factor / PI) as f32);
        values.push((y * rescale_factor / PI) as f32);
    }

    PointCloud::new(2, values)
}

/// `num_components` isotropic Gaussians with centers evenly spread on a circle.
pub fn gaussian_mixture<R: Rng>(
    num_samples: usize,
    num_components: usize,
    radius: f64,
    std: f64,
    rng: &mut R,
) -> Result<PointCloud> {
    check_count(num_samples)?;
    if num_components == 0 {
        return Err(DiffusionError::config("num_components must be positive"));
    }

    let mut values = Vec::with_capacity(2 * num_samples);
    for _ in 0..num_samples {
        let component = rng.gen_range(0..num_components);
        let angle = 2. * PI * component as f64 / num_components as f64;
        values.push((radius * angle.cos() + gaussian(rng, std)) as f32);
        values.push((radius * angle.sin() + gaussian(rng, std)) as f32);
    }

    PointCloud::new(2, values)
}

/// A face outline, two eyes and a smiling mouth.
pub fn smiley_face<R: Rng>(num_samples: usize, rng: &mut R) -> Result<PointCloud> {
    check_count(num_samples)?;
    let jitter = 0.02;

    let mut values = Vec::with_capacity(2 * num_samples);
    for _ in 0..num_samples {
        let part: f64 = rng.gen();
        let (x, y) = if part < 0.4 {
            let angle = rng.gen_range(0. ..2. * PI);
            (angle.cos(), angle.sin())
        } else if part < 0.6 {
            let side = if part < 0.5 { -1. } else { 1. };
            (side * 0.35 + gaussian(rng, 0.06), 0.35 + gaussian(rng, 0.06))
        } else {
            let angle = rng.gen_range(PI + 0.3..2. * PI - 0.3);
            (0.55 * angle.cos(), 0.55 * angle.sin() - 0.05)
        };
        values.push((x + gaussian(rng, jitter)) as f32);
        values.push((y + gaussian(rng, jitter)) as f32);
    }

    PointCloud::new(2, values)
}
