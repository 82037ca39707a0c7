//! # Pipelines
//!
//! End to end reverse passes combining a noise predictor with a scheduler.

pub mod sampling;

pub use sampling::{denoise, sample, SamplingOutput};
