use thiserror::Error;

pub type Result<T> = core::result::Result<T, DiffusionError>;

#[derive(Debug, Error)]
pub enum DiffusionError {
    /// Invalid schedule bounds, sampler stride or training parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Batch or feature dimensions disagree between collaborators.
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("timestep {timestep} is outside of the schedule (0..{total})")]
    TimestepOutOfRange { timestep: usize, total: usize },

    /// A NaN or infinite value showed up in a loss or a sample.
    #[error("numeric instability in {context}: got {value}")]
    NumericInstability { context: String, value: f64 },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DiffusionError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }
}
