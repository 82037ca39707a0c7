use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use toy_diffusion_burn::checkpoint::{save_checkpoint, CheckpointConfig};
use toy_diffusion_burn::data::{gaussian_mixture, smiley_face, spiral, PointCloud};
use toy_diffusion_burn::models::ScoreNetworkConfig;
use toy_diffusion_burn::monitor::CsvMonitor;
use toy_diffusion_burn::schedulers::{DDPMSchedulerConfig, NoiseScheduleConfig};
use toy_diffusion_burn::training::{train, TrainingConfig};

use burn::optim::AdamConfig;

use super::{BetaScheduleArg, Device, TrainBackend};

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum DatasetKind {
    Spiral,
    GaussianMixture,
    Smiley,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// The toy distribution to learn.
    #[arg(long, value_enum, default_value = "spiral")]
    dataset: DatasetKind,

    /// Number of points in the training set.
    #[arg(long, default_value_t = 1000)]
    dataset_size: usize,

    /// Standard deviation of the jitter added to the spiral and mixture points.
    #[arg(long, default_value_t = 0.)]
    dataset_noise: f64,

    /// Radius multiplier of the spiral.
    #[arg(long, default_value_t = 0.3)]
    spiral_scale: f64,

    /// Number of diffusion steps.
    #[arg(long, default_value_t = 1000)]
    timesteps: usize,

    #[arg(long, default_value_t = 1e-4)]
    beta_start: f64,

    #[arg(long, default_value_t = 0.02)]
    beta_end: f64,

    #[arg(long, value_enum, default_value = "linear")]
    beta_schedule: BetaScheduleArg,

    /// Width of the sinusoidal timestep embedding.
    #[arg(long, default_value_t = 10)]
    time_embedding_dim: usize,

    #[arg(long, default_value_t = 128)]
    hidden_size: usize,

    #[arg(long, default_value_t = 200)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,

    #[arg(long, default_value_t = 100_000)]
    iterations: usize,

    /// The random seed used for the dataset, the weights and the noise.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write generated samples every this many iterations, 0 to disable.
    #[arg(long, default_value_t = 10_000)]
    sample_every: usize,

    #[arg(long, default_value_t = 500)]
    monitor_samples: usize,

    /// Window of the moving average applied to the written loss curve.
    #[arg(long, default_value_t = 1000)]
    smoothing_window: usize,

    /// Directory receiving the checkpoint and the monitoring CSV files.
    #[arg(short, long, value_name = "DIR", default_value = "runs/spiral")]
    output_dir: PathBuf,

    /// Show a progress bar.
    #[arg(long, action)]
    progress: bool,
}

fn build_dataset(args: &TrainArgs) -> Result<PointCloud> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let dataset = match args.dataset {
        DatasetKind::Spiral => spiral(
            args.dataset_size,
            args.dataset_noise,
            args.spiral_scale,
            &mut rng,
        )?,
        DatasetKind::GaussianMixture => {
            gaussian_mixture(args.dataset_size, 8, 2., args.dataset_noise.max(0.1), &mut rng)?
        }
        DatasetKind::Smiley => smiley_face(args.dataset_size, &mut rng)?,
    };
    Ok(dataset)
}

pub fn handle_train(args: &TrainArgs) -> Result<()> {
    let device = Device::default();

    let dataset = build_dataset(args).context("failed to build the training set")?;
    info!(kind = ?args.dataset, size = dataset.len(), "built training set");

    let schedule = NoiseScheduleConfig::new()
        .with_total_timesteps(args.timesteps)
        .with_beta_start(args.beta_start)
        .with_beta_end(args.beta_end)
        .with_beta_schedule(args.beta_schedule.into());
    let network = ScoreNetworkConfig::new()
        .with_data_dim(dataset.dim())
        .with_time_embedding_dim(args.time_embedding_dim)
        .with_hidden_size(args.hidden_size);
    let training = TrainingConfig::new(AdamConfig::new())
        .with_num_iterations(args.iterations)
        .with_batch_size(args.batch_size)
        .with_learning_rate(args.learning_rate)
        .with_seed(args.seed)
        .with_sample_every(args.sample_every)
        .with_monitor_samples(args.monitor_samples)
        .with_progress_bar(args.progress);

    let scheduler = DDPMSchedulerConfig::new()
        .with_train_timesteps(schedule.total_timesteps)
        .with_beta_start(schedule.beta_start)
        .with_beta_end(schedule.beta_end)
        .with_beta_schedule(schedule.beta_schedule)
        .init()?;

    let mut monitor = CsvMonitor::new(&args.output_dir, args.smoothing_window)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let output = train::<TrainBackend, _>(
        &network,
        scheduler,
        training.clone(),
        &dataset,
        &mut monitor,
        &device,
    )?;

    let config = CheckpointConfig::new(schedule, network, training);
    save_checkpoint(&args.output_dir, &output.model, &config)
        .context("failed to save the checkpoint")?;

    info!(
        dir = %args.output_dir.display(),
        final_loss = output.losses.last().copied().unwrap_or(f64::NAN),
        "done"
    );
    Ok(())
}
