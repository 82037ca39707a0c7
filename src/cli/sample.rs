use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::Backend as _;
use clap::Args;
use tracing::info;

use toy_diffusion_burn::checkpoint::load_checkpoint;
use toy_diffusion_burn::data::PointCloud;
use toy_diffusion_burn::pipelines::sample;
use toy_diffusion_burn::schedulers::{
    DDIMSchedulerConfig, DDPMSchedulerConfig, DiffusionScheduler, Scheduler,
};

use super::{Backend, Device};

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum Sampler {
    Ddpm,
    Ddim,
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Directory written by the `train` command.
    #[arg(long, value_name = "DIR", default_value = "runs/spiral")]
    checkpoint: PathBuf,

    #[arg(long, value_enum, default_value = "ddpm")]
    sampler: Sampler,

    /// DDIM only: amount of fresh noise per step, 0 for a deterministic pass.
    #[arg(long, default_value_t = 0.)]
    eta: f64,

    /// DDIM only: number of reverse steps, must divide the training timesteps.
    #[arg(long, default_value_t = 50)]
    n_steps: usize,

    /// The number of points to generate.
    #[arg(long, default_value_t = 1000)]
    num_samples: usize,

    /// The random seed to be used for the generation.
    #[arg(long, default_value_t = 32)]
    seed: u64,

    /// The CSV file receiving the generated points.
    #[arg(long, value_name = "FILE", default_value = "samples.csv")]
    output: PathBuf,

    /// Also write every intermediate sample, tagged by reverse step.
    #[arg(long, action)]
    trajectory: bool,
}

pub fn handle_sample(args: &SampleArgs) -> Result<()> {
    let device = Device::default();
    Backend::seed(args.seed);

    let (model, config) = load_checkpoint::<Backend>(&args.checkpoint, &device)
        .with_context(|| format!("failed to load {}", args.checkpoint.display()))?;

    let schedule = &config.schedule;
    let scheduler: Scheduler = match args.sampler {
        Sampler::Ddpm => DDPMSchedulerConfig::new()
            .with_train_timesteps(schedule.total_timesteps)
            .with_beta_start(schedule.beta_start)
            .with_beta_end(schedule.beta_end)
            .with_beta_schedule(schedule.beta_schedule)
            .init()?
            .into(),
        Sampler::Ddim => DDIMSchedulerConfig::new()
            .with_train_timesteps(schedule.total_timesteps)
            .with_beta_start(schedule.beta_start)
            .with_beta_end(schedule.beta_end)
            .with_beta_schedule(schedule.beta_schedule)
            .with_eta(args.eta)
            .with_inference_timesteps(args.n_steps)
            .init()?
            .into(),
    };

    info!(sampler = ?args.sampler, num_samples = args.num_samples, "sampling");
    let output = sample(&model, &scheduler, args.num_samples, args.trajectory, &device)?;

    let points = PointCloud::from_tensor(output.sample)?;
    write_points(&args.output, [("final".to_string(), &points)])?;
    info!(path = %args.output.display(), "wrote samples");

    if args.trajectory {
        let path = args.output.with_extension("trajectory.csv");
        let steps = output
            .trajectory
            .into_iter()
            .map(PointCloud::from_tensor)
            .collect::<toy_diffusion_burn::Result<Vec<_>>>()?;
        write_points(
            &path,
            steps
                .iter()
                .zip(scheduler.timesteps())
                .map(|(points, timestep)| (timestep.to_string(), points)),
        )?;
        info!(path = %path.display(), steps = steps.len(), "wrote trajectory");
    }

    Ok(())
}

/// One `tag,x0,x1,...` row per point.
fn write_points<'a>(
    path: &Path,
    groups: impl IntoIterator<Item = (String, &'a PointCloud)>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header_written = false;
    for (tag, points) in groups {
        if !header_written {
            let mut header = vec!["step".to_string()];
            header.extend((0..points.dim()).map(|i| format!("x{i}")));
            writer.write_record(&header)?;
            header_written = true;
        }
        for point in points.points() {
            let mut record = vec![tag.clone()];
            record.extend(point.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;

    Ok(())
}
