//! Side channel for watching a training run.
//!
//! Nothing a monitor does feeds back into training.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::data::PointCloud;
use crate::error::Result;

pub trait TrainingMonitor {
    /// Called with the true data and a freshly generated batch of samples.
    fn on_samples(&mut self, iteration: usize, data: &PointCloud, samples: &PointCloud)
        -> Result<()>;

    /// Called once with the raw per-iteration losses.
    fn on_finish(&mut self, losses: &[f64]) -> Result<()>;
}

/// Ignores everything.
impl TrainingMonitor for () {
    fn on_samples(&mut self, _: usize, _: &PointCloud, _: &PointCloud) -> Result<()> {
        Ok(())
    }

    fn on_finish(&mut self, _: &[f64]) -> Result<()> {
        Ok(())
    }
}

/// Writes scatter data and a smoothed loss curve as CSV files.
///
/// - `samples_<iteration>.csv`: `kind,x0,x1,...` rows, `kind` being `data` or `sample`
/// - `losses.csv`: `step,loss` rows of the moving average of the losses
#[derive(Debug, Clone)]
pub struct CsvMonitor {
    output_dir: PathBuf,
    smoothing_window: usize,
}

impl CsvMonitor {
    pub fn new(output_dir: impl AsRef<Path>, smoothing_window: usize) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;

        Ok(Self {
            output_dir,
            smoothing_window,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl TrainingMonitor for CsvMonitor {
    fn on_samples(
        &mut self,
        iteration: usize,
        data: &PointCloud,
        samples: &PointCloud,
    ) -> Result<()> {
        let path = self.output_dir.join(format!("samples_{iteration}.csv"));
        write_scatter(&path, data, samples)?;
        info!(path = %path.display(), "wrote samples");
        Ok(())
    }

    fn on_finish(&mut self, losses: &[f64]) -> Result<()> {
        let path = self.output_dir.join("losses.csv");
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["step", "loss"])?;
        for (step, loss) in smooth_losses(losses, self.smoothing_window)
            .into_iter()
            .enumerate()
        {
            writer.write_record([step.to_string(), loss.to_string()])?;
        }
        writer.flush()?;

        info!(path = %path.display(), "wrote loss curve");
        Ok(())
    }
}

/// Writes true data points and generated points to a single CSV file.
pub fn write_scatter(path: &Path, data: &PointCloud, samples: &PointCloud) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let dim = data.dim().max(samples.dim());
    let mut header = vec!["kind".to_string()];
    header.extend((0..dim).map(|i| format!("x{i}")));
    writer.write_record(&header)?;

    for (kind, cloud) in [("data", data), ("sample", samples)] {
        for point in cloud.points() {
            let mut record = vec![kind.to_string()];
            record.extend(point.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Moving average over `window` consecutive losses, keeping only fully
/// covered positions. The window shrinks to the number of losses.
pub fn smooth_losses(losses: &[f64], window: usize) -> Vec<f64> {
    let window = window.clamp(1, losses.len().max(1));
    if losses.is_empty() {
        return Vec::new();
    }

    let mut smoothed = Vec::with_capacity(losses.len() + 1 - window);
    let mut sum: f64 = losses[..window].iter().sum();
    smoothed.push(sum / window as f64);
    for i in window..losses.len() {
        sum += losses[i] - losses[i - window];
        smoothed.push(sum / window as f64);
    }
    smoothed
}
