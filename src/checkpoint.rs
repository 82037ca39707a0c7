//! Persisting trained networks.
//!
//! A checkpoint directory holds `model.mpk`, the network parameters keyed by
//! name, and `config.json`, everything needed to rebuild the network and its
//! schedule.

use std::fs;
use std::path::Path;

use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use tracing::info;

use crate::error::{self, DiffusionError};
use crate::models::{ScoreNetwork, ScoreNetworkConfig};
use crate::schedulers::NoiseScheduleConfig;
use crate::training::TrainingConfig;

const MODEL_FILE: &str = "model";
const CONFIG_FILE: &str = "config.json";

#[derive(Config)]
pub struct CheckpointConfig {
    pub schedule: NoiseScheduleConfig,
    pub network: ScoreNetworkConfig,
    pub training: TrainingConfig,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

pub fn save_checkpoint<B: Backend>(
    dir: impl AsRef<Path>,
    model: &ScoreNetwork<B>,
    config: &CheckpointConfig,
) -> error::Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    config.save(dir.join(CONFIG_FILE))?;
    recorder()
        .record(model.clone().into_record(), dir.join(MODEL_FILE))
        .map_err(|e| DiffusionError::Checkpoint(format!("failed to save model: {e:?}")))?;

    info!(dir = %dir.display(), "saved checkpoint");
    Ok(())
}

pub fn load_checkpoint<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> error::Result<(ScoreNetwork<B>, CheckpointConfig)> {
    let dir = dir.as_ref();

    let config = CheckpointConfig::load(dir.join(CONFIG_FILE)).map_err(|e| {
        DiffusionError::Checkpoint(format!("failed to read {CONFIG_FILE}: {e:?}"))
    })?;
    let record = recorder()
        .load(dir.join(MODEL_FILE), device)
        .map_err(|e| DiffusionError::Checkpoint(format!("failed to load model: {e:?}")))?;
    let model = config.network.init::<B>(device).load_record(record);

    info!(dir = %dir.display(), "loaded checkpoint");
    Ok((model, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoisePredictor;
    use crate::TestBackend;
    use burn::optim::AdamConfig;
    use burn::tensor::Tensor;

    #[test]
    fn test_checkpoint_round_trip() {
        let device = <TestBackend as Backend>::Device::default();
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::new(
            NoiseScheduleConfig::new().with_total_timesteps(200),
            ScoreNetworkConfig::new().with_hidden_size(16),
            TrainingConfig::new(AdamConfig::new()).with_batch_size(7),
        );
        let model = config.network.init::<TestBackend>(&device);

        save_checkpoint(dir.path(), &model, &config).unwrap();
        let (restored, restored_config) =
            load_checkpoint::<TestBackend>(dir.path(), &device).unwrap();

        assert_eq!(restored_config.schedule.total_timesteps, 200);
        assert_eq!(restored_config.network.hidden_size, 16);
        assert_eq!(restored_config.training.batch_size, 7);

        let xs: Tensor<TestBackend, 2> = Tensor::from_floats([[0.1, -0.4], [1., 2.]], &device);
        model
            .predict(xs.clone(), &[3, 150])
            .to_data()
            .assert_approx_eq(&restored.predict(xs, &[3, 150]).to_data(), 5);
    }

    #[test]
    fn test_missing_checkpoint() {
        let device = <TestBackend as Backend>::Device::default();
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            load_checkpoint::<TestBackend>(dir.path(), &device),
            Err(DiffusionError::Checkpoint(_))
        ));
    }
}
