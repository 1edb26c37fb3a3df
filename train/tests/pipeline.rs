use anyhow::Result;
use car_dl::{
    checkpoint::Monitor, dataset::InvalidSamplePolicy, orchestrator::StepRounding, PipelineError,
};
use noisy_float::prelude::*;
use std::{fs, num::NonZeroUsize, path::Path, sync::Arc};
use tch::{Device, Kind, Tensor};
use train::{
    config::{
        Config, DatasetConfig, LoadCheckpoint, LoggingConfig, ModelConfig, OptimizerConfig,
        PreprocessorConfig, TrainingConfig,
    },
    utils::{CheckpointDescriptor, BEST_DESCRIPTOR_FILE},
    CONFIG_FILE, HISTORY_FILE,
};

const NUM_IMAGES: usize = 12;

/// Write `NUM_IMAGES` 24x24 images and a metadata file with three classes.
fn write_dataset(data_dir: &Path) -> Result<()> {
    let image_dir = data_dir.join("images");
    fs::create_dir_all(&image_dir)?;

    let mut rows = vec![];
    for index in 0..NUM_IMAGES {
        let name = format!("{:05}.png", index + 1);
        let image = Tensor::arange(24 * 24 * 3, (Kind::Int64, Device::Cpu))
            .remainder(251 - index as i64)
            .to_kind(Kind::Uint8)
            .reshape(&[3, 24, 24]);
        tch::vision::image::save(&image, image_dir.join(&name))?;

        let class_id = index % 3 + 1;
        rows.push(format!("2,3,20,22,{},{}", class_id, name));
    }
    fs::write(data_dir.join("crop_size.csv"), rows.join("\n"))?;

    Ok(())
}

fn test_config(data_dir: &Path, logging_dir: &Path, batch_size: usize, epochs: usize) -> Config {
    Config {
        dataset: DatasetConfig {
            data_dir: data_dir.to_owned(),
            metadata_file: "crop_size.csv".into(),
            image_dir: "images".into(),
            num_classes: 3,
            invalid_sample_policy: InvalidSamplePolicy::Skip,
        },
        preprocessor: PreprocessorConfig {
            image_width: NonZeroUsize::new(8).unwrap(),
            image_height: NonZeroUsize::new(8).unwrap(),
        },
        training: TrainingConfig {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            epochs: NonZeroUsize::new(epochs).unwrap(),
            seed: 447,
            train_fraction: r64(0.75),
            validation_rounding: StepRounding::Floor,
            monitor: Monitor::ValLoss,
            device: Device::Cpu,
            load_checkpoint: LoadCheckpoint::Disabled,
            model: ModelConfig {
                conv_channels: 4,
                hidden_units: 8,
                dropout: r64(0.0),
            },
            optimizer: OptimizerConfig::default(),
        },
        logging: LoggingConfig {
            dir: logging_dir.to_owned(),
            model_name: "tiny".into(),
        },
    }
}

#[test]
fn train_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    let logging_dir = dir.path().join("logs");
    write_dataset(&data_dir)?;

    let config = test_config(&data_dir, &logging_dir, 2, 2);
    let output = train::start(Arc::new(config))?;

    assert!(output.run_dir.starts_with(&logging_dir));
    assert!(output.run_dir.join(CONFIG_FILE).is_file());
    assert_eq!(output.history.epochs.len(), 2);
    assert_eq!(output.history.epochs[0].epoch, 0);

    // the first epoch always improves on an empty history
    let best = output.best_checkpoint.expect("a best checkpoint is saved");
    assert!(best.is_file());
    let text = fs::read_to_string(best.with_file_name(BEST_DESCRIPTOR_FILE))?;
    let descriptor: CheckpointDescriptor = serde_json::from_str(&text)?;
    assert_eq!(descriptor.model.input_shape, [8, 8, 3]);
    assert_eq!(descriptor.model.num_classes, 3);

    let text = fs::read_to_string(output.run_dir.join(HISTORY_FILE))?;
    let history: car_dl::orchestrator::History = serde_json::from_str(&text)?;
    assert_eq!(history, output.history);

    assert_eq!(output.model.weights_file, output.run_dir.join("tiny.ot"));
    assert!(output.model.weights_file.is_file());
    assert!(output.model.descriptor_file.is_file());

    // a later run resumes from the latest best checkpoint
    let mut config = test_config(&data_dir, &logging_dir, 2, 1);
    config.training.load_checkpoint = LoadCheckpoint::FromRecent;
    let resumed = train::start(Arc::new(config))?;
    assert_ne!(resumed.run_dir, output.run_dir);
    assert_eq!(resumed.history.epochs.len(), 1);

    Ok(())
}

#[test]
fn oversized_batch_fails_before_training() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    let logging_dir = dir.path().join("logs");
    write_dataset(&data_dir)?;

    // 12 samples split into 9 training and 3 validation samples
    let config = test_config(&data_dir, &logging_dir, 4, 1);
    let err = train::start(Arc::new(config)).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Configuration(_))
    ));
    let num_checkpoints = glob::glob(&format!(
        "{}/*/checkpoints/*",
        logging_dir.display()
    ))?
    .count();
    assert_eq!(num_checkpoints, 0);
    Ok(())
}

#[test]
fn invalid_samples_are_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    let logging_dir = dir.path().join("logs");
    write_dataset(&data_dir)?;

    let metadata_path = data_dir.join("crop_size.csv");
    let mut text = fs::read_to_string(&metadata_path)?;
    text.push_str("\n0,0,10,10,1,missing.png\n0,0,40,40,2,00001.png");
    fs::write(&metadata_path, text)?;

    let config = test_config(&data_dir, &logging_dir, 2, 1);
    let output = train::start(Arc::new(config.clone()))?;
    assert_eq!(output.history.epochs.len(), 1);

    let mut config = config;
    config.dataset.invalid_sample_policy = InvalidSamplePolicy::Abort;
    let err = train::start(Arc::new(config)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::ImageNotFound { .. })
    ));
    Ok(())
}

#[test]
fn malformed_metadata_aborts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    let logging_dir = dir.path().join("logs");
    write_dataset(&data_dir)?;
    fs::write(data_dir.join("crop_size.csv"), "1,2,3,4,x,00001.png\n")?;

    let config = test_config(&data_dir, &logging_dir, 2, 1);
    let err = train::start(Arc::new(config)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MalformedRecord { line: 1, .. })
    ));
    Ok(())
}
