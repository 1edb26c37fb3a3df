//! Training program configuration format.

use crate::common::*;
use car_dl::{checkpoint::Monitor, dataset::InvalidSamplePolicy, label::NUM_CLASSES, orchestrator::StepRounding};

pub use dataset::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub preprocessor: PreprocessorConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The dataset root directory.
        pub data_dir: PathBuf,
        /// The headerless metadata CSV file, relative to `data_dir`.
        #[serde(default = "default_metadata_file")]
        pub metadata_file: PathBuf,
        /// The image directory, relative to `data_dir`.
        #[serde(default = "default_image_dir")]
        pub image_dir: PathBuf,
        #[serde(default = "default_num_classes")]
        pub num_classes: usize,
        /// The treatment of samples with unreadable images or bad crop boxes.
        #[serde(default)]
        pub invalid_sample_policy: InvalidSamplePolicy,
    }

    impl DatasetConfig {
        pub fn metadata_path(&self) -> PathBuf {
            self.data_dir.join(&self.metadata_file)
        }

        pub fn image_path(&self) -> PathBuf {
            self.data_dir.join(&self.image_dir)
        }
    }

    fn default_metadata_file() -> PathBuf {
        "crop_size.csv".into()
    }

    fn default_image_dir() -> PathBuf {
        "images".into()
    }

    fn default_num_classes() -> usize {
        NUM_CLASSES
    }
}

/// Data preprocessing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// The width of cropped images fed to the model.
    pub image_width: NonZeroUsize,
    /// The height of cropped images fed to the model.
    pub image_height: NonZeroUsize,
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        pub batch_size: NonZeroUsize,
        pub epochs: NonZeroUsize,
        /// The seed of the train/validation shuffle.
        pub seed: u64,
        /// The ratio of samples used for training.
        pub train_fraction: R64,
        #[serde(default)]
        pub validation_rounding: StepRounding,
        /// The metric that selects the best checkpoint.
        #[serde(default)]
        pub monitor: Monitor,
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
        #[serde(default)]
        pub load_checkpoint: LoadCheckpoint,
        #[serde(default)]
        pub model: ModelConfig,
        #[serde(default)]
        pub optimizer: OptimizerConfig,
    }

    /// Checkpoint file loading method.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LoadCheckpoint {
        /// Disable checkpoint file loading.
        Disabled,
        /// Load the best checkpoint of the most recent run.
        FromRecent,
        /// Load the checkpoint file at specified path.
        FromFile { file: PathBuf },
    }

    impl Default for LoadCheckpoint {
        fn default() -> Self {
            Self::Disabled
        }
    }

    /// The classifier architecture.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ModelConfig {
        pub conv_channels: usize,
        pub hidden_units: usize,
        pub dropout: R64,
    }

    impl Default for ModelConfig {
        fn default() -> Self {
            Self {
                conv_channels: 32,
                hidden_units: 512,
                dropout: r64(0.5),
            }
        }
    }

    /// The SGD optimizer options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OptimizerConfig {
        pub lr: R64,
        #[serde(default)]
        pub momentum: R64,
        /// If set, gradients are clipped to `[-clip_value, clip_value]`.
        pub clip_value: Option<R64>,
    }

    impl Default for OptimizerConfig {
        fn default() -> Self {
            Self {
                lr: r64(0.01),
                momentum: r64(0.0),
                clip_value: Some(r64(0.5)),
            }
        }
    }

    fn default_device() -> Device {
        Device::Cpu
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The directory where a timestamped run directory is created.
    pub dir: PathBuf,
    /// The label of the final model files.
    #[serde(default = "default_model_name")]
    pub model_name: String,
}

fn default_model_name() -> String {
    "car-classifier".into()
}
