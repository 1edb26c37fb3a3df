//! The training program for the car classifier.

pub mod common;
pub mod config;
pub mod model;
pub mod utils;

use crate::{
    common::*,
    config::Config,
    model::Classifier,
    utils::{CheckpointWriter, SavedModel, CHECKPOINT_DIR},
};
use car_dl::{
    checkpoint::ModelCheckpoint,
    dataset::{partition, CsvDataset, Partitions, SampleDataset, SanitizedDataset},
    label::OneHotEncoder,
    orchestrator::{History, Orchestrator},
    processor::{ImagePreprocessor, SampleProcessor},
};

pub const CONFIG_FILE: &str = "config.json5";
pub const HISTORY_FILE: &str = "history.json";

/// The files and metrics produced by a training run.
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    /// The timestamped directory of this run.
    pub run_dir: PathBuf,
    pub history: History,
    /// The best snapshot, if any epoch produced one.
    pub best_checkpoint: Option<PathBuf>,
    pub model: SavedModel,
}

/// The entry of training program.
pub fn start(config: Arc<Config>) -> Result<TrainingOutput> {
    let start_time = Local::now();
    let run_dir = config
        .logging
        .dir
        .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
    let checkpoint_dir = run_dir.join(CHECKPOINT_DIR);

    // create dirs and save config
    {
        fs::create_dir_all(&checkpoint_dir)
            .with_context(|| format!("unable to create directory {}", checkpoint_dir.display()))?;
        let path = run_dir.join(CONFIG_FILE);
        let text = serde_json::to_string_pretty(&*config)?;
        fs::write(&path, text)?;
    }

    // load dataset
    info!("loading dataset");
    let dataset = {
        let dataset = CsvDataset::load(
            config.dataset.image_path(),
            config.dataset.metadata_path(),
        )?;
        SanitizedDataset::new(dataset, config.dataset.invalid_sample_policy)?
    };
    let Partitions { train, validation } = partition(
        dataset.samples(),
        config.training.seed,
        config.training.train_fraction.raw(),
    )?;

    // fail fast before the model is built
    let orchestrator = Orchestrator::new(
        config.training.batch_size.get(),
        config.training.epochs.get(),
        config.training.validation_rounding,
    );
    orchestrator.plan(&train, &validation)?;

    let loader = {
        let preprocessor = ImagePreprocessor::new(
            dataset.image_dir(),
            config.preprocessor.image_width.get(),
            config.preprocessor.image_height.get(),
        )?;
        let encoder = OneHotEncoder::new(config.dataset.num_classes)?;
        Arc::new(SampleProcessor::new(preprocessor, encoder))
    };

    // init model
    info!("initializing model");
    let mut model = Classifier::new(
        config.training.device,
        config.preprocessor.image_width.get(),
        config.preprocessor.image_height.get(),
        config.dataset.num_classes,
        &config.training.model,
        &config.training.optimizer,
    )?;
    utils::try_load_checkpoint(
        &mut model,
        &config.logging.dir,
        &config.training.load_checkpoint,
    )?;

    // train
    let mut checkpoint: ModelCheckpoint<Classifier, _> = ModelCheckpoint::new(
        config.training.monitor,
        CheckpointWriter::new(&checkpoint_dir, &config.logging.model_name)?,
    );
    let history = orchestrator.run(
        &mut model,
        train,
        validation,
        loader,
        &mut [&mut checkpoint],
    )?;

    {
        let path = run_dir.join(HISTORY_FILE);
        let text = serde_json::to_string_pretty(&history)?;
        fs::write(&path, text)?;
    }

    let best_checkpoint = checkpoint
        .policy()
        .best()
        .map(|best| best.snapshot.clone());
    let model = utils::save_model(&model, &run_dir, &config.logging.model_name)?;

    Ok(TrainingOutput {
        run_dir,
        history,
        best_checkpoint,
        model,
    })
}
