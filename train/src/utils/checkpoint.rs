use crate::{
    common::*,
    config::LoadCheckpoint,
    model::{Classifier, ModelDescriptor},
};
use car_dl::checkpoint::SnapshotStore;

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const BEST_CHECKPOINT_FILE: &str = "best.ot";
pub const BEST_DESCRIPTOR_FILE: &str = "best.json";

/// The metadata written next to a weights file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDescriptor {
    pub name: String,
    pub saved_at: String,
    /// The epoch of the snapshot, absent for the final model.
    pub epoch: Option<usize>,
    pub score: Option<R64>,
    pub weights_file: PathBuf,
    pub model: ModelDescriptor,
}

/// Keeps the single best snapshot in a checkpoint directory.
///
/// Each improvement overwrites `best.ot` and its descriptor `best.json`.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
    name: String,
}

impl CheckpointWriter {
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("unable to create directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_owned(),
            name: name.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.dir.join(BEST_CHECKPOINT_FILE)
    }
}

impl SnapshotStore<Classifier> for CheckpointWriter {
    type Handle = PathBuf;

    fn persist(&mut self, model: &Classifier, epoch: usize, score: R64) -> Result<PathBuf> {
        let path = self.best_checkpoint_path();

        // the previous best stays intact until the new file is complete
        let tmp_path = self.dir.join(format!("{}.tmp", BEST_CHECKPOINT_FILE));
        model.save(&tmp_path)?;
        fs::rename(&tmp_path, &path)?;

        let descriptor = CheckpointDescriptor {
            name: self.name.clone(),
            saved_at: Local::now().to_rfc3339(),
            epoch: Some(epoch),
            score: Some(score),
            weights_file: BEST_CHECKPOINT_FILE.into(),
            model: model.descriptor().clone(),
        };
        write_json(&self.dir.join(BEST_DESCRIPTOR_FILE), &descriptor)?;

        Ok(path)
    }
}

/// The final model files written by [save_model].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedModel {
    pub weights_file: PathBuf,
    pub descriptor_file: PathBuf,
}

/// Save the final weights to `<name>.ot` and the descriptor to
/// `<YYYY-MM-DD>_<name>.json` under `dir`.
pub fn save_model(model: &Classifier, dir: &Path, name: &str) -> Result<SavedModel> {
    let now = Local::now();
    let weights_file = dir.join(format!("{}.ot", name));
    let descriptor_file = dir.join(descriptor_file_name(name, &now));

    model.save(&weights_file)?;
    let descriptor = CheckpointDescriptor {
        name: name.to_owned(),
        saved_at: now.to_rfc3339(),
        epoch: None,
        score: None,
        weights_file: weights_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| weights_file.clone()),
        model: model.descriptor().clone(),
    };
    write_json(&descriptor_file, &descriptor)?;

    info!(
        "saved final model to {} and {}",
        weights_file.display(),
        descriptor_file.display()
    );

    Ok(SavedModel {
        weights_file,
        descriptor_file,
    })
}

pub fn descriptor_file_name<Tz>(name: &str, time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}_{}.json", time.format("%Y-%m-%d"), name)
}

/// Load parameters from a directory with specified checkpoint loading method.
///
/// Returns the path of the loaded file, if any.
pub fn try_load_checkpoint(
    model: &mut Classifier,
    logging_dir: &Path,
    load_checkpoint: &LoadCheckpoint,
) -> Result<Option<PathBuf>> {
    let path = match load_checkpoint {
        LoadCheckpoint::Disabled => {
            info!("checkpoint loading is disabled");
            None
        }
        LoadCheckpoint::FromRecent => {
            let checkpoint_file = find_recent_checkpoint(logging_dir)?;

            if checkpoint_file.is_none() {
                warn!("no checkpoint file found");
            }

            checkpoint_file
        }
        LoadCheckpoint::FromFile { file } => {
            if file.is_file() {
                Some(file.to_owned())
            } else {
                warn!("{} is not a file", file.display());
                None
            }
        }
    };

    if let Some(path) = &path {
        info!("load checkpoint file {}", path.display());
        model.load(path)?;
    }

    Ok(path)
}

/// Find the best checkpoint of the latest run under the logging directory.
///
/// Runs are ordered by the timestamp in their directory names.
pub fn find_recent_checkpoint(logging_dir: &Path) -> Result<Option<PathBuf>> {
    let pattern = format!(
        "{}/*/{}/{}",
        logging_dir.display(),
        CHECKPOINT_DIR,
        BEST_CHECKPOINT_FILE
    );
    let paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;

    let checkpoint_file = paths
        .into_iter()
        .filter_map(|path| {
            let run_name = path.parent()?.parent()?.file_name()?.to_str()?;
            let datetime = DateTime::parse_from_str(run_name, FILE_STRFTIME).ok()?;
            Some((path, datetime))
        })
        .max_by_key(|(_path, datetime)| *datetime)
        .map(|(path, _datetime)| path);

    Ok(checkpoint_file)
}

fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("unable to write {}", path.display()))?;
    Ok(())
}
