use super::*;
use crate::common::*;

/// The dataset with a list of sample records stored under an image directory.
pub trait SampleDataset
where
    Self: Debug + Send,
{
    /// The directory where `image_ref` of each sample is resolved.
    fn image_dir(&self) -> &Path;

    /// Get the list of samples in the dataset.
    fn samples(&self) -> &[Arc<SampleRecord>];

    /// Get number of samples in the dataset.
    fn num_samples(&self) -> usize {
        self.samples().len()
    }

    /// Resolve the image file path of a sample.
    fn image_path(&self, record: &SampleRecord) -> PathBuf {
        self.image_dir().join(&record.image_ref)
    }
}
