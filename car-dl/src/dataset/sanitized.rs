use super::*;
use crate::{common::*, error::PipelineError};

/// The treatment of samples whose image or crop box is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidSamplePolicy {
    /// Drop the sample and continue.
    Skip,
    /// Fail on the first bad sample.
    Abort,
}

impl Default for InvalidSamplePolicy {
    fn default() -> Self {
        Self::Skip
    }
}

/// The dataset that filters out samples with unreadable images or bad crop boxes.
///
/// Only the image header is inspected. Image files that are corrupted past
/// the header still fail later during batch generation.
#[derive(Debug)]
pub struct SanitizedDataset<D>
where
    D: SampleDataset,
{
    dataset: D,
    samples: Vec<Arc<SampleRecord>>,
    num_skipped: usize,
}

impl<D> SanitizedDataset<D>
where
    D: SampleDataset,
{
    pub fn new(dataset: D, policy: InvalidSamplePolicy) -> Result<Self> {
        let mut num_skipped = 0;

        let samples: Vec<_> = dataset
            .samples()
            .iter()
            .map(|record| -> Result<_> {
                let path = dataset.image_path(record);

                match check_sample(&path, record) {
                    Ok(()) => Ok(Some(record.clone())),
                    Err(err) => match policy {
                        InvalidSamplePolicy::Skip => {
                            warn!("skip sample: {}", err);
                            num_skipped += 1;
                            Ok(None)
                        }
                        InvalidSamplePolicy::Abort => Err(err.into()),
                    },
                }
            })
            .filter_map(|result| result.transpose())
            .try_collect()?;

        if num_skipped > 0 {
            warn!(
                "filtered out {} bad samples in the data set, {} samples remain",
                num_skipped,
                samples.len()
            );
        }

        Ok(Self {
            dataset,
            samples,
            num_skipped,
        })
    }

    /// The number of samples that were dropped.
    pub fn num_skipped(&self) -> usize {
        self.num_skipped
    }

    pub fn into_inner(self) -> D {
        self.dataset
    }
}

impl<D> SampleDataset for SanitizedDataset<D>
where
    D: SampleDataset,
{
    fn image_dir(&self) -> &Path {
        self.dataset.image_dir()
    }

    fn samples(&self) -> &[Arc<SampleRecord>] {
        &self.samples
    }
}

fn check_sample(path: &Path, record: &SampleRecord) -> Result<(), PipelineError> {
    let imagesize::ImageSize { width, height } =
        imagesize::size(path).map_err(|err| PipelineError::ImageNotFound {
            path: path.to_owned(),
            reason: format!("{:?}", err),
        })?;
    let (width, height) = (width as i64, height as i64);
    let crop_box = &record.crop_box;

    if crop_box.is_empty() || !crop_box.fits_within(width, height) {
        return Err(PipelineError::InvalidCrop {
            path: path.to_owned(),
            crop_box: crop_box.to_array(),
            width,
            height,
        });
    }

    Ok(())
}
