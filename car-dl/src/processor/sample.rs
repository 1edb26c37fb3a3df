use super::*;
use crate::{common::*, dataset::SampleRecord, label::OneHotEncoder};

/// Turns a sample record into an `(image, label)` tensor pair.
pub trait SampleLoader
where
    Self: Debug + Send,
{
    fn load(&self, record: &SampleRecord) -> Result<(Tensor, Tensor)>;
}

/// Crops and resizes the sample image and one-hot encodes its class id.
#[derive(Debug, Clone)]
pub struct SampleProcessor {
    preprocessor: ImagePreprocessor,
    encoder: OneHotEncoder,
}

impl SampleProcessor {
    pub fn new(preprocessor: ImagePreprocessor, encoder: OneHotEncoder) -> Self {
        Self {
            preprocessor,
            encoder,
        }
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }
}

impl SampleLoader for SampleProcessor {
    fn load(&self, record: &SampleRecord) -> Result<(Tensor, Tensor)> {
        let SampleRecord {
            ref crop_box,
            class_id,
            ref image_ref,
        } = *record;

        let label = self
            .encoder
            .encode(class_id)
            .with_context(|| format!("invalid label for image '{}'", image_ref))?;
        let image = self.preprocessor.preprocess(image_ref, crop_box)?;

        Ok((image, label))
    }
}

impl<L> SampleLoader for Arc<L>
where
    L: SampleLoader + Sync + ?Sized,
{
    fn load(&self, record: &SampleRecord) -> Result<(Tensor, Tensor)> {
        (**self).load(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset::CropBox, error::PipelineError, utils::testing::write_test_image};

    #[test]
    fn load_image_and_label() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_test_image(dir.path().join("00001.jpg"), 64, 64)?;

        let processor = SampleProcessor::new(
            ImagePreprocessor::new(dir.path(), 16, 16)?,
            OneHotEncoder::new(196)?,
        );
        let record = SampleRecord {
            crop_box: CropBox::new(8, 8, 40, 56),
            class_id: 14,
            image_ref: "00001.jpg".into(),
        };

        let (image, label) = processor.load(&record)?;
        assert_eq!(image.size(), vec![16, 16, 3]);
        assert_eq!(label.size(), vec![196]);
        assert_eq!(i64::from(&label.argmax(0, false)), 13);
        Ok(())
    }

    #[test]
    fn label_errors_are_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_test_image(dir.path().join("00001.jpg"), 64, 64)?;

        let processor = SampleProcessor::new(
            ImagePreprocessor::new(dir.path(), 16, 16)?,
            OneHotEncoder::new(196)?,
        );
        let record = SampleRecord {
            crop_box: CropBox::new(8, 8, 40, 56),
            class_id: 197,
            image_ref: "00001.jpg".into(),
        };

        let err = processor.load(&record).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::OutOfRange { class_id: 197, .. })
        ));
        Ok(())
    }
}
