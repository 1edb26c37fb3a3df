//! Crop and resize of raw images.

use crate::{common::*, dataset::CropBox, error::PipelineError};

/// Loads images from an image directory, crops them by a crop box and
/// resizes the crop to a fixed size.
///
/// Resizing goes through `tch::vision::image::resize`, which uses the
/// stb_image_resize default filter. The outcome is a `uint8` tensor in
/// `[height, width, 3]` layout with RGB channel order.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    image_dir: PathBuf,
    width: usize,
    height: usize,
}

impl ImagePreprocessor {
    /// Build a new preprocessor.
    ///
    /// * `image_dir` - The base directory of image references.
    /// * `width` - The outcome image width in pixels.
    /// * `height` - The outcome image height in pixels.
    pub fn new(image_dir: impl AsRef<Path>, width: usize, height: usize) -> Result<Self> {
        ensure!(width > 0 && height > 0, "target size must be positive");

        Ok(Self {
            image_dir: image_dir.as_ref().to_owned(),
            width,
            height,
        })
    }

    /// The outcome `(width, height)`.
    pub fn target_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Load an image, crop it and resize the crop to the target size.
    pub fn preprocess(&self, image_ref: &str, crop_box: &CropBox) -> Result<Tensor> {
        let path = self.image_dir.join(image_ref);

        tch::no_grad(|| {
            let image = load_rgb_image(&path)?;
            let (_channels, height, width) = image.size3()?;

            if crop_box.is_empty() || !crop_box.fits_within(width, height) {
                return Err(PipelineError::InvalidCrop {
                    path: path.clone(),
                    crop_box: crop_box.to_array(),
                    width,
                    height,
                }
                .into());
            }

            crop_resize(&image, crop_box, self.width, self.height)
                .with_context(|| format!("failed to resize image '{}'", path.display()))
        })
    }
}

/// Load an image file into a `uint8` tensor of shape `[3, height, width]`.
pub fn load_rgb_image(path: &Path) -> Result<Tensor> {
    let image = vision::image::load(path).map_err(|err| PipelineError::ImageNotFound {
        path: path.to_owned(),
        reason: err.to_string(),
    })?;
    let (channels, height, width) = image.size3()?;

    let image = match channels {
        3 => image,
        1 => image.expand(&[3, height, width], false),
        4 => image.narrow(0, 0, 3),
        _ => bail!(
            "unsupported number of channels {} in image '{}'",
            channels,
            path.display()
        ),
    };
    Ok(image)
}

/// Crop a `[3, height, width]` image by rows `[min_y, max_y)` and columns
/// `[min_x, max_x)`, then resize the crop to `[out_height, out_width, 3]`.
///
/// The crop box must lie inside the image.
fn crop_resize(
    image: &Tensor,
    crop_box: &CropBox,
    out_width: usize,
    out_height: usize,
) -> Result<Tensor> {
    let CropBox {
        min_x,
        min_y,
        max_x,
        max_y,
    } = *crop_box;

    let cropped = image.i((.., min_y..max_y, min_x..max_x)).contiguous();
    let resized = vision::image::resize(&cropped, out_width as i64, out_height as i64)?;
    let output = resized.permute(&[1, 2, 0]).contiguous();

    Ok(output)
}
