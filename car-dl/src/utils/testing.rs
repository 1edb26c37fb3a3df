use crate::common::*;

/// Write a `[3, height, width]` uint8 tensor to an image file.
pub fn write_image(path: impl AsRef<Path>, image: &Tensor) -> Result<()> {
    vision::image::save(image, path.as_ref())?;
    Ok(())
}

/// Write a gradient image of given size.
pub fn write_test_image(path: impl AsRef<Path>, width: i64, height: i64) -> Result<()> {
    let xs = Tensor::arange(width, (Kind::Float, Device::Cpu)).view([1, 1, width]) / width as f64;
    let ys = Tensor::arange(height, (Kind::Float, Device::Cpu)).view([1, height, 1]) / height as f64;
    let image = Tensor::cat(
        &[
            (&xs * 255.0).expand(&[1, height, width], false),
            (&ys * 255.0).expand(&[1, height, width], false),
            Tensor::full(&[1, height, width], 128.0, (Kind::Float, Device::Cpu)),
        ],
        0,
    )
    .to_kind(Kind::Uint8);
    write_image(path, &image)
}
